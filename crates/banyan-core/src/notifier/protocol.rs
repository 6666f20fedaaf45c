//! The fixed-length wire frame pushed to workers over their registered
//! control socket: 16-byte token, 1-byte type, 16-byte payload.

use thiserror::Error;

pub const FRAME_LEN: usize = 33;
const TOKEN_LEN: usize = 16;
const PAYLOAD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    CancellationNotice,
    DeregistrationNotice,
    ResourceUsageRequest,
}

impl FrameType {
    fn as_byte(self) -> u8 {
        match self {
            FrameType::CancellationNotice => 0,
            FrameType::DeregistrationNotice => 1,
            FrameType::ResourceUsageRequest => 2,
        }
    }

    fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0 => Ok(FrameType::CancellationNotice),
            1 => Ok(FrameType::DeregistrationNotice),
            2 => Ok(FrameType::ResourceUsageRequest),
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is {0} bytes, expected {FRAME_LEN}")]
    WrongLength(usize),
    #[error("unknown frame type byte {0}")]
    UnknownFrameType(u8),
}

/// A single control frame: `request_token` authenticates the coordinator to
/// the worker (the worker discards frames bearing a token that doesn't match
/// the one it was registered with), `frame_type` selects the action, and
/// `payload` carries type-specific data zero-padded to 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub request_token: [u8; TOKEN_LEN],
    pub frame_type: FrameType,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Frame {
    pub fn cancellation(request_token: [u8; TOKEN_LEN], task_id_tail: [u8; PAYLOAD_LEN]) -> Self {
        Self {
            request_token,
            frame_type: FrameType::CancellationNotice,
            payload: task_id_tail,
        }
    }

    pub fn deregistration(request_token: [u8; TOKEN_LEN]) -> Self {
        Self {
            request_token,
            frame_type: FrameType::DeregistrationNotice,
            payload: [0; PAYLOAD_LEN],
        }
    }

    pub fn resource_usage_request(request_token: [u8; TOKEN_LEN]) -> Self {
        Self {
            request_token,
            frame_type: FrameType::ResourceUsageRequest,
            payload: [0; PAYLOAD_LEN],
        }
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[..TOKEN_LEN].copy_from_slice(&self.request_token);
        buf[TOKEN_LEN] = self.frame_type.as_byte();
        buf[TOKEN_LEN + 1..].copy_from_slice(&self.payload);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != FRAME_LEN {
            return Err(ProtocolError::WrongLength(buf.len()));
        }
        let mut request_token = [0u8; TOKEN_LEN];
        request_token.copy_from_slice(&buf[..TOKEN_LEN]);
        let frame_type = FrameType::from_byte(buf[TOKEN_LEN])?;
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&buf[TOKEN_LEN + 1..]);
        Ok(Self {
            request_token,
            frame_type,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let frame = Frame::cancellation([7; TOKEN_LEN], [9; PAYLOAD_LEN]);
        let encoded = frame.encode();
        assert_eq!(encoded.len(), FRAME_LEN);
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn deregistration_and_usage_request_have_zero_payload() {
        assert_eq!(Frame::deregistration([1; TOKEN_LEN]).payload, [0; PAYLOAD_LEN]);
        assert_eq!(
            Frame::resource_usage_request([1; TOKEN_LEN]).payload,
            [0; PAYLOAD_LEN]
        );
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(matches!(
            Frame::decode(&[0; 10]),
            Err(ProtocolError::WrongLength(10))
        ));
    }

    #[test]
    fn decode_rejects_unknown_type_byte() {
        let mut buf = [0u8; FRAME_LEN];
        buf[TOKEN_LEN] = 99;
        assert!(matches!(
            Frame::decode(&buf),
            Err(ProtocolError::UnknownFrameType(99))
        ));
    }
}
