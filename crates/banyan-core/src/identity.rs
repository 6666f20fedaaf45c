//! Request tokens, response tokens, and per-attempt tokens.
//!
//! All three are plain random secrets compared by equality -- a Banyan
//! token has no embedded claims to verify; the store is the only source of
//! truth for who it belongs to. `make_token` produces a fixed-length string
//! drawn from letters, digits, and punctuation, excluding `:` so it can be
//! safely embedded in a `token:` Basic-auth pair.

use rand::Rng;
use rand::distr::{Distribution, Uniform};

use banyan_db::models::{Role, User};

/// Length of a freshly minted token, in characters.
pub const TOKEN_LEN: usize = 16;

const ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#$%&()*+,-./;<=>?@[]^_{|}~";

/// Generate a fresh random token suitable for a request token, response
/// token, or execution-attempt token.
pub fn make_token() -> String {
    let mut rng = rand::rng();
    let dist = Uniform::new(0, ALPHABET.len()).expect("non-empty alphabet");
    (0..TOKEN_LEN)
        .map(|_| ALPHABET[dist.sample(&mut rng)] as char)
        .collect()
}

/// The value a client places in the HTTP Basic `Authorization` header:
/// base64 of `token:` (no password half, by convention).
pub fn authorization_key(token: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(format!("{token}:"))
}

/// Decode a Basic-auth header value back into the bare token.
///
/// Returns `None` if the header is malformed (not valid base64, or missing
/// the trailing colon separator).
pub fn decode_basic_auth(header_value: &str) -> Option<String> {
    use base64::Engine;
    let stripped = header_value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(stripped)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    decoded.strip_suffix(':').map(|s| s.to_owned())
}

/// An authenticated caller: who they are and what they're allowed to do.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: User,
}

impl Identity {
    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn is_provider(&self) -> bool {
        self.user.role == Role::Provider
    }

    pub fn is_worker(&self) -> bool {
        self.user.role == Role::Worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_token_has_expected_length_and_no_colon() {
        let token = make_token();
        assert_eq!(token.chars().count(), TOKEN_LEN);
        assert!(!token.contains(':'));
    }

    #[test]
    fn make_token_is_not_constant() {
        let a = make_token();
        let b = make_token();
        // Collision probability is negligible at 16 chars from an 80+ char
        // alphabet; a failure here would indicate a broken RNG, not bad luck.
        assert_ne!(a, b);
    }

    #[test]
    fn authorization_key_round_trips() {
        let token = "abc123";
        let header = format!("Basic {}", authorization_key(token));
        assert_eq!(decode_basic_auth(&header).as_deref(), Some(token));
    }

    #[test]
    fn decode_basic_auth_rejects_missing_prefix() {
        assert!(decode_basic_auth("Bearer xyz").is_none());
    }

    #[test]
    fn decode_basic_auth_rejects_bad_base64() {
        assert!(decode_basic_auth("Basic not-base64!!!").is_none());
    }
}
