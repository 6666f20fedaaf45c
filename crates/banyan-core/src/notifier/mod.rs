//! Worker notifier: pushes control frames to registered workers over
//! persistent TCP sockets without polling.
//!
//! There is no single reactor loop watching a socket set for writeability.
//! Instead each registered worker gets its own lightweight writer task
//! reading off a bounded `mpsc` queue -- enqueuing a frame is the whole of
//! what a caller has to do; the queue is the FIFO of pending frames for
//! that connection.

pub mod protocol;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use protocol::Frame;

const QUEUE_DEPTH: usize = 64;

struct WorkerHandle {
    addr: SocketAddr,
    tx: mpsc::Sender<Frame>,
}

/// Registry of live worker connections. Cheap to clone; every clone shares
/// the same underlying connection table.
#[derive(Clone)]
pub struct Notifier {
    workers: Arc<Mutex<HashMap<String, WorkerHandle>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Connect to `addr` and register `name` under the notifier. Spawns the
    /// per-connection writer task. A connection failure is reported but does
    /// not prevent registration from completing -- the caller (the
    /// `POST /registered_workers` handler) still records the worker in the
    /// store, and the writer task will simply drop frames on its closed
    /// socket until the worker re-registers.
    pub async fn register(&self, name: String, addr: SocketAddr) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);

        {
            let mut workers = self.workers.lock().await;
            workers.insert(name.clone(), WorkerHandle { addr, tx });
        }

        tokio::spawn(writer_task(name, addr, rx, self.workers.clone()));
    }

    /// Enqueue a frame for `name`. Silently drops the frame if the worker
    /// isn't registered (it may have deregistered concurrently) or if its
    /// queue is full (a persistently unresponsive worker will be reaped by
    /// the availability checker regardless).
    pub async fn notify(&self, name: &str, frame: Frame) {
        let workers = self.workers.lock().await;
        if let Some(handle) = workers.get(name) {
            if handle.tx.try_send(frame).is_err() {
                warn!(worker = name, "notifier queue full or closed, dropping frame");
            }
        }
    }

    /// Enqueue a deregistration frame and remove `name` from the registry.
    /// The writer task drains any frames already queued ahead of it, then
    /// exits once the channel is dropped.
    pub async fn unregister(&self, name: &str, token: [u8; 16]) {
        let mut workers = self.workers.lock().await;
        if let Some(handle) = workers.remove(name) {
            let _ = handle.tx.try_send(Frame::deregistration(token));
        }
    }

    /// Names currently registered, used by the availability checker to
    /// diff the registry between ticks.
    pub async fn registered_names(&self) -> Vec<String> {
        self.workers.lock().await.keys().cloned().collect()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

async fn writer_task(
    name: String,
    addr: SocketAddr,
    mut rx: mpsc::Receiver<Frame>,
    workers: Arc<Mutex<HashMap<String, WorkerHandle>>>,
) {
    let mut socket = match TcpStream::connect(addr).await {
        Ok(s) => s,
        Err(err) => {
            warn!(worker = name, %addr, %err, "failed to connect to worker");
            return;
        }
    };

    while let Some(frame) = rx.recv().await {
        if let Err(err) = socket.write_all(&frame.encode()).await {
            warn!(worker = name, %err, "worker connection failed, deregistering");
            workers.lock().await.remove(&name);
            return;
        }
    }

    debug!(worker = name, "notifier channel closed, writer task exiting");
}
