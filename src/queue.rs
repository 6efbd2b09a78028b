use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};

/// Small envelope moved through the delivery queue. Workers only dispatch
/// envelopes whose action is "send"; anything else is dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub id: String,
    pub action: String,
}

impl Envelope {
    pub fn send(id: impl Into<String>) -> Self {
        Envelope {
            id: id.into(),
            action: "send".to_string(),
        }
    }
}

/// FIFO transport of "ready to send" notification ids between producers
/// (intake, scheduler) and the worker pool.
///
/// Delivery is at-least-once: the scheduler re-enqueues any row that stays
/// PENDING past its deadline, and workers absorb duplicates through the
/// terminal-status check. The receiver is shared behind a mutex so any
/// number of workers can drain the same queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: UnboundedSender<Envelope>,
    rx: Arc<Mutex<UnboundedReceiver<Envelope>>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        DeliveryQueue {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Non-blocking push. Fails only when the consuming side is gone.
    pub fn push(&self, envelope: Envelope) -> AppResult<()> {
        self.tx
            .send(envelope)
            .map_err(|e| AppError::QueueUnavailable(format!("queue closed: {}", e)))
    }

    /// Pop one envelope, waiting at most `timeout`. Returns `None` when the
    /// timeout elapses or the queue is closed.
    pub async fn pop_blocking(&self, timeout: Duration) -> Option<Envelope> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(item) => item,
            Err(_) => None,
        }
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}
