use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde_json::Value;

/// Event pushed by the player, with its first argument as payload.
#[derive(Clone, Debug, PartialEq)]
pub struct PushEvent {
    pub name: String,
    pub payload: Value,
}

impl PushEvent {
    pub fn new(name: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            payload,
        }
    }
}

/// Fan-out of incoming push events to every live subscriber.
///
/// Subscribers whose receiver has been dropped are pruned on the next
/// broadcast.
#[derive(Clone, Default)]
pub struct PushEventBus {
    subscribers: Arc<Mutex<Vec<Sender<PushEvent>>>>,
}

impl PushEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<PushEvent> {
        let (tx, rx) = unbounded::<PushEvent>();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn broadcast(&self, event: PushEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}
