use crossbeam_channel::Receiver;
use serde_json::Value;

use crate::errors::Result;
use crate::events::PushEvent;

/// Push/subscribe link to the player.
///
/// `emit` sends a named event; `subscribe` hands out a receiver of every
/// event pushed by the player from that point on. A receiver obtained
/// before an `emit` is guaranteed to see the replies triggered by it.
pub trait PushTransport: Send + Sync {
    fn emit(&self, event: &str, payload: Option<&Value>) -> Result<()>;

    fn subscribe(&self) -> Receiver<PushEvent>;
}

impl<T: PushTransport + ?Sized> PushTransport for std::sync::Arc<T> {
    fn emit(&self, event: &str, payload: Option<&Value>) -> Result<()> {
        (**self).emit(event, payload)
    }

    fn subscribe(&self) -> Receiver<PushEvent> {
        (**self).subscribe()
    }
}
