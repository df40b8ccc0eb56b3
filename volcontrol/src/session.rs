//! Request/reply correlation over a push transport.
//!
//! Volumio never answers an emitted event directly: it pushes a separately
//! named event some time later (`addToPlaylist` → `pushToastMessage`). A
//! [`RemoteSession`] pairs the two by listening for the reply name before
//! emitting, then waiting a short, bounded time for the first matching push.
//!
//! Only one call may wait on a given reply name at a time. A second call for
//! the same name while the first is outstanding is rejected with
//! [`ControlError::ReplyPending`]; silently sharing the slot would hand one
//! caller the other's reply.
//!
//! Replies carry no correlation id. A reply that shows up after its call
//! timed out is taken by the next call waiting on the same name, so outcomes
//! read after a timeout may be off by one. The session flags the first
//! reply following a timeout on each name.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::errors::{ControlError, Result};
use crate::events::PushEvent;
use crate::transport::PushTransport;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(500);

pub struct RemoteSession<T: PushTransport> {
    transport: T,
    slots: Mutex<HashSet<String>>,
    /// Reply names whose last call ended without a reply.
    timed_out: Mutex<HashSet<String>>,
    timeout: Duration,
}

/// A registered wait for one reply name. Releases its slot when dropped.
struct PendingCall<'a> {
    reply: String,
    slots: &'a Mutex<HashSet<String>>,
    receiver: Receiver<PushEvent>,
    deadline: Instant,
}

impl PendingCall<'_> {
    fn wait(&self) -> Option<Value> {
        loop {
            match self.receiver.recv_deadline(self.deadline) {
                Ok(event) if event.name == self.reply => return Some(event.payload),
                Ok(event) => {
                    trace!(reply = %self.reply, event = %event.name, "Ignoring unrelated push");
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(&self.reply);
        }
    }
}

impl<T: PushTransport> RemoteSession<T> {
    pub fn new(transport: T) -> Self {
        Self::with_timeout(transport, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(transport: T, timeout: Duration) -> Self {
        Self {
            transport,
            slots: Mutex::new(HashSet::new()),
            timed_out: Mutex::new(HashSet::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn register(&self, reply: &str) -> Result<PendingCall<'_>> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| ControlError::transport("session slot table poisoned"))?;
        if !slots.insert(reply.to_string()) {
            return Err(ControlError::ReplyPending(reply.to_string()));
        }
        drop(slots);

        // Subscribe before emitting so a fast reply cannot slip past us.
        Ok(PendingCall {
            reply: reply.to_string(),
            slots: &self.slots,
            receiver: self.transport.subscribe(),
            deadline: Instant::now() + self.timeout,
        })
    }

    /// Emits `outgoing` and, when `expected_reply` is set, waits for it.
    ///
    /// Returns `Ok(None)` for fire-and-forget calls, when no reply arrived
    /// before the deadline and when the reply carries no argument. An
    /// explicit empty reply and a timeout both mean "no data".
    pub fn call(
        &self,
        outgoing: &str,
        expected_reply: Option<&str>,
        payload: Option<Value>,
    ) -> Result<Option<Value>> {
        let Some(reply) = expected_reply else {
            self.transport.emit(outgoing, payload.as_ref())?;
            debug!(event = outgoing, "Emitted fire-and-forget event");
            return Ok(None);
        };

        let pending = self.register(reply)?;
        self.transport.emit(outgoing, payload.as_ref())?;

        let response = pending.wait();
        match &response {
            None => {
                debug!(
                    event = outgoing,
                    reply,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "No reply before deadline"
                );
                self.mark_timed_out(reply, true);
            }
            Some(_) => {
                if self.mark_timed_out(reply, false) {
                    warn!(
                        event = outgoing,
                        reply,
                        "Reply follows a timed out call, it may belong to that call"
                    );
                }
            }
        }
        Ok(response.filter(|value| !value.is_null()))
    }

    /// Records whether the last call on `reply` timed out. Returns whether
    /// the previous one did.
    fn mark_timed_out(&self, reply: &str, timed_out: bool) -> bool {
        let Ok(mut names) = self.timed_out.lock() else {
            return false;
        };
        if timed_out {
            !names.insert(reply.to_string())
        } else {
            names.remove(reply)
        }
    }

    /// Like [`call`](Self::call), decoding the reply into `R`.
    ///
    /// A reply that does not match `R` is a [`ControlError::Decode`], never
    /// folded into `Ok(None)`. An argument-less reply is `Ok(None)`.
    pub fn call_decoded<P, R>(
        &self,
        outgoing: &str,
        expected_reply: &str,
        payload: Option<&P>,
    ) -> Result<Option<R>>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = payload.map(encode_payload).transpose()?;
        match self.call(outgoing, Some(expected_reply), payload)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| ControlError::decode(expected_reply, err)),
            None => Ok(None),
        }
    }

    /// Fire-and-forget emit with a typed payload.
    pub fn notify<P: Serialize + ?Sized>(&self, outgoing: &str, payload: Option<&P>) -> Result<()> {
        let payload = payload.map(encode_payload).transpose()?;
        self.call(outgoing, None, payload).map(|_| ())
    }
}

fn encode_payload<P: Serialize + ?Sized>(payload: &P) -> Result<Value> {
    serde_json::to_value(payload).map_err(|err| ControlError::decode("outgoing payload", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PushEventBus;
    use crate::model::ToastMessage;
    use serde_json::json;
    use std::sync::Arc;

    type Responder = Box<dyn Fn(&str, Option<&Value>) -> Vec<PushEvent> + Send + Sync>;

    /// Transport answering synchronously from a closure.
    struct ScriptedTransport {
        bus: PushEventBus,
        responder: Responder,
        emitted: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl ScriptedTransport {
        fn new(
            responder: impl Fn(&str, Option<&Value>) -> Vec<PushEvent> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                bus: PushEventBus::new(),
                responder: Box::new(responder),
                emitted: Mutex::new(Vec::new()),
            })
        }

        fn silent() -> Arc<Self> {
            Self::new(|_, _| Vec::new())
        }

        fn emitted(&self) -> Vec<(String, Option<Value>)> {
            self.emitted.lock().unwrap().clone()
        }
    }

    impl PushTransport for ScriptedTransport {
        fn emit(&self, event: &str, payload: Option<&Value>) -> Result<()> {
            self.emitted
                .lock()
                .unwrap()
                .push((event.to_string(), payload.cloned()));
            for reply in (self.responder)(event, payload) {
                self.bus.broadcast(reply);
            }
            Ok(())
        }

        fn subscribe(&self) -> Receiver<PushEvent> {
            self.bus.subscribe()
        }
    }

    fn toast() -> Value {
        json!({"message": "Added", "title": "Playlist", "type": "success"})
    }

    #[test]
    fn test_reply_is_returned() {
        let transport = ScriptedTransport::new(|event, _| {
            assert_eq!(event, "addToPlaylist");
            vec![
                PushEvent::new("pushState", json!({})),
                PushEvent::new("pushToastMessage", toast()),
            ]
        });
        let session = RemoteSession::new(transport.clone());

        let reply = session
            .call("addToPlaylist", Some("pushToastMessage"), Some(json!({"name": "jazz"})))
            .unwrap();

        assert_eq!(reply, Some(toast()));
        assert_eq!(transport.emitted()[0].1, Some(json!({"name": "jazz"})));
    }

    #[test]
    fn test_timeout_resolves_to_none() {
        let session =
            RemoteSession::with_timeout(ScriptedTransport::silent(), Duration::from_millis(30));

        let started = Instant::now();
        let reply = session.call("getState", Some("pushState"), None).unwrap();

        assert!(reply.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_fire_and_forget_does_not_wait() {
        let transport = ScriptedTransport::silent();
        let session = RemoteSession::with_timeout(transport.clone(), Duration::from_secs(5));

        let started = Instant::now();
        assert!(session.call("play", None, None).unwrap().is_none());

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.emitted().len(), 1);
    }

    #[test]
    fn test_decode_failure_is_an_error() {
        let transport =
            ScriptedTransport::new(|_, _| vec![PushEvent::new("pushToastMessage", json!(["oops"]))]);
        let session = RemoteSession::new(transport);

        let result = session.call_decoded::<Value, ToastMessage>(
            "removeFromPlaylist",
            "pushToastMessage",
            None,
        );

        assert!(matches!(result, Err(ControlError::Decode { .. })));
    }

    #[test]
    fn test_decoded_timeout_is_none() {
        let session =
            RemoteSession::with_timeout(ScriptedTransport::silent(), Duration::from_millis(10));
        let result = session
            .call_decoded::<Value, ToastMessage>("addToPlaylist", "pushToastMessage", None)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_overlapping_call_on_same_reply_is_rejected() {
        let transport = ScriptedTransport::new(|_, _| vec![PushEvent::new("pushToastMessage", toast())]);
        let session = RemoteSession::new(transport.clone());

        let held = session.register("pushToastMessage").unwrap();
        let result = session.call("addToPlaylist", Some("pushToastMessage"), None);
        assert!(matches!(result, Err(ControlError::ReplyPending(name)) if name == "pushToastMessage"));
        assert!(transport.emitted().is_empty());

        // Other reply names stay available.
        assert!(session.call("getState", Some("pushState"), None).is_ok());

        drop(held);
        assert_eq!(
            session
                .call("addToPlaylist", Some("pushToastMessage"), None)
                .unwrap(),
            Some(toast())
        );
    }

    #[test]
    fn test_slot_is_released_after_timeout() {
        let session =
            RemoteSession::with_timeout(ScriptedTransport::silent(), Duration::from_millis(5));
        assert!(session.call("getState", Some("pushState"), None).unwrap().is_none());
        assert!(session.call("getState", Some("pushState"), None).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_callers_cannot_share_a_slot() {
        let session =
            RemoteSession::with_timeout(ScriptedTransport::silent(), Duration::from_millis(300));

        std::thread::scope(|scope| {
            let first = scope.spawn(|| session.call("listPlaylist", Some("pushListPlaylist"), None));
            std::thread::sleep(Duration::from_millis(50));
            let second = session.call("listPlaylist", Some("pushListPlaylist"), None);
            assert!(matches!(second, Err(ControlError::ReplyPending(_))));
            assert!(first.join().unwrap().unwrap().is_none());
        });
    }

    #[test]
    fn test_empty_reply_is_no_data() {
        let transport =
            ScriptedTransport::new(|_, _| vec![PushEvent::new("pushToastMessage", Value::Null)]);
        let session = RemoteSession::new(transport);

        let raw = session
            .call("addToPlaylist", Some("pushToastMessage"), None)
            .unwrap();
        assert!(raw.is_none());

        let decoded = session
            .call_decoded::<Value, ToastMessage>("addToPlaylist", "pushToastMessage", None)
            .unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_reply_after_timeout_is_flagged_once() {
        let answer = Arc::new(Mutex::new(false));
        let responder = Arc::clone(&answer);
        let transport = ScriptedTransport::new(move |_, _| {
            if *responder.lock().unwrap() {
                vec![PushEvent::new("pushToastMessage", toast())]
            } else {
                Vec::new()
            }
        });
        let session = RemoteSession::with_timeout(transport, Duration::from_millis(10));

        assert!(session.call("addToPlaylist", Some("pushToastMessage"), None).unwrap().is_none());
        assert!(session.timed_out.lock().unwrap().contains("pushToastMessage"));

        *answer.lock().unwrap() = true;
        assert_eq!(
            session.call("addToPlaylist", Some("pushToastMessage"), None).unwrap(),
            Some(toast())
        );
        assert!(session.timed_out.lock().unwrap().is_empty());
    }
}
