//! Socket.IO client for the Volumio websocket API, over Engine.IO v3
//! long-polling.
//!
//! Volumio (socket.io 2.x, port 3000) accepts the plain HTTP polling
//! transport, which keeps this client on blocking `ureq` calls:
//!
//! - `GET  /socket.io/?EIO=3&transport=polling&b64=1` opens the session and
//!   returns the `0{...}` open packet carrying the `sid`;
//! - `GET  ...&sid=<sid>` long-polls for packets pushed by the server;
//! - `POST ...&sid=<sid>` sends packets.
//!
//! Payloads are sequences of `<length>:<packet>` frames, the length being
//! counted in UTF-16 code units. Socket.IO events travel as Engine.IO
//! message packets: `42["eventName",arg0,...]`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};
use ureq::Agent;

use crate::errors::{ControlError, Result};
use crate::events::{PushEvent, PushEventBus};
use crate::transport::PushTransport;

pub const DEFAULT_SOCKETIO_PORT: u16 = 3000;
const ENGINE_IO_VERSION: &str = "3";
const POLL_GRACE: Duration = Duration::from_secs(5);
const CLOSED_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Engine.IO packet, as found inside a polling payload.
#[derive(Clone, Debug, PartialEq)]
pub enum EnginePacket {
    Open(String),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ControlError::protocol("empty Engine.IO packet"))?;
        let data = chars.as_str().to_string();
        match kind {
            '0' => Ok(EnginePacket::Open(data)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(data)),
            '3' => Ok(EnginePacket::Pong(data)),
            '4' => Ok(EnginePacket::Message(data)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(ControlError::protocol(format!(
                "unknown Engine.IO packet type '{}'",
                other
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(data) => format!("0{}", data),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Splits a text polling payload into raw packets.
pub fn decode_payload(body: &str) -> Result<Vec<String>> {
    let mut packets = Vec::new();
    let mut rest = body;

    while !rest.is_empty() {
        let (len_str, tail) = rest
            .split_once(':')
            .ok_or_else(|| ControlError::protocol(format!("missing frame length in {:?}", rest)))?;
        let units: usize = len_str
            .parse()
            .map_err(|_| ControlError::protocol(format!("invalid frame length {:?}", len_str)))?;

        // Walk `units` UTF-16 code units forward to find the byte boundary.
        let mut counted = 0;
        let mut end = 0;
        for ch in tail.chars() {
            if counted >= units {
                break;
            }
            counted += ch.len_utf16();
            end += ch.len_utf8();
        }
        if counted != units {
            return Err(ControlError::protocol(format!(
                "truncated frame: expected {} units, got {}",
                units, counted
            )));
        }

        packets.push(tail[..end].to_string());
        rest = &tail[end..];
    }

    Ok(packets)
}

/// Frames packets into a text polling payload.
pub fn encode_payload(packets: &[String]) -> String {
    packets
        .iter()
        .map(|p| format!("{}:{}", p.encode_utf16().count(), p))
        .collect()
}

/// Builds the Socket.IO event message body (`2["name",payload]`).
pub fn encode_event(event: &str, payload: Option<&Value>) -> String {
    let mut args = vec![Value::String(event.to_string())];
    if let Some(payload) = payload {
        args.push(payload.clone());
    }
    format!("2{}", Value::Array(args))
}

/// Interprets a Socket.IO packet carried by an Engine.IO message.
///
/// Returns the event for `EVENT` packets on the default namespace and `None`
/// for everything else (connect, ack, ...).
pub fn decode_event(message: &str) -> Result<Option<PushEvent>> {
    let Some(body) = message.strip_prefix('2') else {
        trace!(message, "Ignoring non-event Socket.IO packet");
        return Ok(None);
    };
    // Optional ack id before the JSON array.
    let body = body.trim_start_matches(|c: char| c.is_ascii_digit());

    let args: Vec<Value> =
        serde_json::from_str(body).map_err(|err| ControlError::decode("Socket.IO event", err))?;
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        other => {
            return Err(ControlError::protocol(format!(
                "Socket.IO event without a name: {:?}",
                other
            )));
        }
    };
    let payload = args.next().unwrap_or(Value::Null);
    Ok(Some(PushEvent { name, payload }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Handshake {
    sid: String,
    ping_interval: u64,
    ping_timeout: u64,
}

/// Reads the handshake reply: the open packet first, then any packet the
/// server queued behind it.
fn parse_handshake(body: &str) -> Result<(Handshake, Vec<String>)> {
    let mut packets = decode_payload(body)?.into_iter();
    let handshake = match packets.next().map(|p| EnginePacket::parse(&p)).transpose()? {
        Some(EnginePacket::Open(data)) => serde_json::from_str::<Handshake>(&data)
            .map_err(|err| ControlError::decode("Engine.IO open packet", err))?,
        other => {
            return Err(ControlError::protocol(format!(
                "expected open packet, got {:?}",
                other
            )));
        }
    };
    Ok((handshake, packets.collect()))
}

struct Shared {
    endpoint: String,
    sid: String,
    agent: Agent,
    bus: PushEventBus,
    closed: AtomicBool,
}

impl Shared {
    fn new(endpoint: String, sid: String, agent: Agent) -> Self {
        Self {
            endpoint,
            sid,
            agent,
            bus: PushEventBus::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn poll_once(&self) -> Result<Vec<String>> {
        let mut response = self
            .agent
            .get(&self.endpoint)
            .query("EIO", ENGINE_IO_VERSION)
            .query("transport", "polling")
            .query("b64", "1")
            .query("sid", &self.sid)
            .query("t", cache_buster())
            .call()
            .map_err(|err| ControlError::transport(format!("poll failed: {}", err)))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| ControlError::transport(format!("poll body: {}", err)))?;
        if !(200..300).contains(&status) {
            return Err(ControlError::HttpStatus("poll".to_string(), status, body));
        }
        decode_payload(&body)
    }

    fn send(&self, packets: &[String]) -> Result<()> {
        let body = encode_payload(packets);
        let mut response = self
            .agent
            .post(&self.endpoint)
            .query("EIO", ENGINE_IO_VERSION)
            .query("transport", "polling")
            .query("b64", "1")
            .query("sid", &self.sid)
            .query("t", cache_buster())
            .header("Content-Type", "text/plain;charset=UTF-8")
            .send(body)
            .map_err(|err| ControlError::transport(format!("send failed: {}", err)))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(ControlError::HttpStatus("send".to_string(), status, body));
        }
        Ok(())
    }

    fn dispatch(&self, raw: &str) {
        match EnginePacket::parse(raw) {
            Ok(EnginePacket::Message(message)) => match decode_event(&message) {
                Ok(Some(event)) => {
                    trace!(event = %event.name, "Push event received");
                    self.bus.broadcast(event);
                }
                Ok(None) => {}
                Err(err) => warn!("Dropping undecodable Socket.IO packet: {}", err),
            },
            Ok(EnginePacket::Close) => {
                info!("Server closed the Engine.IO session");
                self.closed.store(true, Ordering::SeqCst);
            }
            Ok(EnginePacket::Ping(data)) => {
                if let Err(err) = self.send(&[EnginePacket::Pong(data).encode()]) {
                    debug!("Failed to answer server ping: {}", err);
                }
            }
            Ok(_) => {}
            Err(err) => warn!("Dropping malformed Engine.IO packet: {}", err),
        }
    }
}

fn cache_buster() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

/// Push transport speaking Socket.IO to a Volumio device.
///
/// A background thread long-polls the server and broadcasts every event to
/// the subscribers; a second one keeps the session alive with pings.
pub struct SocketIoTransport {
    shared: Arc<Shared>,
}

impl SocketIoTransport {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let endpoint = format!("http://{}:{}/socket.io/", host, port);
        let handshake_agent = build_agent(timeout);

        let mut response = handshake_agent
            .get(&endpoint)
            .query("EIO", ENGINE_IO_VERSION)
            .query("transport", "polling")
            .query("b64", "1")
            .query("t", cache_buster())
            .call()
            .map_err(|err| {
                ControlError::transport(format!("handshake with {} failed: {}", endpoint, err))
            })?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| ControlError::transport(format!("handshake body: {}", err)))?;
        if !(200..300).contains(&status) {
            return Err(ControlError::HttpStatus("handshake".to_string(), status, body));
        }

        let (handshake, pending) = parse_handshake(&body)?;

        let ping_interval = Duration::from_millis(handshake.ping_interval);
        let poll_timeout = ping_interval + Duration::from_millis(handshake.ping_timeout) + POLL_GRACE;

        let shared = Arc::new(Shared::new(
            endpoint,
            handshake.sid,
            build_agent(poll_timeout.max(timeout)),
        ));
        info!(host, port, sid = %shared.sid, "Socket.IO session opened");

        for raw in &pending {
            shared.dispatch(raw);
        }

        spawn_poller(Arc::clone(&shared));
        spawn_pinger(Arc::clone(&shared), ping_interval);

        Ok(Self { shared })
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

fn spawn_poller(shared: Arc<Shared>) {
    thread::spawn(move || {
        while !shared.is_closed() {
            match shared.poll_once() {
                Ok(packets) => {
                    for raw in &packets {
                        shared.dispatch(raw);
                    }
                }
                Err(ControlError::HttpStatus(_, status, _)) => {
                    // Session unknown to the server (expired sid, restart).
                    warn!(status, "Socket.IO session rejected, closing");
                    shared.closed.store(true, Ordering::SeqCst);
                }
                Err(err) => {
                    if shared.is_closed() {
                        break;
                    }
                    warn!("Socket.IO poll failed: {}", err);
                    thread::sleep(CLOSED_RETRY_DELAY);
                }
            }
        }
        debug!(sid = %shared.sid, "Socket.IO poller stopped");
    });
}

fn spawn_pinger(shared: Arc<Shared>, interval: Duration) {
    thread::spawn(move || {
        while !shared.is_closed() {
            thread::sleep(interval);
            if shared.is_closed() {
                break;
            }
            if let Err(err) = shared.send(&[EnginePacket::Ping(String::new()).encode()]) {
                warn!("Socket.IO ping failed: {}", err);
            }
        }
    });
}

impl PushTransport for SocketIoTransport {
    fn emit(&self, event: &str, payload: Option<&Value>) -> Result<()> {
        if self.shared.is_closed() {
            return Err(ControlError::Closed);
        }
        let packet = EnginePacket::Message(encode_event(event, payload)).encode();
        trace!(event, "Emitting Socket.IO event");
        self.shared.send(&[packet])
    }

    fn subscribe(&self) -> Receiver<PushEvent> {
        self.shared.bus.subscribe()
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            let _ = self.shared.send(&[EnginePacket::Close.encode()]);
        }
    }
}
