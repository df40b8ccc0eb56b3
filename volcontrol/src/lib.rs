//! Remote control of a Volumio player.
//!
//! The device is driven through its Socket.IO API ([`SocketIoTransport`]),
//! with request/reply correlation handled by [`RemoteSession`] and typed
//! operations exposed by [`VolumioController`]. Library pages can also be
//! fetched through the REST browse endpoint ([`BrowseClient`]).

pub mod browse;
pub mod controller;
pub mod errors;
pub mod events;
pub mod model;
pub mod session;
pub mod socketio;
pub mod transport;
pub mod uri;

pub use browse::{BrowseClient, DEFAULT_HTTP_TIMEOUT, PageSource};
pub use controller::{PlaylistEditor, VolumioController};
pub use errors::{ControlError, Result};
pub use events::{PushEvent, PushEventBus};
pub use model::{
    BrowseResponse, CommandResponse, ListItem, PlayerState, ToastMessage, TrackSpec, Year,
};
pub use session::{DEFAULT_CALL_TIMEOUT, RemoteSession};
pub use socketio::{DEFAULT_SOCKETIO_PORT, SocketIoTransport};
pub use transport::PushTransport;
pub use uri::{canonical_uri, playlist_locator};
