//! Typed Volumio operations on top of a [`RemoteSession`].
//!
//! Each operation pairs one outgoing event with the push Volumio answers it
//! with:
//!
//! | operation              | emits                | waits for            |
//! |------------------------|----------------------|----------------------|
//! | `list_playlists`       | `listPlaylist`       | `pushListPlaylist`   |
//! | `add_to_playlist`      | `addToPlaylist`      | `pushToastMessage`   |
//! | `remove_from_playlist` | `removeFromPlaylist` | `pushToastMessage`   |
//! | `browse_library`       | `browseLibrary`      | `pushBrowseLibrary`  |
//! | `create_playlist`      | `createPlaylist`     | `pushCreatePlaylist` |
//! | `delete_playlist`      | `deletePlaylist`     | `pushDeletePlaylist` |
//! | `get_state`            | `getState`           | `pushState`          |
//! | `play` / `pause`       | `play` / `pause`     | -                    |

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browse::PageSource;
use crate::errors::Result;
use crate::model::{
    BrowseRequest, BrowseResponse, CommandResponse, ListItem, PlayerState, PlaylistNameRequest,
    PlaylistNames, PlaylistTrackRequest, ToastMessage, TrackSpec,
};
use crate::session::RemoteSession;
use crate::socketio::SocketIoTransport;
use crate::transport::PushTransport;
use crate::uri::playlist_locator;

/// Mutating side of the player used by the synchronizer.
///
/// `Ok(None)` means no acknowledgement arrived in time: the outcome of the
/// edit is unknown.
pub trait PlaylistEditor {
    fn add_to_playlist(&self, playlist: &str, track: &TrackSpec) -> Result<Option<ToastMessage>>;

    fn remove_from_playlist(&self, playlist: &str, track: &TrackSpec)
    -> Result<Option<ToastMessage>>;
}

impl<E: PlaylistEditor + ?Sized> PlaylistEditor for &E {
    fn add_to_playlist(&self, playlist: &str, track: &TrackSpec) -> Result<Option<ToastMessage>> {
        (**self).add_to_playlist(playlist, track)
    }

    fn remove_from_playlist(
        &self,
        playlist: &str,
        track: &TrackSpec,
    ) -> Result<Option<ToastMessage>> {
        (**self).remove_from_playlist(playlist, track)
    }
}

pub struct VolumioController<T: PushTransport> {
    session: RemoteSession<T>,
}

impl VolumioController<SocketIoTransport> {
    /// Opens a Socket.IO session on `host:port`.
    pub fn connect(host: &str, port: u16, call_timeout: Duration) -> Result<Self> {
        let transport = SocketIoTransport::connect(host, port, call_timeout.max(Duration::from_secs(5)))?;
        Ok(Self::new(RemoteSession::with_timeout(transport, call_timeout)))
    }
}

impl<T: PushTransport> VolumioController<T> {
    pub fn new(session: RemoteSession<T>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &RemoteSession<T> {
        &self.session
    }

    pub fn list_playlists(&self) -> Result<Option<Vec<String>>> {
        let names = self
            .session
            .call_decoded::<(), PlaylistNames>("listPlaylist", "pushListPlaylist", None)?;
        Ok(names.map(|PlaylistNames(names)| names))
    }

    pub fn browse_library(&self, locator: &str) -> Result<Option<BrowseResponse>> {
        self.session.call_decoded(
            "browseLibrary",
            "pushBrowseLibrary",
            Some(&BrowseRequest { uri: locator }),
        )
    }

    /// Content of a stored playlist. Playlists are never paginated.
    pub fn list_tracks(&self, playlist: &str) -> Result<Option<Vec<ListItem>>> {
        Ok(self
            .browse_library(&playlist_locator(playlist))?
            .map(BrowseResponse::into_items))
    }

    pub fn create_playlist(&self, name: &str) -> Result<Option<CommandResponse>> {
        let response = self.session.call_decoded(
            "createPlaylist",
            "pushCreatePlaylist",
            Some(&PlaylistNameRequest { name }),
        )?;
        info!(playlist = name, ?response, "Create playlist requested");
        Ok(response)
    }

    pub fn delete_playlist(&self, name: &str) -> Result<Option<CommandResponse>> {
        let response = self.session.call_decoded(
            "deletePlaylist",
            "pushDeletePlaylist",
            Some(&PlaylistNameRequest { name }),
        )?;
        info!(playlist = name, ?response, "Delete playlist requested");
        Ok(response)
    }

    pub fn play(&self) -> Result<()> {
        self.session.notify::<()>("play", None)
    }

    pub fn pause(&self) -> Result<()> {
        self.session.notify::<()>("pause", None)
    }

    pub fn get_state(&self) -> Result<Option<PlayerState>> {
        self.session
            .call_decoded::<(), PlayerState>("getState", "pushState", None)
    }

    fn edit(
        &self,
        outgoing: &str,
        playlist: &str,
        track: &TrackSpec,
    ) -> Result<Option<ToastMessage>> {
        let request = PlaylistTrackRequest {
            name: playlist,
            service: &track.service,
            uri: &track.uri,
        };
        let toast: Option<ToastMessage> =
            self.session
                .call_decoded(outgoing, "pushToastMessage", Some(&request))?;
        debug!(event = outgoing, playlist, uri = %track.uri, ?toast, "Playlist edit sent");
        Ok(toast)
    }
}

impl<T: PushTransport> PlaylistEditor for VolumioController<T> {
    fn add_to_playlist(&self, playlist: &str, track: &TrackSpec) -> Result<Option<ToastMessage>> {
        self.edit("addToPlaylist", playlist, track)
    }

    fn remove_from_playlist(
        &self,
        playlist: &str,
        track: &TrackSpec,
    ) -> Result<Option<ToastMessage>> {
        self.edit("removeFromPlaylist", playlist, track)
    }
}

impl<T: PushTransport> PageSource for VolumioController<T> {
    fn fetch_page(&self, locator: &str) -> Result<Option<Vec<ListItem>>> {
        match self.browse_library(locator) {
            Ok(Some(response)) => Ok(Some(response.into_items())),
            Ok(None) => {
                warn!(locator, "No browse reply before deadline");
                Ok(None)
            }
            Err(err) if err.is_upstream() => {
                warn!(locator, "Browse request failed: {}", err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
