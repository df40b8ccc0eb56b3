//! In-memory Volumio player for the sync tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use volcontrol::{ControlError, ListItem, PageSource, PlaylistEditor, ToastMessage, TrackSpec};

pub fn track(service: &str, title: &str, uri: &str) -> ListItem {
    ListItem {
        service: service.to_string(),
        item_type: "song".to_string(),
        title: title.to_string(),
        uri: uri.to_string(),
        duration: Some(3600),
        album: None,
        artist: None,
        albumart: None,
        year: None,
        icon: None,
    }
}

/// Mixcloud track as listed in a user feed (browse path embedded in the URI).
pub fn feed_track(title: &str, id: &str) -> ListItem {
    track(
        "mixcloud",
        title,
        &format!("mixcloud/user@username=NTSRadio@cloudcast@cloudcastId={}", id),
    )
}

pub fn canonical(id: &str) -> String {
    format!("mixcloud/cloudcast@cloudcastId={}", id)
}

pub fn next_page(uri: &str) -> ListItem {
    ListItem {
        item_type: "mixcloudNextPageItem".to_string(),
        ..track("mixcloud", "Load more", uri)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ack {
    Success,
    Silent,
    Error,
}

#[derive(Default)]
pub struct FakeVolumio {
    playlists: RefCell<HashMap<String, Vec<ListItem>>>,
    feeds: HashMap<String, Vec<ListItem>>,
    broken: HashSet<String>,
    failing_adds: HashSet<String>,
    ack: Cell<Option<Ack>>,
    pub edits: RefCell<Vec<(&'static str, String, TrackSpec)>>,
    pub fetched: RefCell<Vec<String>>,
}

impl FakeVolumio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_playlist(self, name: &str, tracks: Vec<ListItem>) -> Self {
        self.playlists.borrow_mut().insert(name.to_string(), tracks);
        self
    }

    pub fn with_feed_page(mut self, locator: &str, items: Vec<ListItem>) -> Self {
        self.feeds.insert(locator.to_string(), items);
        self
    }

    /// Pages at `locator` answer with an undecodable payload.
    pub fn with_broken(mut self, locator: &str) -> Self {
        self.broken.insert(locator.to_string());
        self
    }

    /// Adds of `uri` fail with an undecodable reply.
    pub fn with_failing_add(mut self, uri: &str) -> Self {
        self.failing_adds.insert(uri.to_string());
        self
    }

    pub fn acknowledge(&self, ack: Ack) {
        self.ack.set(Some(ack));
    }

    pub fn playlist(&self, name: &str) -> Vec<ListItem> {
        self.playlists
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn playlist_uris(&self, name: &str) -> Vec<String> {
        self.playlist(name).into_iter().map(|t| t.uri).collect()
    }

    fn toast(&self) -> Option<ToastMessage> {
        let kind = match self.ack.get().unwrap_or(Ack::Success) {
            Ack::Success => "success",
            Ack::Error => "error",
            Ack::Silent => return None,
        };
        Some(ToastMessage {
            message: format!("{} toast", kind),
            title: "Playlist".to_string(),
            kind: kind.to_string(),
        })
    }

    fn title_for(&self, spec: &TrackSpec) -> String {
        self.feeds
            .values()
            .flatten()
            .find(|t| t.canonical_uri() == spec.uri)
            .map(|t| t.title.clone())
            .unwrap_or_else(|| spec.uri.clone())
    }
}

impl PageSource for FakeVolumio {
    fn fetch_page(&self, locator: &str) -> volcontrol::Result<Option<Vec<ListItem>>> {
        self.fetched.borrow_mut().push(locator.to_string());
        if self.broken.contains(locator) {
            return Err(ControlError::decode("browse reply", "invalid type: integer"));
        }
        if let Some(name) = locator.strip_prefix("playlists/") {
            return Ok(Some(self.playlist(name)));
        }
        Ok(self.feeds.get(locator).cloned())
    }
}

impl PlaylistEditor for FakeVolumio {
    fn add_to_playlist(
        &self,
        playlist: &str,
        spec: &TrackSpec,
    ) -> volcontrol::Result<Option<ToastMessage>> {
        self.edits
            .borrow_mut()
            .push(("add", playlist.to_string(), spec.clone()));
        if self.failing_adds.contains(&spec.uri) {
            return Err(ControlError::decode("pushToastMessage", "invalid type: integer"));
        }
        if self.ack.get() != Some(Ack::Error) {
            let added = track(&spec.service, &self.title_for(spec), &spec.uri);
            self.playlists
                .borrow_mut()
                .entry(playlist.to_string())
                .or_default()
                .push(added);
        }
        Ok(self.toast())
    }

    fn remove_from_playlist(
        &self,
        playlist: &str,
        spec: &TrackSpec,
    ) -> volcontrol::Result<Option<ToastMessage>> {
        self.edits
            .borrow_mut()
            .push(("remove", playlist.to_string(), spec.clone()));
        if self.ack.get() != Some(Ack::Error) {
            if let Some(tracks) = self.playlists.borrow_mut().get_mut(playlist) {
                if let Some(pos) = tracks
                    .iter()
                    .position(|t| t.service == spec.service && t.uri == spec.uri)
                {
                    tracks.remove(pos);
                }
            }
        }
        Ok(self.toast())
    }
}
