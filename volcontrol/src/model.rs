use serde::{Deserialize, Serialize};

use crate::uri::canonical_uri;

/// Item types the crawler keeps.
pub const PLAYABLE_ITEM_TYPES: &[&str] = &["song", "folder"];

/// Item types Volumio uses for "load more" entries in paginated feeds.
pub const NEXT_PAGE_ITEM_TYPES: &[&str] = &["mixcloudNextPageItem", "soundcloudNextPageItem"];

/// `year` arrives either as a string or as a number depending on the plugin.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Year {
    Number(i64),
    Text(String),
}

/// One entry of a Volumio browse list.
///
/// Equality and hashing are structural over every field: two records compare
/// equal only if the remote returned exactly the same item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListItem {
    pub service: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub title: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub albumart: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<Year>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ListItem {
    pub fn canonical_uri(&self) -> String {
        canonical_uri(&self.uri)
    }

    pub fn is_playable(&self) -> bool {
        PLAYABLE_ITEM_TYPES.contains(&self.item_type.as_str())
    }

    pub fn is_next_page(&self) -> bool {
        NEXT_PAGE_ITEM_TYPES.contains(&self.item_type.as_str())
    }

    /// Payload identity used when adding this track somewhere.
    pub fn canonical_spec(&self) -> TrackSpec {
        TrackSpec::new(&self.service, &self.canonical_uri())
    }

    /// Payload identity of this exact record, as stored remotely.
    pub fn raw_spec(&self) -> TrackSpec {
        TrackSpec::new(&self.service, &self.uri)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriItem {
    #[serde(default)]
    pub uri: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListContainer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "availableListViews", default)]
    pub available_list_views: Vec<String>,
    pub items: Vec<ListItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    #[serde(default)]
    pub prev: UriItem,
    pub lists: Vec<ListContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ListItem>,
}

/// Reply of `GET /api/v1/browse` and of the `pushBrowseLibrary` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseResponse {
    pub navigation: Navigation,
}

impl BrowseResponse {
    /// Items of the page. Volumio puts the track list last; preceding lists
    /// hold headers or sub-folders of the same page.
    pub fn items(&self) -> &[ListItem] {
        self.navigation
            .lists
            .last()
            .map(|list| list.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn into_items(self) -> Vec<ListItem> {
        self.navigation
            .lists
            .into_iter()
            .last()
            .map(|list| list.items)
            .unwrap_or_default()
    }
}

/// `{service, uri}` pair identifying a track in playlist mutations.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackSpec {
    pub service: String,
    pub uri: String,
}

impl TrackSpec {
    pub fn new(service: &str, uri: &str) -> Self {
        Self {
            service: service.to_string(),
            uri: uri.to_string(),
        }
    }
}

/// Payload of `addToPlaylist` / `removeFromPlaylist`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlaylistTrackRequest<'a> {
    pub name: &'a str,
    pub service: &'a str,
    pub uri: &'a str,
}

/// Payload of `createPlaylist` / `deletePlaylist`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlaylistNameRequest<'a> {
    pub name: &'a str,
}

/// Payload of `browseLibrary`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BrowseRequest<'a> {
    pub uri: &'a str,
}

/// `pushToastMessage` payload, used by Volumio to acknowledge playlist edits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastMessage {
    pub message: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ToastMessage {
    pub fn is_error(&self) -> bool {
        self.kind.eq_ignore_ascii_case("error")
    }
}

/// `pushCreatePlaylist` / `pushDeletePlaylist` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `pushListPlaylist` payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistNames(pub Vec<String>);

/// Player snapshot, as pushed by `pushState` and as stored in the state log.
///
/// `seek` is in milliseconds, `duration` in seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub status: String,
    pub service: String,
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub seek: u64,
    #[serde(default)]
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub albumart: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
}

impl PlayerState {
    pub fn is_playing(&self) -> bool {
        self.status == "play"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_page() -> serde_json::Value {
        json!({
            "navigation": {
                "prev": {"uri": "mixcloud"},
                "lists": [
                    {"availableListViews": ["list"], "items": []},
                    {
                        "title": "NTS Radio",
                        "availableListViews": ["list", "grid"],
                        "items": [
                            {
                                "service": "mixcloud",
                                "type": "song",
                                "title": "Miles Davis - Kind of Blue",
                                "uri": "mixcloud/user@username=NTSRadio@cloudcast@cloudcastId=a",
                                "duration": 3600,
                                "year": 1959
                            },
                            {
                                "service": "mixcloud",
                                "type": "mixcloudNextPageItem",
                                "title": "More...",
                                "uri": "mixcloud/user@username=NTSRadio@pageRef=2"
                            }
                        ]
                    }
                ],
                "info": {
                    "service": "mixcloud",
                    "type": "folder",
                    "title": "NTS Radio",
                    "uri": "mixcloud/user@username=NTSRadio",
                    "year": "2011"
                }
            }
        })
    }

    #[test]
    fn test_browse_response_reads_last_list() {
        let response: BrowseResponse = serde_json::from_value(sample_page()).unwrap();
        let items = response.items();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_playable());
        assert!(items[1].is_next_page());
        assert_eq!(items[0].year, Some(Year::Number(1959)));
        assert_eq!(
            response.navigation.info.as_ref().unwrap().year,
            Some(Year::Text("2011".to_string()))
        );
    }

    #[test]
    fn test_browse_response_without_lists() {
        let response: BrowseResponse =
            serde_json::from_value(json!({"navigation": {"lists": []}})).unwrap();
        assert!(response.items().is_empty());
        assert!(response.into_items().is_empty());
    }

    #[test]
    fn test_list_item_missing_title_is_rejected() {
        let err = serde_json::from_value::<ListItem>(json!({
            "service": "mixcloud", "type": "song", "uri": "x"
        }));
        assert!(err.is_err());
    }

    #[test]
    fn test_structural_equality_covers_metadata() {
        let base: ListItem = serde_json::from_value(json!({
            "service": "mixcloud", "type": "song", "title": "A", "uri": "mixcloud/cloudcast@cloudcastId=1"
        }))
        .unwrap();
        let mut other = base.clone();
        assert_eq!(base, other);
        other.artist = Some("NTS".to_string());
        assert_ne!(base, other);
        assert_eq!(base.canonical_uri(), other.canonical_uri());
    }

    #[test]
    fn test_toast_and_specs() {
        let toast: ToastMessage = serde_json::from_value(json!({
            "message": "Added", "title": "Playlist", "type": "success"
        }))
        .unwrap();
        assert!(!toast.is_error());

        let item = ListItem {
            service: "mixcloud".to_string(),
            item_type: "song".to_string(),
            title: "t".to_string(),
            uri: "mixcloud/user@username=U@cloudcast@cloudcastId=z".to_string(),
            duration: None,
            album: None,
            artist: None,
            albumart: None,
            year: None,
            icon: None,
        };
        assert_eq!(item.canonical_spec().uri, "mixcloud/cloudcast@cloudcastId=z");
        assert_eq!(item.raw_spec().uri, item.uri);
    }

    #[test]
    fn test_player_state_ignores_unknown_fields() {
        let state: PlayerState = serde_json::from_value(json!({
            "status": "play", "service": "mixcloud", "uri": "mixcloud/cloudcast@cloudcastId=1",
            "title": "T", "artist": "NTS", "seek": 45000, "duration": 90,
            "random": false, "repeat": false, "volume": 40
        }))
        .unwrap();
        assert!(state.is_playing());
        assert_eq!(state.seek, 45000);
        assert_eq!(state.volume, Some(40));
    }
}
