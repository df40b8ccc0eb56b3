//! Canonical track URIs.
//!
//! Volumio hands out Mixcloud and SoundCloud URIs that embed the browse path
//! the track was reached through (`mixcloud/user@username=X@cloudcast@...`)
//! and sometimes a trailing one-time suffix. Two fetches of the same remote
//! track can therefore disagree on the raw URI. The canonical form keeps only
//! the service prefix and the track identifier.

use once_cell::sync::Lazy;
use regex::Regex;

static MIXCLOUD_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(mixcloud/)(.+)?(cloudcast@cloudcastId=[^@]+)(@.+)?$")
        .expect("static mixcloud pattern")
});

static SOUNDCLOUD_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(soundcloud/)(.+)?(track@trackId=[^@]+)(@.+)?$")
        .expect("static soundcloud pattern")
});

/// Strips session-scoped parts from a track URI.
///
/// Total and idempotent: URIs of unknown services, or that do not carry a
/// track identifier, are returned unchanged.
pub fn canonical_uri(uri: &str) -> String {
    if uri.starts_with("mixcloud") {
        return MIXCLOUD_URI.replace(uri, "${1}${3}").into_owned();
    }
    if uri.starts_with("soundcloud") {
        return SOUNDCLOUD_URI.replace(uri, "${1}${3}").into_owned();
    }
    uri.to_string()
}

/// Browse locator of a named playlist.
pub fn playlist_locator(name: &str) -> String {
    format!("playlists/{}", name)
}
