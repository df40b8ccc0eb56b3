//! Listening progress, replayed from the player state log.
//!
//! The state log holds one JSON object per line, `{"ts": ..., "state": {...}}`,
//! where `state` is a Volumio `pushState` snapshot. For every track the
//! furthest seek position seen is compared to the latest known duration.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};
use volcontrol::{PlayerState, canonical_uri};

use crate::errors::{Result, SyncError};

pub const DEFAULT_TRACKED_SERVICES: &[&str] = &["mixcloud", "soundcloud"];

/// Canonical URI → percent listened.
pub type ProgressMap = BTreeMap<String, u32>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateLogEntry {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub ts: NaiveDateTime,
    pub state: PlayerState,
}

impl StateLogEntry {
    pub fn new(ts: DateTime<Utc>, state: PlayerState) -> Self {
        Self {
            ts: ts.naive_utc(),
            state,
        }
    }
}

/// Accepts RFC 3339 timestamps as well as naive ones (`2024-03-01T10:00:00.123`
/// or with a space separator). Offsets are normalized to UTC.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(&raw, format) {
            return Ok(ts);
        }
    }
    Err(serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

/// Percent of a track listened to: seek/duration rounded to one decimal,
/// times 100. `None` when the duration is zero.
pub fn percent(seek_ms: u64, duration_s: u64) -> Option<u32> {
    if duration_s == 0 {
        return None;
    }
    let ratio = (seek_ms as f64 / 1000.0) / duration_s as f64;
    Some(((ratio * 10.0).round() * 10.0) as u32)
}

pub struct ProgressTracker {
    services: Vec<String>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKED_SERVICES.iter().map(|s| s.to_string()).collect())
    }
}

impl ProgressTracker {
    pub fn new(services: Vec<String>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    fn is_tracked(&self, service: &str) -> bool {
        self.services.iter().any(|s| s == service)
    }

    pub fn compute_progress<I, L>(&self, lines: I) -> ProgressMap
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let mut max_seek: HashMap<String, u64> = HashMap::new();
        let mut durations: HashMap<String, u64> = HashMap::new();

        for (n, line) in lines.into_iter().enumerate() {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            let entry: StateLogEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(line = n + 1, "Skipping unreadable state log line: {}", err);
                    continue;
                }
            };
            if !self.is_tracked(&entry.state.service) {
                continue;
            }

            let uri = canonical_uri(&entry.state.uri);
            let seek = max_seek.entry(uri.clone()).or_insert(0);
            *seek = (*seek).max(entry.state.seek);
            durations.insert(uri, entry.state.duration);
        }

        let mut progress = ProgressMap::new();
        for (uri, duration) in durations {
            let seek = max_seek.get(&uri).copied().unwrap_or(0);
            match percent(seek, duration) {
                Some(p) => {
                    progress.insert(uri, p);
                }
                None => debug!(uri = %uri, "Zero duration, progress omitted"),
            }
        }
        progress
    }

    /// Reads and replays a state log file.
    pub fn progress_from_file(&self, path: &Path) -> Result<ProgressMap> {
        let lines = read_state_log(path)?;
        let progress = self.compute_progress(&lines);
        info!(path = %path.display(), lines = lines.len(), tracks = progress.len(), "Computed listening progress");
        Ok(progress)
    }
}

/// Lines of the state log; a missing file is an empty log.
pub fn read_state_log(path: &Path) -> Result<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.lines().map(str::to_string).collect()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No state log yet");
            Ok(Vec::new())
        }
        Err(err) => Err(SyncError::io(path, err)),
    }
}

/// Appends one snapshot to the state log.
pub fn append_state(path: &Path, entry: &StateLogEntry) -> Result<()> {
    let line = serde_json::to_string(entry).map_err(|err| SyncError::Encode(err.to_string()))?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| SyncError::io(path, err))?;
    writeln!(file, "{}", line).map_err(|err| SyncError::io(path, err))
}

/// Writes the progress map as a JSON object.
pub fn write_progress(path: &Path, progress: &ProgressMap) -> Result<()> {
    let json =
        serde_json::to_string_pretty(progress).map_err(|err| SyncError::Encode(err.to_string()))?;
    fs::write(path, json).map_err(|err| SyncError::io(path, err))
}
