//! Sync settings on top of `volconfig::Config`.
//!
//! Getters write the default back when a key is missing, so `config.yaml`
//! ends up listing every setting in use.
//!
//! ```no_run
//! use volconfig::Config;
//! use volsync::SyncConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load_config("")?;
//! let rotation = config.get_rotation_policy()?;
//! println!("{} keeps {} tracks", rotation.playlist, rotation.capacity);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use anyhow::Result;
use serde_yaml::{Number, Value};
use volconfig::Config;

use crate::crawler::{DEFAULT_MAX_TRACKS, DEFAULT_MIN_OVERLAP};
use crate::progress::DEFAULT_TRACKED_SERVICES;
use crate::synchronizer::{
    DEFAULT_ROTATION_CAPACITY, DEFAULT_ROTATION_PLAYLIST, EvictionOrder, RotationPolicy,
};

pub const DEFAULT_RULES_FILE: &str = "playlist_patterns.json";
pub const DEFAULT_STATE_LOG: &str = "logs/state.log";
pub const DEFAULT_PROGRESS_OUTPUT: &str = "progress.json";

pub trait SyncConfigExt {
    /// JSON file holding the playlist rules
    fn get_rules_path(&self) -> Result<PathBuf>;

    /// Feeds crawled for new tracks
    fn get_feed_sources(&self) -> Result<Vec<String>>;

    fn get_max_tracks(&self) -> Result<usize>;

    fn get_overlap_threshold(&self) -> Result<usize>;

    fn get_rotation_policy(&self) -> Result<RotationPolicy>;

    fn set_rotation_policy(&self, policy: &RotationPolicy) -> Result<()>;

    fn get_state_log_path(&self) -> Result<PathBuf>;

    fn get_progress_output_path(&self) -> Result<PathBuf>;

    /// Services whose listening progress is tracked
    fn get_tracked_services(&self) -> Result<Vec<String>>;
}

fn get_usize(config: &Config, path: &[&str], default: usize) -> Result<usize> {
    match config.get_value(path) {
        Ok(Value::Number(n)) if n.as_u64().is_some() => {
            Ok(n.as_u64().map(|v| v as usize).unwrap_or(default))
        }
        _ => {
            config.set_value(path, Value::Number(Number::from(default as u64)))?;
            Ok(default)
        }
    }
}

fn get_list(config: &Config, path: &[&str], default: &[&str]) -> Result<Vec<String>> {
    match config.get_value(path) {
        Ok(Value::Sequence(_)) => Ok(config.get_string_list(path)),
        _ => {
            let default: Vec<String> = default.iter().map(|s| s.to_string()).collect();
            config.set_string_list(path, &default)?;
            Ok(default)
        }
    }
}

impl SyncConfigExt for Config {
    fn get_rules_path(&self) -> Result<PathBuf> {
        self.get_managed_file(&["sync", "rules_file"], DEFAULT_RULES_FILE)
    }

    fn get_feed_sources(&self) -> Result<Vec<String>> {
        get_list(self, &["sync", "feeds"], &[])
    }

    fn get_max_tracks(&self) -> Result<usize> {
        get_usize(self, &["sync", "max_tracks"], DEFAULT_MAX_TRACKS)
    }

    fn get_overlap_threshold(&self) -> Result<usize> {
        get_usize(self, &["sync", "overlap_threshold"], DEFAULT_MIN_OVERLAP)
    }

    fn get_rotation_policy(&self) -> Result<RotationPolicy> {
        let playlist = match self.get_value(&["sync", "rotation", "playlist"]) {
            Ok(Value::String(name)) if !name.trim().is_empty() => name,
            _ => {
                self.set_value(
                    &["sync", "rotation", "playlist"],
                    Value::String(DEFAULT_ROTATION_PLAYLIST.to_string()),
                )?;
                DEFAULT_ROTATION_PLAYLIST.to_string()
            }
        };
        let capacity = get_usize(self, &["sync", "rotation", "capacity"], DEFAULT_ROTATION_CAPACITY)?;
        let eviction: EvictionOrder = self
            .get_string(&["sync", "rotation", "eviction"], "front")
            .parse()?;

        Ok(RotationPolicy::new(&playlist, capacity, eviction)?)
    }

    fn set_rotation_policy(&self, policy: &RotationPolicy) -> Result<()> {
        self.set_value(
            &["sync", "rotation", "playlist"],
            Value::String(policy.playlist.clone()),
        )?;
        self.set_value(
            &["sync", "rotation", "capacity"],
            Value::Number(Number::from(policy.capacity as u64)),
        )?;
        self.set_value(
            &["sync", "rotation", "eviction"],
            Value::String(policy.eviction.to_string()),
        )
    }

    fn get_state_log_path(&self) -> Result<PathBuf> {
        self.get_managed_file(&["progress", "state_log"], DEFAULT_STATE_LOG)
    }

    fn get_progress_output_path(&self) -> Result<PathBuf> {
        self.get_managed_file(&["progress", "output"], DEFAULT_PROGRESS_OUTPUT)
    }

    fn get_tracked_services(&self) -> Result<Vec<String>> {
        get_list(self, &["progress", "services"], DEFAULT_TRACKED_SERVICES)
    }
}
