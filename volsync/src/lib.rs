//! Playlist synchronization for Volumio.
//!
//! - [`Crawler`] flattens paginated browse results under a stop condition;
//! - [`classify`] routes candidate tracks into playlists by title patterns;
//! - [`Synchronizer`] adds what is missing, maintains the rotation playlist
//!   and removes exact duplicates;
//! - [`ProgressTracker`] replays the player state log into listening progress.

pub mod classifier;
pub mod config_ext;
pub mod crawler;
pub mod errors;
pub mod progress;
pub mod rules;
pub mod synchronizer;

pub use classifier::{classify, classify_all};
pub use config_ext::SyncConfigExt;
pub use crawler::{
    Crawl, CrawlEnd, Crawler, DEFAULT_MAX_TRACKS, DEFAULT_MIN_OVERLAP, MaxTracks, Overlap,
    StopCondition,
};
pub use errors::{Result, RulesError, SyncError};
pub use progress::{
    ProgressMap, ProgressTracker, StateLogEntry, append_state, read_state_log, write_progress,
};
pub use rules::{PlaylistRule, RuleSet};
pub use synchronizer::{
    EvictionOrder, Mutation, MutationKind, MutationOutcome, PlaylistFailure, RotationPolicy,
    SyncReport, Synchronizer,
};
