//! Reconciliation of playlist rules against the player.
//!
//! A sync pass walks the rules in document order. For each playlist it reads
//! the current content, adds the matching candidates that are not already
//! there (by canonical URI), and remembers every track it added. Those newly
//! added tracks are then folded into the rotation playlist, which is trimmed
//! back to its capacity.
//!
//! Nothing is retried. An edit that gets no acknowledgement is reported with
//! an unknown outcome; a hard failure (undecodable reply, broken transport)
//! abandons the current playlist only.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, warn};
use volcontrol::{ListItem, PageSource, PlaylistEditor, TrackSpec};

use crate::classifier::classify;
use crate::crawler::Crawler;
use crate::errors::{Result, SyncError};
use crate::rules::{PlaylistRule, RuleSet};

pub const DEFAULT_ROTATION_PLAYLIST: &str = "- latest 50";
pub const DEFAULT_ROTATION_CAPACITY: usize = 50;

/// Which end of the rotation playlist loses tracks when it overflows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EvictionOrder {
    /// Oldest entries first.
    #[default]
    Front,
    /// Most recent entries first.
    Back,
}

impl FromStr for EvictionOrder {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "front" | "oldest" => Ok(EvictionOrder::Front),
            "back" | "newest" => Ok(EvictionOrder::Back),
            other => Err(SyncError::Rotation(format!(
                "unknown eviction order '{}' (expected 'front' or 'back')",
                other
            ))),
        }
    }
}

impl fmt::Display for EvictionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionOrder::Front => f.write_str("front"),
            EvictionOrder::Back => f.write_str("back"),
        }
    }
}

/// Bounded "recently added" playlist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationPolicy {
    pub playlist: String,
    pub capacity: usize,
    pub eviction: EvictionOrder,
}

impl RotationPolicy {
    pub fn new(playlist: &str, capacity: usize, eviction: EvictionOrder) -> Result<Self> {
        if playlist.trim().is_empty() {
            return Err(SyncError::Rotation("playlist name cannot be empty".to_string()));
        }
        Ok(Self {
            playlist: playlist.to_string(),
            capacity,
            eviction,
        })
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            playlist: DEFAULT_ROTATION_PLAYLIST.to_string(),
            capacity: DEFAULT_ROTATION_CAPACITY,
            eviction: EvictionOrder::Front,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    Add,
    Remove,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    Acknowledged,
    /// The player answered with an error toast.
    Rejected(String),
    /// No acknowledgement before the deadline.
    Unknown,
}

/// One playlist edit issued during a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub playlist: String,
    pub track: TrackSpec,
    pub title: String,
    pub outcome: MutationOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistFailure {
    pub playlist: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    pub mutations: Vec<Mutation>,
    pub failures: Vec<PlaylistFailure>,
    /// Tracks added to rule playlists, in discovery order.
    pub newly_added: Vec<TrackSpec>,
}

impl SyncReport {
    pub fn adds(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter().filter(|m| m.kind == MutationKind::Add)
    }

    pub fn removes(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter().filter(|m| m.kind == MutationKind::Remove)
    }

    pub fn for_playlist<'a>(&'a self, playlist: &'a str) -> impl Iterator<Item = &'a Mutation> {
        self.mutations.iter().filter(move |m| m.playlist == playlist)
    }

    pub fn unknown_outcomes(&self) -> usize {
        self.mutations
            .iter()
            .filter(|m| m.outcome == MutationOutcome::Unknown)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Insertion-ordered set of tracks, keyed by canonical URI.
#[derive(Default)]
struct NewlyAdded {
    keys: HashSet<String>,
    tracks: Vec<ListItem>,
}

impl NewlyAdded {
    fn push(&mut self, track: &ListItem) {
        if self.keys.insert(track.canonical_uri()) {
            self.tracks.push(track.clone());
        }
    }
}

pub struct Synchronizer<S: PageSource, E: PlaylistEditor> {
    crawler: Crawler<S>,
    editor: E,
}

impl<S: PageSource, E: PlaylistEditor> Synchronizer<S, E> {
    pub fn new(crawler: Crawler<S>, editor: E) -> Self {
        Self { crawler, editor }
    }

    pub fn crawler(&self) -> &Crawler<S> {
        &self.crawler
    }

    /// Runs one full pass over `rules` and the rotation playlist.
    pub fn sync(
        &self,
        candidates: &[ListItem],
        rules: &RuleSet,
        rotation: &RotationPolicy,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let mut newly_added = NewlyAdded::default();

        for rule in rules {
            info!(playlist = rule.name(), "Synchronizing playlist");
            if let Err(err) = self.sync_rule(candidates, rule, &mut newly_added, &mut report) {
                warn!(playlist = rule.name(), "Playlist skipped: {}", err);
                report.failures.push(PlaylistFailure {
                    playlist: rule.name().to_string(),
                    reason: err.to_string(),
                });
            }
        }

        report.newly_added = newly_added
            .tracks
            .iter()
            .map(ListItem::canonical_spec)
            .collect();

        if let Err(err) = self.rotate(&newly_added.tracks, rotation, &mut report) {
            warn!(playlist = %rotation.playlist, "Rotation skipped: {}", err);
            report.failures.push(PlaylistFailure {
                playlist: rotation.playlist.clone(),
                reason: err.to_string(),
            });
        }

        info!(
            adds = report.adds().count(),
            removes = report.removes().count(),
            unknown = report.unknown_outcomes(),
            failures = report.failures.len(),
            "Synchronization finished"
        );
        report
    }

    fn sync_rule(
        &self,
        candidates: &[ListItem],
        rule: &PlaylistRule,
        newly_added: &mut NewlyAdded,
        report: &mut SyncReport,
    ) -> Result<()> {
        let current = self.crawler.playlist(rule.name())?;
        let mut present: HashSet<String> = current.iter().map(ListItem::canonical_uri).collect();

        for track in classify(candidates, rule) {
            let uri = track.canonical_uri();
            if !present.insert(uri) {
                debug!(playlist = rule.name(), title = %track.title, "Already in playlist");
                continue;
            }

            let mutation = self.apply(
                MutationKind::Add,
                rule.name(),
                track.canonical_spec(),
                &track.title,
            )?;
            if !matches!(mutation.outcome, MutationOutcome::Rejected(_)) {
                newly_added.push(track);
            }
            report.mutations.push(mutation);
        }
        Ok(())
    }

    fn rotate(
        &self,
        newly_added: &[ListItem],
        policy: &RotationPolicy,
        report: &mut SyncReport,
    ) -> Result<()> {
        let current = self.crawler.playlist(&policy.playlist)?;
        let present: HashSet<String> = current.iter().map(ListItem::canonical_uri).collect();

        for track in newly_added.iter().take(policy.capacity) {
            if present.contains(&track.canonical_uri()) {
                debug!(playlist = %policy.playlist, title = %track.title, "Already in rotation");
                continue;
            }
            let mutation = self.apply(
                MutationKind::Add,
                &policy.playlist,
                track.canonical_spec(),
                &track.title,
            )?;
            report.mutations.push(mutation);
        }

        let after = self.crawler.playlist(&policy.playlist)?;
        let overflow = after.len().saturating_sub(policy.capacity);
        if overflow == 0 {
            return Ok(());
        }
        info!(playlist = %policy.playlist, overflow, eviction = %policy.eviction, "Trimming rotation playlist");

        let evicted = match policy.eviction {
            EvictionOrder::Front => &after[..overflow],
            EvictionOrder::Back => &after[after.len() - overflow..],
        };
        for track in evicted {
            let mutation = self.apply(
                MutationKind::Remove,
                &policy.playlist,
                track.raw_spec(),
                &track.title,
            )?;
            report.mutations.push(mutation);
        }
        Ok(())
    }

    /// Removes exact duplicates from `playlist`.
    ///
    /// A record present k times gets k-1 removals; structurally different
    /// records sharing a canonical URI are left alone.
    pub fn dedupe(&self, playlist: &str) -> Result<Vec<Mutation>> {
        let tracks = self.crawler.playlist(playlist)?;

        let mut counts: Vec<(&ListItem, usize)> = Vec::new();
        let mut index: HashMap<&ListItem, usize> = HashMap::new();
        for track in &tracks {
            match index.get(track) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    index.insert(track, counts.len());
                    counts.push((track, 1));
                }
            }
        }

        let mut mutations = Vec::new();
        for (track, count) in counts {
            for _ in 1..count {
                mutations.push(self.apply(
                    MutationKind::Remove,
                    playlist,
                    track.raw_spec(),
                    &track.title,
                )?);
            }
        }
        info!(playlist, removed = mutations.len(), "Deduplicated playlist");
        Ok(mutations)
    }

    fn apply(
        &self,
        kind: MutationKind,
        playlist: &str,
        track: TrackSpec,
        title: &str,
    ) -> Result<Mutation> {
        let reply = match kind {
            MutationKind::Add => self.editor.add_to_playlist(playlist, &track)?,
            MutationKind::Remove => self.editor.remove_from_playlist(playlist, &track)?,
        };

        let outcome = match reply {
            Some(toast) if toast.is_error() => {
                warn!(playlist, title, ?kind, message = %toast.message, "Edit rejected");
                MutationOutcome::Rejected(toast.message)
            }
            Some(_) => {
                info!(playlist, title, ?kind, "Edit acknowledged");
                MutationOutcome::Acknowledged
            }
            None => {
                warn!(playlist, title, ?kind, "No acknowledgement, outcome unknown");
                MutationOutcome::Unknown
            }
        };

        Ok(Mutation {
            kind,
            playlist: playlist.to_string(),
            track,
            title: title.to_string(),
            outcome,
        })
    }
}
