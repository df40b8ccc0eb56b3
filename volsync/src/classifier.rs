use tracing::debug;
use volcontrol::ListItem;

use crate::rules::{PlaylistRule, RuleSet};

/// Tracks of `tracks` whose title matches `rule`, in candidate order.
pub fn classify<'a>(tracks: &'a [ListItem], rule: &PlaylistRule) -> Vec<&'a ListItem> {
    let matches: Vec<&ListItem> = tracks.iter().filter(|t| rule.matches(&t.title)).collect();
    debug!(
        playlist = rule.name(),
        candidates = tracks.len(),
        matches = matches.len(),
        "Classified candidates"
    );
    matches
}

/// Applies every rule independently; a track can land in several buckets.
pub fn classify_all<'a, 'r>(
    tracks: &'a [ListItem],
    rules: &'r RuleSet,
) -> Vec<(&'r PlaylistRule, Vec<&'a ListItem>)> {
    rules.iter().map(|rule| (rule, classify(tracks, rule))).collect()
}
