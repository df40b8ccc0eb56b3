//! Flattening of paginated browse results.
//!
//! Volumio paginates long feeds by appending a "next page" item whose URI is
//! the locator of the following page. The crawler follows those markers,
//! keeping playable items, until the feed runs out, a stop condition fires,
//! a page cannot be fetched, or a locator comes back a second time.

use std::collections::HashSet;

use tracing::{debug, info, warn};
use volcontrol::{ListItem, PageSource, playlist_locator};

use crate::errors::Result;

pub const DEFAULT_MAX_TRACKS: usize = 5000;
pub const DEFAULT_MIN_OVERLAP: usize = 5;

/// Decides, after each page, whether the crawl has gathered enough.
pub trait StopCondition {
    fn should_stop(&self, accumulated: &[ListItem]) -> bool;
}

impl<F> StopCondition for F
where
    F: Fn(&[ListItem]) -> bool,
{
    fn should_stop(&self, accumulated: &[ListItem]) -> bool {
        self(accumulated)
    }
}

/// Stops once the accumulated count exceeds the limit.
#[derive(Clone, Copy, Debug)]
pub struct MaxTracks(pub usize);

impl StopCondition for MaxTracks {
    fn should_stop(&self, accumulated: &[ListItem]) -> bool {
        accumulated.len() > self.0
    }
}

/// Stops once at least `min_overlap` known tracks have been seen again.
///
/// Feeds are newest-first: meeting tracks that were already collected on a
/// previous run means everything further down is old.
#[derive(Clone, Debug)]
pub struct Overlap {
    known: HashSet<String>,
    min_overlap: usize,
}

impl Overlap {
    pub fn new(known: HashSet<String>, min_overlap: usize) -> Self {
        Self { known, min_overlap }
    }

    pub fn from_tracks(tracks: &[ListItem], min_overlap: usize) -> Self {
        Self::new(tracks.iter().map(ListItem::canonical_uri).collect(), min_overlap)
    }

    fn overlap(&self, accumulated: &[ListItem]) -> usize {
        accumulated
            .iter()
            .map(ListItem::canonical_uri)
            .filter(|uri| self.known.contains(uri))
            .collect::<HashSet<_>>()
            .len()
    }
}

impl StopCondition for Overlap {
    fn should_stop(&self, accumulated: &[ListItem]) -> bool {
        self.overlap(accumulated) >= self.min_overlap
    }
}

/// Why a crawl ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrawlEnd {
    /// The last page had no next-page marker.
    Exhausted,
    /// The stop condition fired.
    Stopped,
    /// A next-page marker pointed to an already visited locator.
    Cycle,
    /// A page could not be fetched; the result is partial.
    Unavailable,
}

#[derive(Clone, Debug)]
pub struct Crawl {
    pub items: Vec<ListItem>,
    pub pages: usize,
    pub end: CrawlEnd,
}

pub struct Crawler<S: PageSource> {
    source: S,
    max_tracks: usize,
}

impl<S: PageSource> Crawler<S> {
    pub fn new(source: S) -> Self {
        Self::with_max_tracks(source, DEFAULT_MAX_TRACKS)
    }

    pub fn with_max_tracks(source: S, max_tracks: usize) -> Self {
        Self { source, max_tracks }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn max_tracks(&self) -> usize {
        self.max_tracks
    }

    /// Crawls `start` under the default safety limit.
    pub fn browse(&self, start: &str) -> Result<Vec<ListItem>> {
        Ok(self.crawl(start, &MaxTracks(self.max_tracks))?.items)
    }

    /// Crawls `start` until `stop` fires or the feed ends.
    pub fn browse_until(&self, start: &str, stop: &dyn StopCondition) -> Result<Vec<ListItem>> {
        Ok(self.crawl(start, stop)?.items)
    }

    /// Current content of a stored playlist.
    pub fn playlist(&self, name: &str) -> Result<Vec<ListItem>> {
        self.browse(&playlist_locator(name))
    }

    pub fn crawl(&self, start: &str, stop: &dyn StopCondition) -> Result<Crawl> {
        let mut items: Vec<ListItem> = Vec::new();
        let mut seen: HashSet<ListItem> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut locator = start.to_string();
        let mut pages = 0;

        let end = loop {
            visited.insert(locator.clone());

            let Some(page) = self.source.fetch_page(&locator)? else {
                warn!(locator = %locator, pages, "Page unavailable, keeping partial crawl");
                break CrawlEnd::Unavailable;
            };
            pages += 1;

            let mut next = None;
            for item in page {
                if item.is_next_page() {
                    next.get_or_insert(item.uri);
                } else if item.is_playable() && seen.insert(item.clone()) {
                    items.push(item);
                }
            }
            debug!(locator = %locator, page = pages, total = items.len(), "Crawled page");

            if stop.should_stop(&items) {
                break CrawlEnd::Stopped;
            }
            match next {
                None => break CrawlEnd::Exhausted,
                Some(uri) if visited.contains(&uri) => {
                    warn!(locator = %uri, "Next page already visited, stopping");
                    break CrawlEnd::Cycle;
                }
                Some(uri) => locator = uri,
            }
        };

        debug!(start, pages, count = items.len(), ?end, "Crawl finished");
        Ok(Crawl { items, pages, end })
    }

    /// Gathers new tracks from every feed source.
    ///
    /// Each feed is crawled until `min_overlap` tracks already present in
    /// `known_playlist` reappear (or the safety limit is reached). Results
    /// are concatenated in source order.
    pub fn collect_candidates(
        &self,
        sources: &[String],
        known_playlist: &str,
        min_overlap: usize,
    ) -> Result<Vec<ListItem>> {
        let known = self.playlist(known_playlist)?;
        let overlap = Overlap::from_tracks(&known, min_overlap);
        let limit = MaxTracks(self.max_tracks);
        let stop = |acc: &[ListItem]| overlap.should_stop(acc) || limit.should_stop(acc);

        let mut candidates = Vec::new();
        for source in sources {
            let tracks = self.browse_until(source, &stop)?;
            info!(source = %source, count = tracks.len(), "Collected feed tracks");
            candidates.extend(tracks);
        }
        Ok(candidates)
    }
}
