//! Playlist rules document.
//!
//! A JSON object mapping each playlist name to the lowercase substrings that
//! route a track into it:
//!
//! ```json
//! {
//!   "jazz": ["miles davis", "coltrane"],
//!   "ambient": ["eno", "drone"]
//! }
//! ```
//!
//! Document order is kept: rules are applied in the order they are written.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::RulesError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistRule {
    name: String,
    patterns: Vec<String>,
}

impl PlaylistRule {
    /// Builds a validated rule. Patterns are lowercased and duplicates
    /// dropped, keeping the first occurrence.
    pub fn new<I, S>(name: &str, patterns: I) -> Result<Self, RulesError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if name.trim().is_empty() {
            return Err(RulesError::EmptyName);
        }

        let mut seen = HashSet::new();
        let mut normalized = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().to_lowercase();
            if pattern.trim().is_empty() {
                return Err(RulesError::EmptyPattern(name.to_string()));
            }
            if seen.insert(pattern.clone()) {
                normalized.push(pattern);
            }
        }
        if normalized.is_empty() {
            return Err(RulesError::NoPatterns(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            patterns: normalized,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True when any pattern occurs in `title`, ignoring case.
    pub fn matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.patterns.iter().any(|p| title.contains(p.as_str()))
    }
}

/// Ordered, validated set of playlist rules.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<PlaylistRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<PlaylistRule>) -> Result<Self, RulesError> {
        let mut names = HashSet::new();
        for rule in &rules {
            if !names.insert(rule.name.as_str()) {
                return Err(RulesError::DuplicatePlaylist(rule.name.clone()));
            }
        }
        Ok(Self { rules })
    }

    pub fn from_json(document: &str) -> Result<Self, RulesError> {
        let raw: RawRules =
            serde_json::from_str(document).map_err(|err| RulesError::Malformed(err.to_string()))?;
        let rules = raw
            .0
            .into_iter()
            .map(|(name, patterns)| PlaylistRule::new(&name, patterns))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rules)
    }

    pub fn load(path: &Path) -> Result<Self, RulesError> {
        let document = fs::read_to_string(path).map_err(|source| RulesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = Self::from_json(&document)?;
        info!(path = %path.display(), count = rules.len(), "Loaded playlist rules");
        Ok(rules)
    }

    pub fn to_json(&self) -> Result<String, RulesError> {
        serde_json::to_string_pretty(self).map_err(|err| RulesError::Malformed(err.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), RulesError> {
        let document = self.to_json()?;
        fs::write(path, document).map_err(|source| RulesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Saved playlist rules");
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaylistRule> {
        self.rules.iter()
    }

    pub fn get(&self, name: &str) -> Option<&PlaylistRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a PlaylistRule;
    type IntoIter = std::slice::Iter<'a, PlaylistRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl Serialize for RuleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rules.len()))?;
        for rule in &self.rules {
            map.serialize_entry(&rule.name, &rule.patterns)?;
        }
        map.end()
    }
}

/// Entries of the document in the order they appear, duplicates included.
struct RawRules(Vec<(String, Vec<String>)>);

impl<'de> Deserialize<'de> for RawRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawRulesVisitor;

        impl<'de> Visitor<'de> for RawRulesVisitor {
            type Value = RawRules;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping playlist names to lists of patterns")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawRules, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, patterns)) = access.next_entry::<String, Vec<String>>()? {
                    entries.push((name, patterns));
                }
                Ok(RawRules(entries))
            }
        }

        deserializer.deserialize_map(RawRulesVisitor)
    }
}
