//! Server version strings and their ordering.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Release stage of a server version. Stages order `Dev < Beta < Rc < Final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReleaseStage {
    /// Development build, with the number of commits since the branch point.
    Dev {
        /// Commits since the branch point.
        commits: u32,
    },
    /// Beta release.
    Beta(u32),
    /// Release candidate.
    Rc(u32),
    /// Final release.
    Final,
}

/// A parsed server version such as `2.1.0`, `4.0-rc1` or
/// `2.1-dev-384-g4c3c669b41`.
///
/// Ordering compares the numeric version, then the release stage, then the
/// number of commits past a final release (`3.2-12-gabc` > `3.2`).
#[derive(Debug, Clone)]
pub struct ServerVersion {
    raw: String,
    major: u32,
    minor: u32,
    patch: u32,
    stage: ReleaseStage,
    post_commits: u32,
}

impl ServerVersion {
    /// Parses a server version string.
    pub fn parse(raw: &str) -> ProtocolResult<Self> {
        let invalid = || ProtocolError::InvalidVersion(raw.to_string());
        let trimmed = raw.trim();
        let without_build = trimmed.split('+').next().unwrap_or_default();
        let (numeric, suffix) = match without_build.split_once('-') {
            Some((numeric, suffix)) => (numeric, Some(suffix)),
            None => (without_build, None),
        };

        let parts = numeric
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;
        let (major, minor, patch) = match parts.as_slice() {
            [major] => (*major, 0, 0),
            [major, minor] => (*major, *minor, 0),
            [major, minor, patch] => (*major, *minor, *patch),
            _ => return Err(invalid()),
        };

        let (stage, post_commits) = match suffix {
            None => (ReleaseStage::Final, 0),
            Some(suffix) => parse_suffix(suffix).ok_or_else(invalid)?,
        };

        Ok(Self {
            raw: trimmed.to_string(),
            major,
            minor,
            patch,
            stage,
            post_commits,
        })
    }

    /// Builds a version from its components; `raw` is kept as the reported string.
    pub fn from_parts(
        raw: impl Into<String>,
        (major, minor, patch): (u32, u32, u32),
        stage: ReleaseStage,
    ) -> Self {
        Self {
            raw: raw.into(),
            major,
            minor,
            patch,
            stage,
            post_commits: 0,
        }
    }

    /// Returns the version string as reported by the server.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the `(major, minor, patch)` triple.
    pub fn numeric(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }

    /// Returns the release stage.
    pub fn stage(&self) -> ReleaseStage {
        self.stage
    }

    /// Returns true if this version is the same as or newer than `other`.
    pub fn is_at_least(&self, other: &ServerVersion) -> bool {
        self >= other
    }

    fn key(&self) -> (u32, u32, u32, ReleaseStage, u32) {
        (
            self.major,
            self.minor,
            self.patch,
            self.stage,
            self.post_commits,
        )
    }
}

fn parse_suffix(suffix: &str) -> Option<(ReleaseStage, u32)> {
    let mut segments = suffix.split('-');
    let head = segments.next()?;
    if head == "dev" {
        let commits = match segments.next() {
            Some(count) => count.parse().ok()?,
            None => 0,
        };
        return Some((ReleaseStage::Dev { commits }, 0));
    }
    if let Some(n) = head.strip_prefix("beta") {
        return Some((ReleaseStage::Beta(parse_stage_number(n)?), 0));
    }
    if let Some(n) = head.strip_prefix("rc") {
        return Some((ReleaseStage::Rc(parse_stage_number(n)?), 0));
    }
    // `3.2-12-gabcdef`: commits on a maintenance branch after a release.
    head.parse().ok().map(|commits| (ReleaseStage::Final, commits))
}

fn parse_stage_number(n: &str) -> Option<u32> {
    if n.is_empty() {
        Some(0)
    } else {
        n.parse().ok()
    }
}

impl PartialEq for ServerVersion {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ServerVersion {}

impl PartialOrd for ServerVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServerVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ServerVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        Self::parse(s)
    }
}

impl Serialize for ServerVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ServerVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
