//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of plain strings and numbers (e.g.,
//! passing a repository name where a branch is expected) and make the code
//! more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A pull request number within a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrNumber(pub u64);

impl fmt::Display for PrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for PrNumber {
    fn from(n: u64) -> Self {
        PrNumber(n)
    }
}

/// Error produced when a repository full name does not have the
/// `owner/repo` shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid repository full name: {0:?} (expected owner/repo)")]
pub struct RepoNameError(pub String);

/// A repository full name in `owner/repo` format.
///
/// The original casing is preserved for display and API paths; rule lookup
/// uses [`RepoName::lookup_key`], which lower-cases the name so configured
/// repositories match regardless of how the webhook spells them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RepoName(String);

impl RepoName {
    /// Parses a full name, requiring exactly one `/` with non-empty
    /// owner and repository parts.
    pub fn parse(s: impl Into<String>) -> Result<Self, RepoNameError> {
        let s = s.into();
        match s.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(RepoName(s))
            }
            _ => Err(RepoNameError(s)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The owner part of `owner/repo`.
    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(o, _)| o).unwrap_or(&self.0)
    }

    /// The repository part of `owner/repo`.
    pub fn repo(&self) -> &str {
        self.0.split_once('/').map(|(_, r)| r).unwrap_or(&self.0)
    }

    /// The case-insensitive key used for rule table lookup.
    pub fn lookup_key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RepoName {
    type Error = RepoNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        RepoName::parse(s)
    }
}

impl<'de> Deserialize<'de> for RepoName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RepoName::parse(s).map_err(serde::de::Error::custom)
    }
}
