//! The subset of the Gitea pull-request webhook payload the service reads.
//!
//! Only `pull_request` events with action `opened` or `reopened` produce
//! tasks; everything else is acknowledged and dropped. Older Gitea versions
//! omit `pull_request.number` and only send the top-level `number`, so both
//! are read with the nested field taking precedence.

use serde::Deserialize;

use crate::types::{PrNumber, PullRequestInfo};

/// Action field of a `pull_request` event.
///
/// Gitea sends more actions than we care about; unknown ones collapse into
/// `Other` rather than failing deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrAction {
    Opened,
    Reopened,
    Closed,
    Edited,
    Synchronized,
    #[serde(other)]
    Other,
}

impl PrAction {
    /// Whether this action starts a watch.
    pub fn is_watched(self) -> bool {
        matches!(self, PrAction::Opened | PrAction::Reopened)
    }
}

/// A `pull_request` webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: PrAction,

    /// Top-level PR number; fallback when the nested one is missing.
    #[serde(default)]
    pub number: Option<u64>,

    #[serde(default)]
    pub pull_request: Option<PullRequestPayload>,

    pub repository: RepositoryPayload,

    #[serde(default)]
    pub sender: Option<SenderPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    #[serde(default)]
    pub number: Option<u64>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub html_url: String,

    #[serde(default)]
    pub head: Option<BranchPayload>,

    #[serde(default)]
    pub base: Option<BranchPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchPayload {
    #[serde(rename = "ref", default)]
    pub branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryPayload {
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderPayload {
    #[serde(default)]
    pub login: String,
}

impl PullRequestEvent {
    /// The PR number, preferring the nested field over the top-level one.
    /// Zero counts as missing on either level.
    pub fn pr_number(&self) -> Option<PrNumber> {
        let nested = self
            .pull_request
            .as_ref()
            .and_then(|pr| pr.number)
            .filter(|n| *n != 0);
        let top = self.number.filter(|n| *n != 0);
        nested.or(top).map(PrNumber)
    }

    /// Builds the immutable snapshot a task carries, if the payload names a
    /// pull request at all.
    pub fn snapshot(&self) -> Option<PullRequestInfo> {
        let number = self.pr_number()?;
        let pr = self.pull_request.as_ref();
        Some(PullRequestInfo {
            number,
            title: pr.map(|p| p.title.clone()).unwrap_or_default(),
            url: pr.map(|p| p.html_url.clone()).unwrap_or_default(),
            source_branch: pr
                .and_then(|p| p.head.as_ref())
                .map(|b| b.branch.clone())
                .unwrap_or_default(),
            target_branch: pr
                .and_then(|p| p.base.as_ref())
                .map(|b| b.branch.clone())
                .unwrap_or_default(),
            sender: self
                .sender
                .as_ref()
                .map(|s| s.login.clone())
                .unwrap_or_default(),
        })
    }
}
