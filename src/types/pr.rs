//! Pull request and build job snapshots.

use serde::{Deserialize, Serialize};

use super::PrNumber;

/// An immutable snapshot of the pull request a task is working on.
///
/// Captured once when the webhook is accepted, so repository state changes
/// after enqueue cannot affect an in-flight task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    /// The PR number.
    pub number: PrNumber,

    /// The PR title.
    pub title: String,

    /// The PR's HTML URL.
    pub url: String,

    /// The branch the PR wants to merge (head).
    pub source_branch: String,

    /// The branch the PR merges into (base).
    pub target_branch: String,

    /// Login of the user who triggered the event.
    pub sender: String,
}

impl PullRequestInfo {
    /// Returns the title, or a placeholder when the PR has none.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "PR"
        } else {
            &self.title
        }
    }
}

/// A build job reported by the build server.
///
/// Jenkins exposes both a short `name` and a `fullName` that includes the
/// folder path; watch patterns are matched against both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// The job's short name.
    pub name: String,

    /// The job's URL.
    pub url: String,

    /// The job's full name including folder path, when the server reports one.
    #[serde(rename = "fullName", default)]
    pub full_name: Option<String>,
}
