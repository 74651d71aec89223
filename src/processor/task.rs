//! The unit of asynchronous work.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{Defaults, EffectiveSettings, Pattern, RepositoryRule};
use crate::types::{PullRequestInfo, RepoName};

/// One (repository, pull request, pattern) unit of work.
///
/// Created once per accepted event and matching pattern, consumed by exactly
/// one worker, and discarded after the outcome comment is posted (or fails
/// to post). The pull request snapshot is captured at enqueue time, so
/// repository changes cannot affect a task already in flight. Tasks carry no
/// shared mutable state and move across worker boundaries by value.
#[derive(Debug, Clone)]
pub struct Task {
    /// The repository the event came from.
    pub repo: RepoName,

    /// The rule that matched the repository.
    pub rule: Arc<RepositoryRule>,

    /// The pattern this task watches for. Cloned out of the rule at
    /// creation so the task is self-contained.
    pub pattern: Pattern,

    /// Snapshot of the pull request at enqueue time.
    pub pull_request: PullRequestInfo,

    /// When the task was accepted.
    pub received_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        repo: RepoName,
        rule: Arc<RepositoryRule>,
        pattern: Pattern,
        pull_request: PullRequestInfo,
    ) -> Self {
        Task {
            repo,
            rule,
            pattern,
            pull_request,
            received_at: Utc::now(),
        }
    }

    /// Resolves the settings this task's watch runs with.
    pub fn effective(&self, defaults: &Defaults) -> EffectiveSettings {
        self.pattern.effective(&self.rule, defaults)
    }
}
