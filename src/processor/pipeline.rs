//! The per-task pipeline a worker runs from dequeue to posted comment.
//!
//! Pipeline steps, strictly sequential within one task:
//!
//! 1. resolve effective settings (pattern → repository → global);
//! 2. render the pattern's regex template with PR fields;
//! 3. compile the rendered regex;
//! 4. run the job watch;
//! 5. render the success or failure comment;
//! 6. post the comment, bounded and at most once.
//!
//! A failure in steps 1–3 aborts this task only; a failed comment post is
//! logged and never retried (retrying risks duplicate comments, and
//! at-most-once delivery of the outcome is the contract).

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clients::{BuildServerClient, SourceControlClient};
use crate::config::Defaults;
use crate::templates::{self, TemplateData, TemplateError};
use crate::watcher::{self, WatchOutcome, WatchParams};

use super::task::Task;

/// Upper bound on the final comment post.
const COMMENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Everything a worker needs besides the task itself.
///
/// Collaborators are injected at construction time; the pipeline holds no
/// global state.
pub struct Deps {
    pub build_server: Arc<dyn BuildServerClient>,
    pub source_control: Arc<dyn SourceControlClient>,
    pub defaults: Defaults,
}

/// Errors that abort a single task.
///
/// Nothing here ever propagates beyond the worker iteration that hit it.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A regex or comment template failed to render.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// The regex template rendered, but the result is not a valid regular
    /// expression.
    #[error("rendered pattern {rendered:?} is not a valid regex: {source}")]
    Pattern {
        rendered: String,
        #[source]
        source: regex::Error,
    },
}

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// A job was found and the success comment was posted.
    SuccessCommented,

    /// The watch timed out and the failure comment was posted.
    FailureCommented,

    /// The watch finished but the comment post failed; not retried.
    CommentFailed,

    /// The watch was aborted by shutdown; no comment was posted.
    Cancelled,
}

/// Runs the full pipeline for one task.
pub async fn process_task(
    task: &Task,
    deps: &Deps,
    cancel: &CancellationToken,
) -> Result<TaskOutcome, TaskError> {
    let effective = task.effective(&deps.defaults);

    // PR fields only; job and outcome fields are not yet available.
    let data = TemplateData {
        repo: task.repo.as_str().to_string(),
        pattern: task.pattern.name.clone(),
        number: task.pull_request.number,
        title: task.pull_request.title.clone(),
        url: task.pull_request.url.clone(),
        source_branch: task.pull_request.source_branch.clone(),
        target_branch: task.pull_request.target_branch.clone(),
        sender: task.pull_request.sender.clone(),
        timeout: effective.wait_timeout,
        job_name: None,
        job_url: None,
        elapsed: None,
        attempts: None,
    };

    let rendered = templates::render(&task.pattern.regex, &data)?;
    let pattern = Regex::new(&rendered).map_err(|source| TaskError::Pattern {
        rendered: rendered.clone(),
        source,
    })?;

    info!(
        repo = %task.repo,
        pr = %task.pull_request.number,
        pattern = %task.pattern.name,
        regex = %rendered,
        "watching for build job"
    );

    let params = WatchParams {
        pattern,
        job_root: effective.job_root.clone(),
        wait_timeout: effective.wait_timeout,
        poll_interval: effective.poll_interval,
    };
    let outcome = watcher::watch(deps.build_server.as_ref(), &params, cancel).await;

    let (template, data, commented) = match outcome {
        WatchOutcome::Found {
            job,
            attempts,
            elapsed,
        } => {
            info!(
                repo = %task.repo,
                pr = %task.pull_request.number,
                job = %job.name,
                url = %job.url,
                attempts,
                "build job detected"
            );
            let data = data.with_job(&job).with_outcome(elapsed, attempts);
            (effective.success_comment, data, TaskOutcome::SuccessCommented)
        }
        WatchOutcome::TimedOut { attempts, elapsed } => {
            warn!(
                repo = %task.repo,
                pr = %task.pull_request.number,
                pattern = %task.pattern.name,
                attempts,
                waited = ?elapsed,
                "no build job appeared within the timeout"
            );
            let data = data.with_outcome(elapsed, attempts);
            (effective.failure_comment, data, TaskOutcome::FailureCommented)
        }
        WatchOutcome::Cancelled => {
            // Shutdown tore the worker down; this is not a task failure and
            // no comment is owed.
            info!(
                repo = %task.repo,
                pr = %task.pull_request.number,
                "watch cancelled by shutdown"
            );
            return Ok(TaskOutcome::Cancelled);
        }
    };

    let body = templates::render(&template, &data)?;

    // At most once: a failure here ends the task without retry.
    let posted = tokio::time::timeout(
        COMMENT_TIMEOUT,
        deps.source_control
            .post_comment(&task.repo, task.pull_request.number, &body),
    )
    .await;

    match posted {
        Ok(Ok(())) => {
            info!(
                repo = %task.repo,
                pr = %task.pull_request.number,
                bytes = body.len(),
                "outcome comment posted"
            );
            Ok(commented)
        }
        Ok(Err(error)) => {
            error!(
                repo = %task.repo,
                pr = %task.pull_request.number,
                error = %error,
                "failed to post outcome comment"
            );
            Ok(TaskOutcome::CommentFailed)
        }
        Err(_) => {
            error!(
                repo = %task.repo,
                pr = %task.pull_request.number,
                timeout = ?COMMENT_TIMEOUT,
                "comment post timed out"
            );
            Ok(TaskOutcome::CommentFailed)
        }
    }
}
