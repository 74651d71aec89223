//! Webhook endpoint handler.
//!
//! Accepts Gitea `pull_request` deliveries, verifies the signature over the
//! raw body, snapshots the pull request, and enqueues one task per
//! configured pattern. Everything that is not an opted-in repository with a
//! watched action is acknowledged with 202 and dropped; the only hard
//! failures are malformed requests, bad signatures, and a saturated engine.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::processor::{EnqueueError, Task};
use crate::types::RepoName;
use crate::webhooks::{verify_signature, PullRequestEvent};

/// Header naming the event type.
const HEADER_EVENT: &str = "x-gitea-event";
/// Header carrying the HMAC-SHA256 signature of the body.
const HEADER_SIGNATURE: &str = "x-gitea-signature";
/// Header carrying the delivery id, used for log correlation only.
const HEADER_DELIVERY: &str = "x-gitea-delivery";

/// Errors that turn into non-202 responses.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature missing or wrong for the configured secret.
    #[error("invalid signature")]
    InvalidSignature,

    /// Body is not valid JSON for a pull-request event.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Payload carries no usable `repository.full_name`.
    #[error("missing or invalid repository.full_name")]
    MissingRepository,

    /// Payload carries no pull request number.
    #[error("missing pull request number")]
    MissingPrNumber,

    /// The task queue is saturated; the sender should retry later.
    #[error("engine overloaded")]
    Overloaded,

    /// The dispatcher is not running; a lifecycle bug, not a client error.
    #[error("dispatcher not started")]
    NotStarted,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidJson(_)
            | WebhookError::MissingRepository
            | WebhookError::MissingPrNumber => StatusCode::BAD_REQUEST,
            WebhookError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            WebhookError::NotStarted => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// Responses:
///
/// - 202 Accepted: tasks enqueued, or the event was deliberately ignored
///   (wrong event type, unwatched action, unconfigured repository)
/// - 400 Bad Request: malformed body
/// - 401 Unauthorized: signature verification failed
/// - 503 Service Unavailable: queue full, retry later
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = header_str(&headers, HEADER_EVENT).to_lowercase();
    let delivery = header_str(&headers, HEADER_DELIVERY);

    if event_type != "pull_request" {
        debug!(event_type = %event_type, delivery, "ignoring event type");
        return Ok((StatusCode::ACCEPTED, "ignored"));
    }

    // Verify before parsing; unauthenticated bodies get no further work.
    if !state.webhook_secret().is_empty() {
        let signature = header_str(&headers, HEADER_SIGNATURE);
        if !verify_signature(&body, signature, state.webhook_secret()) {
            warn!(delivery, "invalid webhook signature");
            return Err(WebhookError::InvalidSignature);
        }
    }

    let event: PullRequestEvent = serde_json::from_slice(&body)?;

    if !event.action.is_watched() {
        info!(action = ?event.action, delivery, "ignoring pull request action");
        return Ok((StatusCode::ACCEPTED, "ignored"));
    }

    if event.repository.full_name.is_empty() {
        return Err(WebhookError::MissingRepository);
    }
    let repo = RepoName::parse(event.repository.full_name.clone())
        .map_err(|_| WebhookError::MissingRepository)?;

    // Not opted in: drop silently. This is the mechanism for ignoring
    // repositories the operator did not configure.
    let Some(rule) = state.rules().resolve(&repo) else {
        info!(repo = %repo, delivery, "repository not configured, dropping event");
        return Ok((StatusCode::ACCEPTED, "not configured"));
    };

    let snapshot = event.snapshot().ok_or(WebhookError::MissingPrNumber)?;

    info!(
        repo = %repo,
        pr = %snapshot.number,
        patterns = rule.patterns.len(),
        delivery,
        "accepted pull request event"
    );

    for pattern in &rule.patterns {
        let task = Task::new(
            repo.clone(),
            rule.clone(),
            pattern.clone(),
            snapshot.clone(),
        );
        match state.dispatcher().enqueue(task) {
            Ok(()) => {}
            Err(EnqueueError::QueueFull) => {
                warn!(repo = %repo, pr = %snapshot.number, "queue full, asking sender to retry");
                return Err(WebhookError::Overloaded);
            }
            Err(EnqueueError::NotStarted) => return Err(WebhookError::NotStarted),
        }
    }

    Ok((StatusCode::ACCEPTED, "accepted"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .trim()
}
