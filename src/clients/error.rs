//! Error type shared by the external-service clients.

use thiserror::Error;

/// A failed call to Jenkins or Gitea.
///
/// All client errors are treated as transient by the engine: inside a watch
/// they count as "no match yet" for that poll, and on the final comment post
/// they are logged without retry.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connection refused, timeout, TLS, ...).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

impl ClientError {
    /// Builds a `Status` error from a response, consuming its body.
    ///
    /// The body is truncated so a misbehaving server cannot flood the logs.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        const MAX_BODY: usize = 512;

        let status = response.status().as_u16();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_BODY {
            let mut end = MAX_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        ClientError::Status { status, body }
    }

    /// The HTTP status code, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}
