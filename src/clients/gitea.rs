//! Gitea source-control client.
//!
//! The engine needs exactly one capability from Gitea: posting a comment on
//! a pull request. Gitea files PR comments under the issues API, so the
//! endpoint is `/repos/{owner}/{repo}/issues/{number}/comments`.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::ClientError;
use crate::types::{PrNumber, RepoName};

/// Per-request timeout for comment posts and preflight checks.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The capability the task pipeline consumes: post one comment on one PR.
#[async_trait]
pub trait SourceControlClient: Send + Sync {
    async fn post_comment(
        &self,
        repo: &RepoName,
        pr: PrNumber,
        body: &str,
    ) -> Result<(), ClientError>;
}

/// Gitea REST client.
pub struct GiteaClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

impl GiteaClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(GiteaClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.token)
    }

    /// Verifies that Gitea is reachable and the token is accepted.
    pub async fn check_accessibility(&self) -> Result<(), ClientError> {
        let url = format!("{}/user", self.base_url);
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(())
    }

    /// Verifies that a configured repository exists and is visible to the
    /// token.
    pub async fn repository_exists(&self, repo: &RepoName) -> Result<(), ClientError> {
        let url = format!("{}/repos/{}/{}", self.base_url, repo.owner(), repo.repo());
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl SourceControlClient for GiteaClient {
    async fn post_comment(
        &self,
        repo: &RepoName,
        pr: PrNumber,
        body: &str,
    ) -> Result<(), ClientError> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.base_url,
            repo.owner(),
            repo.repo(),
            pr.0
        );
        debug!(repo = %repo, pr = %pr, bytes = body.len(), "posting comment");

        let response = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&CommentRequest { body })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(())
    }
}
