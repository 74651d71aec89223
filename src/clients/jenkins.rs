//! Jenkins build-server client.
//!
//! Jenkins lists the jobs of a folder at `/job/<seg>/.../api/json`; the
//! `tree` query parameter keeps the response down to the three fields we
//! need. A watch pattern matches a job if it matches either the short name
//! or the folder-qualified full name.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::ClientError;
use crate::types::Job;

/// Per-request timeout. Kept shorter than any sensible poll interval so a
/// hung Jenkins stalls a worker for at most one poll.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The capability the job watcher consumes: one query, first matching job
/// or `None`, optionally scoped to a job root.
#[async_trait]
pub trait BuildServerClient: Send + Sync {
    async fn find_job(
        &self,
        pattern: &Regex,
        job_root: Option<&str>,
    ) -> Result<Option<Job>, ClientError>;
}

/// Jenkins REST client.
pub struct JenkinsClient {
    base_url: String,
    username: String,
    api_token: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct JobsResponse {
    #[serde(default)]
    jobs: Vec<Job>,
}

impl JenkinsClient {
    /// Creates a client. Credentials may be empty for an unauthenticated
    /// Jenkins; they are sent as basic auth when present.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(JenkinsClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            api_token: api_token.into(),
            http,
        })
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        if self.username.is_empty() && self.api_token.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.api_token))
        }
    }

    /// Lists the jobs under `job_root` (the server root when `None`).
    pub async fn jobs(&self, job_root: Option<&str>) -> Result<Vec<Job>, ClientError> {
        let url = format!("{}{}/api/json", self.base_url, folder_path(job_root));
        let response = self
            .get(url)
            .query(&[("tree", "jobs[name,url,fullName]")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let body: JobsResponse = response.json().await?;
        Ok(body.jobs)
    }

    /// Verifies that Jenkins is reachable and the credentials are accepted.
    pub async fn check_accessibility(&self) -> Result<(), ClientError> {
        let url = format!("{}/api/json", self.base_url);
        let response = self.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(())
    }

    /// Verifies that a configured job root exists. An empty root is the
    /// server root and trivially valid.
    pub async fn check_job_root_exists(&self, job_root: Option<&str>) -> Result<(), ClientError> {
        if job_root.map_or(true, str::is_empty) {
            return Ok(());
        }
        let url = format!("{}{}/api/json", self.base_url, folder_path(job_root));
        let response = self.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl BuildServerClient for JenkinsClient {
    async fn find_job(
        &self,
        pattern: &Regex,
        job_root: Option<&str>,
    ) -> Result<Option<Job>, ClientError> {
        let jobs = self.jobs(job_root).await?;
        debug!(
            jobs = jobs.len(),
            pattern = %pattern,
            job_root = job_root.unwrap_or(""),
            "jenkins jobs retrieved"
        );

        Ok(jobs.into_iter().find(|job| {
            pattern.is_match(&job.name)
                || job
                    .full_name
                    .as_deref()
                    .is_some_and(|full| pattern.is_match(full))
        }))
    }
}

/// Turns a `/`-separated folder string into Jenkins URL path segments:
/// `team/pipelines` becomes `/job/team/job/pipelines`.
fn folder_path(job_root: Option<&str>) -> String {
    let Some(root) = job_root else {
        return String::new();
    };
    root.split('/')
        .filter(|segment| !segment.is_empty())
        .fold(String::new(), |mut path, segment| {
            path.push_str("/job/");
            path.push_str(segment);
            path
        })
}
