//! Shared test doubles and builders for engine and transport tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::clients::{BuildServerClient, ClientError, SourceControlClient};
use crate::config::{Defaults, Pattern, RepositoryRule};
use crate::processor::Task;
use crate::types::{Job, PrNumber, PullRequestInfo, RepoName};

/// A build server with a fixed job list; patterns are matched for real.
pub struct JobList {
    pub jobs: Vec<Job>,
    pub calls: AtomicU32,
}

impl JobList {
    pub fn new(names: &[&str]) -> Self {
        JobList {
            jobs: names.iter().map(|name| job(name)).collect(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn empty() -> Self {
        JobList::new(&[])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildServerClient for JobList {
    async fn find_job(
        &self,
        pattern: &Regex,
        _job_root: Option<&str>,
    ) -> Result<Option<Job>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .jobs
            .iter()
            .find(|job| pattern.is_match(&job.name))
            .cloned())
    }
}

/// Records posted comments; optionally fails every post.
pub struct RecordingGitea {
    comments: Mutex<Vec<(String, u64, String)>>,
    calls: AtomicU32,
    fail: bool,
}

impl RecordingGitea {
    pub fn new() -> Self {
        RecordingGitea {
            comments: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        RecordingGitea {
            fail: true,
            ..RecordingGitea::new()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn comments(&self) -> Vec<(String, u64, String)> {
        self.comments.lock().unwrap().clone()
    }
}

impl Default for RecordingGitea {
    fn default() -> Self {
        RecordingGitea::new()
    }
}

#[async_trait]
impl SourceControlClient for RecordingGitea {
    async fn post_comment(
        &self,
        repo: &RepoName,
        pr: PrNumber,
        body: &str,
    ) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClientError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.comments
            .lock()
            .unwrap()
            .push((repo.as_str().to_string(), pr.0, body.to_string()));
        Ok(())
    }
}

pub fn job(name: &str) -> Job {
    Job {
        name: name.to_string(),
        url: format!("https://ci/job/{name}/"),
        full_name: None,
    }
}

pub fn defaults(poll: Duration, wait: Duration) -> Defaults {
    Defaults {
        poll_interval: poll,
        wait_timeout: wait,
        success_comment: "job {{job_name}} at {{job_url}}".to_string(),
        failure_comment: "no job for {{number}} within {{timeout}}".to_string(),
    }
}

pub fn pattern(name: &str, regex: &str) -> Pattern {
    Pattern {
        name: name.to_string(),
        regex: regex.to_string(),
        job_root: None,
        poll_interval: None,
        wait_timeout: None,
        success_comment: None,
        failure_comment: None,
    }
}

pub fn rule(repo: &str, patterns: Vec<Pattern>) -> Arc<RepositoryRule> {
    Arc::new(RepositoryRule {
        name: RepoName::parse(repo).unwrap(),
        job_root: None,
        poll_interval: None,
        wait_timeout: None,
        success_comment: None,
        failure_comment: None,
        patterns,
    })
}

pub fn pull_request(pr: u64) -> PullRequestInfo {
    PullRequestInfo {
        number: PrNumber(pr),
        title: "Add frobnicator".to_string(),
        url: format!("https://gitea/acme/widgets/pulls/{pr}"),
        source_branch: "feature/frob".to_string(),
        target_branch: "main".to_string(),
        sender: "alice".to_string(),
    }
}

/// A ready-made task for `acme/widgets` PR 42 with the given regex template.
pub fn task(regex: &str) -> Task {
    task_for_pr(regex, 42)
}

pub fn task_for_pr(regex: &str, pr: u64) -> Task {
    let pat = pattern("pr-build", regex);
    Task::new(
        RepoName::parse("acme/widgets").unwrap(),
        rule("acme/widgets", vec![pat.clone()]),
        pat,
        pull_request(pr),
    )
}

/// Polls a condition until it holds or five (real) seconds pass.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}
