//! The job watch: a bounded polling loop against the build server.
//!
//! A watch starts with one immediate query, so a job that already exists is
//! found without waiting a full poll interval. After a miss it sleeps for
//! the poll interval (or until the deadline, whichever is sooner) and tries
//! again. The watch ends in exactly one of three states:
//!
//! - `Found` — a job matching the pattern was observed before the deadline.
//! - `TimedOut` — the wait timeout elapsed without a match. This is a normal
//!   outcome, reported to the PR via the failure comment, not an error.
//! - `Cancelled` — the surrounding process is shutting down; the caller
//!   posts no comment.
//!
//! Transient client errors are logged and treated as "no match yet" for
//! that poll. They still consume wall-clock time against the deadline, so a
//! permanently broken build server ends in `TimedOut` rather than polling
//! forever.

use std::time::Duration;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clients::BuildServerClient;
use crate::types::Job;

/// Inputs of one watch, resolved from the pattern → repository → global
/// fallback chain before the watch starts.
#[derive(Debug)]
pub struct WatchParams {
    /// The compiled job-matching pattern.
    pub pattern: Regex,

    /// Optional build-server folder the query is scoped to.
    pub job_root: Option<String>,

    /// Total time budget for the watch.
    pub wait_timeout: Duration,

    /// Pause between queries.
    pub poll_interval: Duration,
}

/// Terminal state of a watch.
#[derive(Debug)]
pub enum WatchOutcome {
    /// A matching job appeared within the deadline.
    Found {
        job: Job,
        attempts: u32,
        elapsed: Duration,
    },

    /// The deadline elapsed without a match.
    TimedOut { attempts: u32, elapsed: Duration },

    /// The watch was aborted by external cancellation.
    Cancelled,
}

/// Runs one watch to completion.
///
/// A query still in flight when the deadline fires is abandoned; the watch
/// never reports `Found` after its time budget is spent.
pub async fn watch(
    client: &dyn BuildServerClient,
    params: &WatchParams,
    cancel: &CancellationToken,
) -> WatchOutcome {
    let started = tokio::time::Instant::now();
    let deadline = started + params.wait_timeout;
    let mut attempts: u32 = 0;

    debug!(
        pattern = %params.pattern,
        job_root = params.job_root.as_deref().unwrap_or(""),
        wait_timeout = ?params.wait_timeout,
        poll_interval = ?params.poll_interval,
        "starting watch"
    );

    loop {
        attempts += 1;
        tokio::select! {
            _ = cancel.cancelled() => return WatchOutcome::Cancelled,
            _ = tokio::time::sleep_until(deadline) => {
                return WatchOutcome::TimedOut { attempts, elapsed: started.elapsed() };
            }
            result = client.find_job(&params.pattern, params.job_root.as_deref()) => {
                match result {
                    Ok(Some(job)) => {
                        debug!(job = %job.name, attempt = attempts, "matching job found");
                        return WatchOutcome::Found { job, attempts, elapsed: started.elapsed() };
                    }
                    Ok(None) => {
                        debug!(attempt = attempts, "no matching job yet");
                    }
                    Err(error) => {
                        // Counts as a miss; the deadline keeps running.
                        warn!(error = %error, attempt = attempts, "build server query failed, treating as no match");
                    }
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return WatchOutcome::Cancelled,
            _ = tokio::time::sleep_until(deadline) => {
                return WatchOutcome::TimedOut { attempts, elapsed: started.elapsed() };
            }
            _ = tokio::time::sleep(params.poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// What the scripted client answers on one call.
    enum Step {
        Match(&'static str),
        Miss,
        Error,
    }

    /// Replays a fixed script of answers; repeats the last behavior
    /// (miss) once the script is exhausted.
    struct ScriptedClient {
        script: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedClient {
        fn new(steps: Vec<Step>) -> Self {
            ScriptedClient {
                script: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BuildServerClient for ScriptedClient {
        async fn find_job(
            &self,
            _pattern: &Regex,
            _job_root: Option<&str>,
        ) -> Result<Option<Job>, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(Step::Match(name)) => Ok(Some(Job {
                    name: name.to_string(),
                    url: format!("https://ci/job/{name}/"),
                    full_name: None,
                })),
                Some(Step::Miss) | None => Ok(None),
                Some(Step::Error) => Err(ClientError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
            }
        }
    }

    fn params() -> WatchParams {
        WatchParams {
            pattern: Regex::new("^build-pr-42$").unwrap(),
            job_root: None,
            wait_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_match_is_honored_without_waiting() {
        let client = ScriptedClient::new(vec![Step::Match("build-pr-42")]);
        let cancel = CancellationToken::new();

        let outcome = watch(&client, &params(), &cancel).await;

        match outcome {
            WatchOutcome::Found { job, attempts, .. } => {
                assert_eq!(job.name, "build-pr-42");
                assert_eq!(attempts, 1);
            }
            other => panic!("expected Found, got {other:?}"),
        }
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn match_on_a_later_poll_is_found() {
        let client = ScriptedClient::new(vec![Step::Miss, Step::Miss, Step::Match("build-pr-42")]);
        let cancel = CancellationToken::new();

        let outcome = watch(&client, &params(), &cancel).await;

        match outcome {
            WatchOutcome::Found { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn watch_times_out_when_no_job_appears() {
        let client = ScriptedClient::new(vec![]);
        let cancel = CancellationToken::new();

        let outcome = watch(&client, &params(), &cancel).await;

        match outcome {
            WatchOutcome::TimedOut { attempts, elapsed } => {
                // Immediate query plus one per 20ms interval within 100ms.
                assert!(attempts >= 2, "attempts = {attempts}");
                assert!(elapsed >= Duration::from_millis(100));
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_count_as_misses() {
        let client = ScriptedClient::new(vec![Step::Error, Step::Match("build-pr-42")]);
        let cancel = CancellationToken::new();

        let outcome = watch(&client, &params(), &cancel).await;

        match outcome {
            WatchOutcome::Found { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_errors_still_hit_the_deadline() {
        let client = ScriptedClient::new(vec![
            Step::Error,
            Step::Error,
            Step::Error,
            Step::Error,
            Step::Error,
            Step::Error,
        ]);
        let cancel = CancellationToken::new();

        let outcome = watch(&client, &params(), &cancel).await;

        assert!(matches!(outcome, WatchOutcome::TimedOut { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_the_watch() {
        let client = ScriptedClient::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = watch(&client, &params(), &cancel).await;

        assert!(matches!(outcome, WatchOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn found_is_never_reported_after_the_deadline() {
        /// A client whose query outlives the whole watch deadline.
        struct SlowClient;

        #[async_trait]
        impl BuildServerClient for SlowClient {
            async fn find_job(
                &self,
                _pattern: &Regex,
                _job_root: Option<&str>,
            ) -> Result<Option<Job>, ClientError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Some(Job {
                    name: "too-late".to_string(),
                    url: String::new(),
                    full_name: None,
                }))
            }
        }

        let cancel = CancellationToken::new();
        let outcome = watch(&SlowClient, &params(), &cancel).await;

        assert!(matches!(outcome, WatchOutcome::TimedOut { .. }));
    }
}
