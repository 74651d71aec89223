//! Configuration loading and validation.
//!
//! Configuration is a single YAML file with four sections: the HTTP server,
//! the Jenkins connection (whose poll interval and wait timeout double as the
//! global defaults for watches), the Gitea connection, and the per-repository
//! rules. `load` reads, parses, and validates in one step; the rest of the
//! service only ever sees a validated `Config`.
//!
//! Durations are written as humantime strings (`15s`, `5m`).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::RepoName;

/// Default listen address when `server.listen_addr` is omitted.
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
/// Default number of workers pulling from the task queue.
const DEFAULT_WORKER_POOL_SIZE: usize = 4;
/// Default capacity of the bounded task queue.
const DEFAULT_QUEUE_SIZE: usize = 100;
/// Default grace period for draining workers at shutdown.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
/// Default interval between build-server polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
/// Default deadline for a job to appear before the watch gives up.
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default comment posted when a matching job is found.
pub const DEFAULT_SUCCESS_COMMENT: &str =
    "✅ Build job {{job_name}} detected: {{job_url}}";
/// Default comment posted when the watch times out.
pub const DEFAULT_FAILURE_COMMENT: &str =
    "⚠️ Build job not detected for PR {{number}} within timeout ({{timeout}}).";

/// Errors produced while loading or validating configuration.
///
/// All of these are fatal at startup; the engine never sees an invalid config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("jenkins.base_url must be provided")]
    MissingJenkinsUrl,

    #[error("gitea.base_url must be provided")]
    MissingGiteaUrl,

    #[error("gitea.token must be provided")]
    MissingGiteaToken,

    #[error("server.{field} must be greater than zero")]
    ZeroServerValue { field: &'static str },

    #[error("{scope}: duration {field} must be greater than zero")]
    ZeroDuration {
        scope: String,
        field: &'static str,
    },

    #[error("repository {repo} must define at least one pattern")]
    NoPatterns { repo: RepoName },

    #[error("repository {repo}, pattern {pattern:?}: regex template is empty")]
    EmptyRegex { repo: RepoName, pattern: String },
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the webhook endpoint binds to.
    #[serde(default)]
    pub listen_addr: Option<String>,

    /// Shared secret for webhook signature verification.
    ///
    /// When empty, signature verification is skipped.
    #[serde(default)]
    pub webhook_secret: String,

    /// Number of concurrent workers.
    #[serde(default)]
    pub worker_pool_size: Option<usize>,

    /// Capacity of the bounded task queue.
    #[serde(default)]
    pub queue_size: Option<usize>,

    /// How long shutdown waits for in-flight tasks before abandoning them.
    #[serde(default, with = "opt_duration")]
    pub shutdown_grace: Option<Duration>,
}

/// Jenkins connection settings.
///
/// `poll_interval` and `wait_timeout` are also the global defaults at the
/// bottom of the pattern → repository → global fallback chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JenkinsConfig {
    pub base_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub api_token: String,

    #[serde(default, with = "opt_duration")]
    pub poll_interval: Option<Duration>,

    #[serde(default, with = "opt_duration")]
    pub wait_timeout: Option<Duration>,
}

/// Gitea connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GiteaConfig {
    pub base_url: String,
    pub token: String,
}

/// One named watch pattern within a repository rule.
///
/// Every optional field falls back to the repository rule, then to the
/// global defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pattern {
    /// Name used in logs and comment templates.
    pub name: String,

    /// Template producing the job-matching regular expression.
    pub regex: String,

    #[serde(default)]
    pub job_root: Option<String>,

    #[serde(default, with = "opt_duration")]
    pub poll_interval: Option<Duration>,

    #[serde(default, with = "opt_duration")]
    pub wait_timeout: Option<Duration>,

    #[serde(default)]
    pub success_comment: Option<String>,

    #[serde(default)]
    pub failure_comment: Option<String>,
}

/// Processing rules for one repository.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryRule {
    /// Full name in `owner/repo` format. Lookup is case-insensitive.
    pub name: RepoName,

    /// Jenkins folder the watch is scoped to, e.g. `team/pipelines`.
    #[serde(default)]
    pub job_root: Option<String>,

    #[serde(default, with = "opt_duration")]
    pub poll_interval: Option<Duration>,

    #[serde(default, with = "opt_duration")]
    pub wait_timeout: Option<Duration>,

    #[serde(default)]
    pub success_comment: Option<String>,

    #[serde(default)]
    pub failure_comment: Option<String>,

    pub patterns: Vec<Pattern>,
}

/// Global fallback values for everything a pattern or rule may override.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
    pub success_comment: String,
    pub failure_comment: String,
}

/// Settings a watch actually runs with, after resolving the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
    pub job_root: Option<String>,
    pub success_comment: String,
    pub failure_comment: String,
}

impl Pattern {
    /// Resolves the pattern → repository → global fallback chain into the
    /// concrete settings a watch runs with.
    pub fn effective(&self, rule: &RepositoryRule, defaults: &Defaults) -> EffectiveSettings {
        EffectiveSettings {
            poll_interval: self
                .poll_interval
                .or(rule.poll_interval)
                .unwrap_or(defaults.poll_interval),
            wait_timeout: self
                .wait_timeout
                .or(rule.wait_timeout)
                .unwrap_or(defaults.wait_timeout),
            job_root: self.job_root.clone().or_else(|| rule.job_root.clone()),
            success_comment: self
                .success_comment
                .clone()
                .or_else(|| rule.success_comment.clone())
                .unwrap_or_else(|| defaults.success_comment.clone()),
            failure_comment: self
                .failure_comment
                .clone()
                .or_else(|| rule.failure_comment.clone())
                .unwrap_or_else(|| defaults.failure_comment.clone()),
        }
    }
}

/// The full application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub jenkins: JenkinsConfig,
    pub gitea: GiteaConfig,

    #[serde(default)]
    pub repositories: Vec<RepositoryRule>,
}

impl Config {
    /// Validates the configuration, rejecting anything the engine cannot
    /// run with. Optional fields stay `None`; accessors apply defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jenkins.base_url.is_empty() {
            return Err(ConfigError::MissingJenkinsUrl);
        }
        if self.gitea.base_url.is_empty() {
            return Err(ConfigError::MissingGiteaUrl);
        }
        if self.gitea.token.is_empty() {
            return Err(ConfigError::MissingGiteaToken);
        }

        if self.server.worker_pool_size == Some(0) {
            return Err(ConfigError::ZeroServerValue {
                field: "worker_pool_size",
            });
        }
        if self.server.queue_size == Some(0) {
            return Err(ConfigError::ZeroServerValue { field: "queue_size" });
        }

        check_duration("jenkins", "poll_interval", self.jenkins.poll_interval)?;
        check_duration("jenkins", "wait_timeout", self.jenkins.wait_timeout)?;

        for rule in &self.repositories {
            let scope = format!("repository {}", rule.name);
            check_duration(&scope, "poll_interval", rule.poll_interval)?;
            check_duration(&scope, "wait_timeout", rule.wait_timeout)?;

            if rule.patterns.is_empty() {
                return Err(ConfigError::NoPatterns {
                    repo: rule.name.clone(),
                });
            }

            for pattern in &rule.patterns {
                if pattern.regex.is_empty() {
                    return Err(ConfigError::EmptyRegex {
                        repo: rule.name.clone(),
                        pattern: pattern.name.clone(),
                    });
                }
                let scope = format!("repository {}, pattern {}", rule.name, pattern.name);
                check_duration(&scope, "poll_interval", pattern.poll_interval)?;
                check_duration(&scope, "wait_timeout", pattern.wait_timeout)?;
            }
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> &str {
        self.server
            .listen_addr
            .as_deref()
            .unwrap_or(DEFAULT_LISTEN_ADDR)
    }

    pub fn worker_pool_size(&self) -> usize {
        self.server
            .worker_pool_size
            .unwrap_or(DEFAULT_WORKER_POOL_SIZE)
    }

    pub fn queue_size(&self) -> usize {
        self.server.queue_size.unwrap_or(DEFAULT_QUEUE_SIZE)
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.server.shutdown_grace.unwrap_or(DEFAULT_SHUTDOWN_GRACE)
    }

    /// The global fallback values for watch settings and comment templates.
    pub fn defaults(&self) -> Defaults {
        Defaults {
            poll_interval: self.jenkins.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            wait_timeout: self.jenkins.wait_timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT),
            success_comment: DEFAULT_SUCCESS_COMMENT.to_string(),
            failure_comment: DEFAULT_FAILURE_COMMENT.to_string(),
        }
    }
}

fn check_duration(
    scope: &str,
    field: &'static str,
    value: Option<Duration>,
) -> Result<(), ConfigError> {
    match value {
        Some(d) if d.is_zero() => Err(ConfigError::ZeroDuration {
            scope: scope.to_string(),
            field,
        }),
        _ => Ok(()),
    }
}

/// Loads and validates configuration from a YAML file.
pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading configuration");

    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let config: Config = serde_yaml::from_str(&data)?;
    config.validate()?;

    info!(
        repositories = config.repositories.len(),
        workers = config.worker_pool_size(),
        queue_size = config.queue_size(),
        "configuration validated"
    );
    Ok(config)
}

/// The read-only, load-time-built mapping from repository name to its rule.
///
/// Built once after validation and shared read-only across all workers;
/// no locking is needed.
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: HashMap<String, Arc<RepositoryRule>>,
}

impl RuleTable {
    /// Builds the lookup table from validated configuration.
    pub fn build(config: &Config) -> Self {
        let mut rules = HashMap::with_capacity(config.repositories.len());
        for rule in &config.repositories {
            let key = rule.name.lookup_key();
            debug!(repo = %rule.name, patterns = rule.patterns.len(), "indexing repository rule");
            rules.insert(key, Arc::new(rule.clone()));
        }
        RuleTable { rules }
    }

    /// Looks up the rule for a repository full name, case-insensitively.
    ///
    /// `None` means the repository was not opted in; the caller drops the
    /// event silently.
    pub fn resolve(&self, name: &RepoName) -> Option<Arc<RepositoryRule>> {
        self.rules.get(&name.lookup_key()).cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Serde helper for optional humantime durations (`15s`, `5m`).
mod opt_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => humantime::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
server:
  webhook_secret: "s3cret"
jenkins:
  base_url: "https://jenkins.example.com"
gitea:
  base_url: "https://gitea.example.com/api/v1"
  token: "t0ken"
repositories:
  - name: acme/widgets
    patterns:
      - name: pr-build
        regex: '^build-pr-{{number}}$'
"#
    }

    fn parse(yaml: &str) -> Config {
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse(minimal_yaml());

        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
        assert_eq!(config.worker_pool_size(), 4);
        assert_eq!(config.queue_size(), 100);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(30));

        let defaults = config.defaults();
        assert_eq!(defaults.poll_interval, Duration::from_secs(15));
        assert_eq!(defaults.wait_timeout, Duration::from_secs(300));
    }

    #[test]
    fn durations_parse_as_humantime() {
        let config = parse(
            r#"
server:
  shutdown_grace: 1m
jenkins:
  base_url: "https://jenkins"
  poll_interval: 20s
  wait_timeout: 10m
gitea:
  base_url: "https://gitea"
  token: "t"
repositories: []
"#,
        );

        assert_eq!(config.shutdown_grace(), Duration::from_secs(60));
        let defaults = config.defaults();
        assert_eq!(defaults.poll_interval, Duration::from_secs(20));
        assert_eq!(defaults.wait_timeout, Duration::from_secs(600));
    }

    #[test]
    fn missing_jenkins_url_is_rejected() {
        let config: Config = serde_yaml::from_str(
            r#"
server: {}
jenkins:
  base_url: ""
gitea:
  base_url: "https://gitea"
  token: "t"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingJenkinsUrl)
        ));
    }

    #[test]
    fn missing_gitea_token_is_rejected() {
        let config: Config = serde_yaml::from_str(
            r#"
server: {}
jenkins:
  base_url: "https://jenkins"
gitea:
  base_url: "https://gitea"
  token: ""
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingGiteaToken)
        ));
    }

    #[test]
    fn repository_without_patterns_is_rejected() {
        let config: Config = serde_yaml::from_str(
            r#"
server: {}
jenkins:
  base_url: "https://jenkins"
gitea:
  base_url: "https://gitea"
  token: "t"
repositories:
  - name: acme/widgets
    patterns: []
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoPatterns { .. })));
    }

    #[test]
    fn empty_regex_is_rejected() {
        let config: Config = serde_yaml::from_str(
            r#"
server: {}
jenkins:
  base_url: "https://jenkins"
gitea:
  base_url: "https://gitea"
  token: "t"
repositories:
  - name: acme/widgets
    patterns:
      - name: broken
        regex: ""
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyRegex { .. })));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let config: Config = serde_yaml::from_str(
            r#"
server: {}
jenkins:
  base_url: "https://jenkins"
  poll_interval: 0s
gitea:
  base_url: "https://gitea"
  token: "t"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration { .. })
        ));
    }

    #[test]
    fn zero_worker_pool_is_rejected() {
        let config: Config = serde_yaml::from_str(
            r#"
server:
  worker_pool_size: 0
jenkins:
  base_url: "https://jenkins"
gitea:
  base_url: "https://gitea"
  token: "t"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroServerValue { .. })
        ));
    }

    // ─── Rule table ───

    #[test]
    fn rule_table_resolves_case_insensitively() {
        let config = parse(minimal_yaml());
        let table = RuleTable::build(&config);

        let exact = RepoName::parse("acme/widgets").unwrap();
        let shouty = RepoName::parse("ACME/Widgets").unwrap();
        assert!(table.resolve(&exact).is_some());
        assert!(table.resolve(&shouty).is_some());
    }

    #[test]
    fn rule_table_misses_unconfigured_repos() {
        let config = parse(minimal_yaml());
        let table = RuleTable::build(&config);

        let other = RepoName::parse("acme/gadgets").unwrap();
        assert!(table.resolve(&other).is_none());
    }

    // ─── Fallback chain (pattern → repository → global) ───

    fn chain_config() -> Config {
        parse(
            r#"
server: {}
jenkins:
  base_url: "https://jenkins"
  poll_interval: 15s
  wait_timeout: 5m
gitea:
  base_url: "https://gitea"
  token: "t"
repositories:
  - name: acme/widgets
    job_root: team
    poll_interval: 30s
    wait_timeout: 10m
    failure_comment: "repo-level failure"
    patterns:
      - name: overriding
        regex: '^a$'
        poll_interval: 5s
        wait_timeout: 1m
        job_root: team/sub
        success_comment: "pattern-level success"
      - name: inheriting
        regex: '^b$'
"#,
        )
    }

    #[test]
    fn pattern_overrides_win() {
        let config = chain_config();
        let defaults = config.defaults();
        let rule = &config.repositories[0];
        let effective = rule.patterns[0].effective(rule, &defaults);

        assert_eq!(effective.poll_interval, Duration::from_secs(5));
        assert_eq!(effective.wait_timeout, Duration::from_secs(60));
        assert_eq!(effective.job_root.as_deref(), Some("team/sub"));
        assert_eq!(effective.success_comment, "pattern-level success");
        // Failure comment inherits the repository level.
        assert_eq!(effective.failure_comment, "repo-level failure");
    }

    #[test]
    fn repository_values_fill_pattern_gaps() {
        let config = chain_config();
        let defaults = config.defaults();
        let rule = &config.repositories[0];
        let effective = rule.patterns[1].effective(rule, &defaults);

        assert_eq!(effective.poll_interval, Duration::from_secs(30));
        assert_eq!(effective.wait_timeout, Duration::from_secs(600));
        assert_eq!(effective.job_root.as_deref(), Some("team"));
        assert_eq!(effective.success_comment, DEFAULT_SUCCESS_COMMENT);
        assert_eq!(effective.failure_comment, "repo-level failure");
    }

    #[test]
    fn globals_fill_everything_else() {
        let config = parse(minimal_yaml());
        let defaults = config.defaults();
        let rule = &config.repositories[0];
        let effective = rule.patterns[0].effective(rule, &defaults);

        assert_eq!(effective.poll_interval, Duration::from_secs(15));
        assert_eq!(effective.wait_timeout, Duration::from_secs(300));
        assert_eq!(effective.job_root, None);
        assert_eq!(effective.success_comment, DEFAULT_SUCCESS_COMMENT);
        assert_eq!(effective.failure_comment, DEFAULT_FAILURE_COMMENT);
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, minimal_yaml()).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.repositories.len(), 1);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
