//! build-herald - bridges Gitea pull-request webhooks to Jenkins job polling.
//!
//! When a pull request opens, the service derives a job-name pattern from
//! per-repository rules, polls Jenkins until a matching job appears or a
//! deadline passes, and posts the outcome back to the pull request as a
//! comment.

pub mod clients;
pub mod config;
pub mod processor;
pub mod server;
pub mod templates;
pub mod types;
pub mod watcher;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;
