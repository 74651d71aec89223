//! Core domain types shared across the service.

mod ids;
mod pr;

pub use ids::{PrNumber, RepoName, RepoNameError};
pub use pr::{Job, PullRequestInfo};
