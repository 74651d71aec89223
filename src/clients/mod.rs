//! Thin REST clients for the two external services.
//!
//! The engine only ever sees the [`jenkins::BuildServerClient`] and
//! [`gitea::SourceControlClient`] traits; the concrete reqwest-backed
//! implementations live here. Both clients apply their own per-request
//! timeout so a hung server cannot stall a worker beyond one poll.

pub mod error;
pub mod gitea;
pub mod jenkins;

pub use error::ClientError;
pub use gitea::{GiteaClient, SourceControlClient};
pub use jenkins::{BuildServerClient, JenkinsClient};
