//! Inbound webhook processing.
//!
//! - [`events`]: the subset of the Gitea pull-request payload the service
//!   reads
//! - [`signature`]: HMAC-SHA256 verification of the raw request body

pub mod events;
mod signature;

pub use events::{PrAction, PullRequestEvent};
pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
};
