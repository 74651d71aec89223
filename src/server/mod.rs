//! HTTP server for the webhook bridge.
//!
//! Two endpoints:
//!
//! - `POST /webhook` - accepts Gitea webhook deliveries (202 on accept or
//!   ignore, 401 on a bad signature, 503 when the engine is saturated)
//! - `GET /health` - liveness probe
//!
//! The server is a thin producer: it validates, snapshots the pull request,
//! and hands one task per configured pattern to the dispatcher. All waiting
//! happens in the engine, never in a request handler.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::config::RuleTable;
use crate::processor::Dispatcher;

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

/// Shared application state, passed to handlers via Axum's `State`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Rule table built from validated configuration.
    rules: RuleTable,

    /// The engine accepting tasks.
    dispatcher: Arc<Dispatcher>,

    /// Webhook secret; empty disables signature verification.
    webhook_secret: Vec<u8>,
}

impl AppState {
    pub fn new(
        rules: RuleTable,
        dispatcher: Arc<Dispatcher>,
        webhook_secret: impl Into<Vec<u8>>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                rules,
                dispatcher,
                webhook_secret: webhook_secret.into(),
            }),
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.inner.rules
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }
}

/// Builds the router with all endpoints wired to the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
