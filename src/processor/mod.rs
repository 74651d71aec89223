//! The asynchronous task-processing engine.
//!
//! This is the core of the service: the bounded work queue, the worker pool,
//! and the per-task pipeline that watches the build server and reports the
//! outcome on the pull request.
//!
//! # Module Structure
//!
//! - [`task`]: the unit of work handed across the queue
//! - [`dispatch`]: queue, worker pool, and lifecycle
//! - [`pipeline`]: the per-task steps from dequeue to posted comment

mod dispatch;
mod pipeline;
mod task;


pub use dispatch::{Dispatcher, EnqueueError, ShutdownOutcome};
pub use pipeline::{Deps, TaskError, TaskOutcome};
pub use task::Task;
