//! taskqueue-core
//!
//! In-process asynchronous task queue with bounded concurrency, strict
//! priority ordering, per-attempt timeouts and retries.
//!
//! # Modules
//! - **queue**: the scheduler (`TaskQueue`) and its building blocks
//!   (pending store, concurrency gate, attempt runner, drain notifier)
//! - **config**: queue-level and per-task options
//! - **error**: task failures and configuration errors
//! - **ids**: task identifiers
//! - **observability**: counters snapshot
//!
//! # Example
//! ```ignore
//! let queue = TaskQueue::with_concurrency(2)?;
//! let handle = queue.add(|| async { Ok::<_, std::io::Error>(42) });
//! assert_eq!(handle.await.unwrap(), 42);
//! queue.on_empty().await;
//! ```

pub mod config;
pub mod error;
pub mod ids;
pub mod observability;
pub mod queue;

pub use config::{QueueConfig, TaskOptions};
pub use error::{ConfigError, TaskError};
pub use ids::TaskId;
pub use observability::QueueStats;
pub use queue::{OnEmpty, RetryPolicy, TaskHandle, TaskQueue, TaskState};
