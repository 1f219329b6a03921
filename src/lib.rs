//! A chained request pipeline: a fixed line of stages, each with its own
//! worker thread and unbounded inbox, passing requests head to tail.
//!
//! Each stage takes a request from its inbox, applies its processor and
//! forwards the same request to its successor. Shutdown is a signal set at
//! the head and propagated tail-ward; it neither drains nor joins.
//!
//! # Features
//!
//! - Unbounded multi-producer inboxes on crossbeam channels
//! - Per-stage FIFO, and chain order preserved for a single producer
//! - Processing failures (errors or panics) are logged and drop the request
//!   at that stage
//! - Signal-only shutdown by default, with an opt-in mode that wakes idle workers
//! - Per-stage metrics: processed, failed, forwarded, latency percentiles
//!
//! # Example
//!
//! ```no_run
//! use request_chain::{LogProcessor, PipelineBuilder, Request};
//!
//! let pipeline = PipelineBuilder::new()
//!     .stage("pre", LogProcessor)
//!     .stage("print", LogProcessor)
//!     .stage("save", LogProcessor)
//!     .build()?;
//!
//! pipeline.submit(Request::new("alpha"));
//! pipeline.shutdown();
//! # Ok::<(), request_chain::PipelineError>(())
//! ```

pub mod config;
pub mod error;
pub mod inbox;
pub mod journal;
pub mod metrics;
pub mod pipeline;
pub mod request;
pub mod stage;

// Re-exports for convenience
pub use config::{PipelineConfig, ShutdownMode};
pub use error::{PipelineError, ProcessError, Result};
pub use inbox::{Inbox, Taken};
pub use journal::{Entry as JournalEntry, Journal, RecordingProcessor};
pub use metrics::{MetricsSnapshot, StageMetrics};
pub use pipeline::{Entry, Pipeline, PipelineBuilder, StageSpec};
pub use request::Request;
pub use stage::{FnProcessor, LogProcessor, Process, Stage, StageRunner, StageState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
