//! A [slog](https://docs.rs/slog) drain that writes log entries in the JSON layout of
//! [Google Cloud Logging](https://cloud.google.com/logging/docs/structured-logging)
//! (formerly Stackdriver), with the `context` and `serviceContext` objects
//! [Error Reporting](https://cloud.google.com/error-reporting/docs/formatting-error-messages)
//! looks for.
//!
//! Entries are encoded by a streaming JSON encoder into buffers taken from a
//! [`Pool`](stackdriver_bufpool::Pool), so logging does not allocate a document per entry.
//!
//! # Example
//!
//! ```
//! use slog::{info, o, Drain};
//! use slog_stackdriver::logger::{Builder, FallbackToStderr};
//!
//! let (drain, receiver) = Builder::new("projects/my-gcp-project/logs/my-log-id", "k8s_container")
//!     .with_logger_name("ftp")
//!     .build();
//! let drain = std::sync::Mutex::new(FallbackToStderr::new(drain)).fuse();
//! let log = slog::Logger::root(drain, o!("version" => "0.15.1"));
//!
//! info!(log, "Server started"; "port" => 2121, "context.user" => "admin");
//!
//! let request = receiver.try_recv().unwrap();
//! let entries = request.entries.unwrap();
//! assert_eq!(entries[0].severity.as_deref(), Some("INFO"));
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod encoder;
pub mod entry;
pub mod error;
pub mod field;
pub mod level;
pub mod logger;
pub mod marshal;
pub mod metrics;
pub mod sink;
pub mod uid;

pub use crate::config::EncoderConfig;
pub use crate::core::Core;
pub use crate::encoder::JsonEncoder;
pub use crate::entry::{Caller, Entry};
pub use crate::error::{Error, Result};
pub use crate::field::{Field, FieldValue};
pub use crate::level::{Level, Severity};
pub use crate::logger::{Builder, FallbackToStderr, Logger};
pub use crate::sink::{ChannelSink, Sink, SinkRecord, WriterSink};
pub use stackdriver_bufpool::{Buffer, Pool};
