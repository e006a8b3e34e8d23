//! Pooled byte buffers for building log payloads without per-entry allocations.
//!
//! A [`Buffer`] is a thin wrapper around a `Vec<u8>`. Unlike `String` or `Vec<u8>` with
//! `write!`, it formats integers, floats and booleans straight into its backing storage using
//! stack scratch space, so appending a number never touches the heap unless the buffer has to
//! grow.
//!
//! Buffers are handed out by a [`Pool`]. The pool is an explicit value: construct one at
//! startup and pass it to whatever needs buffers.
//!
//! ```
//! use stackdriver_bufpool::{FloatBits, Pool};
//!
//! let pool = Pool::new();
//! let mut buf = pool.get();
//! buf.append_str("answer=");
//! buf.append_int(42);
//! buf.append_byte(b' ');
//! buf.append_float(3.14, FloatBits::F64);
//! assert_eq!(buf.as_str(), "answer=42 3.14");
//! buf.free();
//! ```

/// The pooled buffer type
pub mod buffer;

/// The buffer pool
pub mod pool;

pub use buffer::{Buffer, FloatBits};
pub use pool::{Pool, Stats, DEFAULT_CAPACITY};
