//! The contracts between values and the encoder that writes them.
//!
//! A value that knows how to describe itself implements [`ObjectMarshaler`] or
//! [`ArrayMarshaler`]; the encoder passes itself in as the sink, so marshalers can nest
//! arbitrarily deep without an intermediate tree.

use std::io;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::error::Result;

/// Appends values without keys, used for array elements and by the pluggable formatters in
/// [`EncoderConfig`](crate::config::EncoderConfig).
pub trait PrimitiveArrayEncoder {
    fn append_bool(&mut self, v: bool);
    fn append_byte_string(&mut self, v: &[u8]);
    fn append_complex128(&mut self, re: f64, im: f64);
    fn append_float64(&mut self, v: f64);
    fn append_float32(&mut self, v: f32);
    fn append_int64(&mut self, v: i64);
    fn append_uint64(&mut self, v: u64);
    fn append_string(&mut self, v: &str);

    fn append_complex64(&mut self, re: f32, im: f32) {
        self.append_complex128(f64::from(re), f64::from(im));
    }
}

/// Appends array elements of any type.
pub trait ArrayEncoder: PrimitiveArrayEncoder {
    fn append_array(&mut self, arr: &dyn ArrayMarshaler) -> Result<()>;
    fn append_object(&mut self, obj: &dyn ObjectMarshaler) -> Result<()>;
    /// Serializes an arbitrary value through serde. Slow and allocation-heavy.
    fn append_reflected(&mut self, v: &dyn Reflect) -> Result<()>;
    fn append_duration(&mut self, d: TimeDelta);
    fn append_time(&mut self, t: DateTime<Utc>);
}

/// Adds keyed values to an object.
pub trait ObjectEncoder {
    fn add_array(&mut self, key: &str, arr: &dyn ArrayMarshaler) -> Result<()>;
    fn add_object(&mut self, key: &str, obj: &dyn ObjectMarshaler) -> Result<()>;
    /// Adds raw bytes, base64 encoded.
    fn add_binary(&mut self, key: &str, v: &[u8]);
    /// Adds bytes that are text, escaped like a string.
    fn add_byte_string(&mut self, key: &str, v: &[u8]);
    fn add_bool(&mut self, key: &str, v: bool);
    fn add_complex128(&mut self, key: &str, re: f64, im: f64);
    fn add_duration(&mut self, key: &str, d: TimeDelta);
    fn add_float64(&mut self, key: &str, v: f64);
    fn add_float32(&mut self, key: &str, v: f32);
    fn add_int64(&mut self, key: &str, v: i64);
    fn add_uint64(&mut self, key: &str, v: u64);
    fn add_string(&mut self, key: &str, v: &str);
    fn add_time(&mut self, key: &str, t: DateTime<Utc>);
    /// Serializes an arbitrary value through serde. Slow and allocation-heavy.
    fn add_reflected(&mut self, key: &str, v: &dyn Reflect) -> Result<()>;
    /// Opens a nested object under `key`; every value added afterwards lands in it.
    fn open_namespace(&mut self, key: &str);

    fn add_complex64(&mut self, key: &str, re: f32, im: f32) {
        self.add_complex128(key, f64::from(re), f64::from(im));
    }
}

/// A value that can write itself as a JSON object.
pub trait ObjectMarshaler {
    fn marshal_log_object(&self, enc: &mut dyn ObjectEncoder) -> Result<()>;
}

/// A value that can write itself as a JSON array.
pub trait ArrayMarshaler {
    fn marshal_log_array(&self, enc: &mut dyn ArrayEncoder) -> Result<()>;
}

/// Adapts a closure into an [`ObjectMarshaler`].
///
/// ```
/// use slog_stackdriver::marshal::ObjectMarshalerFn;
///
/// let nested = ObjectMarshalerFn::new(|enc| {
///     enc.add_int64("i", 42);
///     Ok(())
/// });
/// ```
pub struct ObjectMarshalerFn<F>(pub F);

impl<F> ObjectMarshalerFn<F>
where
    F: Fn(&mut dyn ObjectEncoder) -> Result<()>,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ObjectMarshaler for ObjectMarshalerFn<F>
where
    F: Fn(&mut dyn ObjectEncoder) -> Result<()>,
{
    fn marshal_log_object(&self, enc: &mut dyn ObjectEncoder) -> Result<()> {
        (self.0)(enc)
    }
}

/// Adapts a closure into an [`ArrayMarshaler`].
pub struct ArrayMarshalerFn<F>(pub F);

impl<F> ArrayMarshalerFn<F>
where
    F: Fn(&mut dyn ArrayEncoder) -> Result<()>,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ArrayMarshaler for ArrayMarshalerFn<F>
where
    F: Fn(&mut dyn ArrayEncoder) -> Result<()>,
{
    fn marshal_log_array(&self, enc: &mut dyn ArrayEncoder) -> Result<()> {
        (self.0)(enc)
    }
}

impl<T: ObjectMarshaler> ArrayMarshaler for [T] {
    fn marshal_log_array(&self, enc: &mut dyn ArrayEncoder) -> Result<()> {
        for obj in self {
            enc.append_object(obj)?;
        }
        Ok(())
    }
}

impl<T: ObjectMarshaler> ArrayMarshaler for Vec<T> {
    fn marshal_log_array(&self, enc: &mut dyn ArrayEncoder) -> Result<()> {
        self.as_slice().marshal_log_array(enc)
    }
}

/// Any value serde can serialize. This is the catch-all for values that have no marshaler of
/// their own.
pub trait Reflect {
    fn write_json(&self, w: &mut dyn io::Write) -> serde_json::Result<()>;
}

impl<T: Serialize + ?Sized> Reflect for T {
    fn write_json(&self, w: &mut dyn io::Write) -> serde_json::Result<()> {
        serde_json::to_writer(w, self)
    }
}
