//! A JSON encoder that streams keys and values straight into a pooled [`Buffer`].
//!
//! There is no intermediate document: every `add_*` call writes its key and value immediately.
//! Whether a comma is needed is decided by looking at the last byte written, so nothing else
//! may leave trailing separators or whitespace in the buffer.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use stackdriver_bufpool::{Buffer, FloatBits, Pool};

use crate::config::{duration_nanos, unix_nanos, EncoderConfig};
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::field::Field;
use crate::marshal::{
    ArrayEncoder, ArrayMarshaler, ObjectEncoder, ObjectMarshaler, PrimitiveArrayEncoder, Reflect,
};

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Encodes log entries as single-line JSON objects.
///
/// An encoder is not meant to be shared between threads; use [`JsonEncoder::clone_encoder`]
/// to get an independent copy.
pub struct JsonEncoder {
    config: Arc<EncoderConfig>,
    pool: Pool,
    buf: Buffer,
    spaced: bool,
    open_namespaces: usize,
    // Lazily taken from the pool the first time a reflected value is encoded.
    reflect_buf: Option<Buffer>,
}

impl JsonEncoder {
    /// Creates an encoder that writes compact JSON.
    pub fn new(config: EncoderConfig, pool: Pool) -> Self {
        Self::with_spacing(Arc::new(config), pool, false)
    }

    /// Creates an encoder that puts a space after every `:` and `,`.
    pub fn new_spaced(config: EncoderConfig, pool: Pool) -> Self {
        Self::with_spacing(Arc::new(config), pool, true)
    }

    fn with_spacing(config: Arc<EncoderConfig>, pool: Pool, spaced: bool) -> Self {
        let buf = pool.get();
        Self {
            config,
            pool,
            buf,
            spaced,
            open_namespaces: 0,
            reflect_buf: None,
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// The number of namespaces opened and not yet closed.
    pub fn open_namespaces(&self) -> usize {
        self.open_namespaces
    }

    /// The bytes written so far.
    pub fn buffer(&self) -> &Buffer {
        &self.buf
    }

    /// Gives up the encoder, returning its buffer. The caller owns the buffer and should
    /// [`free`](Buffer::free) it when done.
    pub fn into_buffer(mut self) -> Buffer {
        if let Some(scratch) = self.reflect_buf.take() {
            scratch.free();
        }
        self.buf
    }

    /// Returns the encoder's buffers to the pool.
    pub fn free(self) {
        self.into_buffer().free()
    }

    /// An independent encoder holding a copy of everything written so far.
    pub fn clone_encoder(&self) -> Self {
        let mut clone = self.clone_empty();
        clone.buf.append_bytes(self.buf.as_bytes());
        clone
    }

    /// Same configuration and namespace depth, but an empty buffer.
    fn clone_empty(&self) -> Self {
        let mut clone = Self::with_spacing(Arc::clone(&self.config), self.pool.clone(), self.spaced);
        clone.open_namespaces = self.open_namespaces;
        clone
    }

    /// Writes one `}` per open namespace.
    pub fn close_open_namespaces(&mut self) {
        for _ in 0..self.open_namespaces {
            self.buf.append_byte(b'}');
        }
        self.open_namespaces = 0;
    }

    /// Encodes an entry and its fields as a complete JSON object followed by the configured
    /// line ending. Fields added to this encoder before are included after the message.
    ///
    /// A field that fails to encode does not fail the entry; see [`Field::add_to`].
    pub fn encode_entry(&self, entry: &Entry, fields: &[Field]) -> Buffer {
        self.encode_entry_with_context(entry, &[], fields)
    }

    /// Like [`JsonEncoder::encode_entry`], with `top_level` written right after the message.
    /// Namespaces opened by the persistent fields or by `fields` never enclose them.
    pub fn encode_entry_with_context(
        &self,
        entry: &Entry,
        top_level: &[Field],
        fields: &[Field],
    ) -> Buffer {
        let config = Arc::clone(&self.config);
        let mut fin = self.clone_empty();
        fin.buf.append_byte(b'{');

        if !config.level_key.is_empty() {
            fin.add_key(&config.level_key);
            let cur = fin.buf.len();
            config.encode_level.encode(entry.level, &mut fin);
            if cur == fin.buf.len() {
                fin.append_string(entry.level.as_str());
            }
        }
        if !config.time_key.is_empty() {
            fin.add_time(&config.time_key, entry.time);
        }
        if !entry.logger_name.is_empty() && !config.name_key.is_empty() {
            fin.add_key(&config.name_key);
            let cur = fin.buf.len();
            config.encode_name.encode(&entry.logger_name, &mut fin);
            if cur == fin.buf.len() {
                fin.append_string(&entry.logger_name);
            }
        }
        if let Some(caller) = entry.caller.as_ref().filter(|_| !config.caller_key.is_empty()) {
            fin.add_key(&config.caller_key);
            let cur = fin.buf.len();
            config.encode_caller.encode(caller, &mut fin);
            if cur == fin.buf.len() {
                fin.append_string(&caller.full_path());
            }
        }
        if !config.message_key.is_empty() {
            fin.add_key(&config.message_key);
            fin.append_string(&entry.message);
        }
        for field in top_level {
            field.add_to(&mut fin);
        }
        if !self.buf.is_empty() {
            fin.add_element_separator();
            fin.buf.append_bytes(self.buf.as_bytes());
        }
        for field in fields {
            field.add_to(&mut fin);
        }
        fin.close_open_namespaces();
        if !entry.stack.is_empty() && !config.stacktrace_key.is_empty() {
            fin.add_string(&config.stacktrace_key, &entry.stack);
        }
        fin.buf.append_byte(b'}');
        fin.buf.append_str(&config.line_ending);
        fin.into_buffer()
    }

    fn add_key(&mut self, key: &str) {
        self.add_element_separator();
        self.buf.append_byte(b'"');
        self.safe_add_str(key);
        self.buf.append_byte(b'"');
        self.buf.append_byte(b':');
        if self.spaced {
            self.buf.append_byte(b' ');
        }
    }

    fn add_element_separator(&mut self) {
        match self.buf.last_byte() {
            None | Some(b'{' | b'[' | b':' | b',' | b' ') => {}
            Some(_) => {
                self.buf.append_byte(b',');
                if self.spaced {
                    self.buf.append_byte(b' ');
                }
            }
        }
    }

    fn append_float(&mut self, v: f64, bits: FloatBits) {
        self.add_element_separator();
        if v.is_nan() {
            self.buf.append_str(r#""NaN""#);
        } else if v == f64::INFINITY {
            self.buf.append_str(r#""+Inf""#);
        } else if v == f64::NEG_INFINITY {
            self.buf.append_str(r#""-Inf""#);
        } else {
            self.buf.append_float(v, bits);
        }
    }

    fn safe_add_str(&mut self, s: &str) {
        self.safe_add_valid(s.as_bytes());
    }

    /// Escapes arbitrary bytes. Every byte of an invalid UTF-8 sequence becomes `\ufffd`.
    fn safe_add_bytes(&mut self, s: &[u8]) {
        for chunk in s.utf8_chunks() {
            self.safe_add_valid(chunk.valid().as_bytes());
            for _ in chunk.invalid() {
                self.buf.append_str(r"\ufffd");
            }
        }
    }

    // s must be valid UTF-8. Multi-byte sequences never contain bytes below 0x80, so they
    // are copied verbatim along with the plain ASCII around them.
    fn safe_add_valid(&mut self, s: &[u8]) {
        let mut start = 0;
        for (i, &b) in s.iter().enumerate() {
            if b >= 0x20 && b != b'"' && b != b'\\' {
                continue;
            }
            self.buf.append_bytes(&s[start..i]);
            self.add_escaped(b);
            start = i + 1;
        }
        self.buf.append_bytes(&s[start..]);
    }

    fn add_escaped(&mut self, b: u8) {
        match b {
            b'"' | b'\\' => {
                self.buf.append_byte(b'\\');
                self.buf.append_byte(b);
            }
            b'\n' => self.buf.append_str(r"\n"),
            b'\r' => self.buf.append_str(r"\r"),
            b'\t' => self.buf.append_str(r"\t"),
            _ => {
                self.buf.append_str(r"\u00");
                self.buf.append_byte(HEX[usize::from(b >> 4)]);
                self.buf.append_byte(HEX[usize::from(b & 0xF)]);
            }
        }
    }

    /// Serializes `v` into the scratch buffer. Nothing reaches the main buffer on failure.
    fn encode_reflected(&mut self, v: &dyn Reflect) -> Result<()> {
        let pool = &self.pool;
        let scratch = self.reflect_buf.get_or_insert_with(|| pool.get());
        scratch.reset();
        v.write_json(scratch).map_err(|source| Error::SerializeError {
            context: "reflected value".to_string(),
            source,
        })?;
        scratch.trim_newline();
        Ok(())
    }

    fn append_reflected_bytes(&mut self) {
        if let Some(scratch) = &self.reflect_buf {
            self.buf.append_bytes(scratch.as_bytes());
        }
    }
}

impl PrimitiveArrayEncoder for JsonEncoder {
    fn append_bool(&mut self, v: bool) {
        self.add_element_separator();
        self.buf.append_bool(v);
    }

    fn append_byte_string(&mut self, v: &[u8]) {
        self.add_element_separator();
        self.buf.append_byte(b'"');
        self.safe_add_bytes(v);
        self.buf.append_byte(b'"');
    }

    fn append_complex128(&mut self, re: f64, im: f64) {
        self.add_element_separator();
        // Inside quotes non-finite parts need no special casing.
        self.buf.append_byte(b'"');
        self.buf.append_float(re, FloatBits::F64);
        self.buf.append_byte(b'+');
        self.buf.append_float(im, FloatBits::F64);
        self.buf.append_byte(b'i');
        self.buf.append_byte(b'"');
    }

    fn append_float64(&mut self, v: f64) {
        self.append_float(v, FloatBits::F64);
    }

    fn append_float32(&mut self, v: f32) {
        self.append_float(f64::from(v), FloatBits::F32);
    }

    fn append_int64(&mut self, v: i64) {
        self.add_element_separator();
        self.buf.append_int(v);
    }

    fn append_uint64(&mut self, v: u64) {
        self.add_element_separator();
        self.buf.append_uint(v);
    }

    fn append_string(&mut self, v: &str) {
        self.add_element_separator();
        self.buf.append_byte(b'"');
        self.safe_add_str(v);
        self.buf.append_byte(b'"');
    }
}

impl ArrayEncoder for JsonEncoder {
    fn append_array(&mut self, arr: &dyn ArrayMarshaler) -> Result<()> {
        self.add_element_separator();
        self.buf.append_byte(b'[');
        let res = arr.marshal_log_array(self);
        self.buf.append_byte(b']');
        res
    }

    fn append_object(&mut self, obj: &dyn ObjectMarshaler) -> Result<()> {
        // Namespaces opened by the object are closed with it.
        let outer = self.open_namespaces;
        self.open_namespaces = 0;
        self.add_element_separator();
        self.buf.append_byte(b'{');
        let res = obj.marshal_log_object(self);
        self.close_open_namespaces();
        self.buf.append_byte(b'}');
        self.open_namespaces = outer;
        res
    }

    fn append_reflected(&mut self, v: &dyn Reflect) -> Result<()> {
        self.encode_reflected(v)?;
        self.add_element_separator();
        self.append_reflected_bytes();
        Ok(())
    }

    fn append_duration(&mut self, d: TimeDelta) {
        let encoder = self.config.encode_duration;
        let cur = self.buf.len();
        encoder.encode(d, self);
        if cur == self.buf.len() {
            self.append_int64(duration_nanos(d));
        }
    }

    fn append_time(&mut self, t: DateTime<Utc>) {
        let encoder = self.config.encode_time;
        let cur = self.buf.len();
        encoder.encode(t, self);
        if cur == self.buf.len() {
            self.append_int64(unix_nanos(t));
        }
    }
}

impl ObjectEncoder for JsonEncoder {
    fn add_array(&mut self, key: &str, arr: &dyn ArrayMarshaler) -> Result<()> {
        self.add_key(key);
        self.append_array(arr)
    }

    fn add_object(&mut self, key: &str, obj: &dyn ObjectMarshaler) -> Result<()> {
        self.add_key(key);
        self.append_object(obj)
    }

    fn add_binary(&mut self, key: &str, v: &[u8]) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(v);
        self.add_string(key, &encoded);
    }

    fn add_byte_string(&mut self, key: &str, v: &[u8]) {
        self.add_key(key);
        self.append_byte_string(v);
    }

    fn add_bool(&mut self, key: &str, v: bool) {
        self.add_key(key);
        self.append_bool(v);
    }

    fn add_complex128(&mut self, key: &str, re: f64, im: f64) {
        self.add_key(key);
        self.append_complex128(re, im);
    }

    fn add_duration(&mut self, key: &str, d: TimeDelta) {
        self.add_key(key);
        self.append_duration(d);
    }

    fn add_float64(&mut self, key: &str, v: f64) {
        self.add_key(key);
        self.append_float64(v);
    }

    fn add_float32(&mut self, key: &str, v: f32) {
        self.add_key(key);
        self.append_float32(v);
    }

    fn add_int64(&mut self, key: &str, v: i64) {
        self.add_key(key);
        self.append_int64(v);
    }

    fn add_uint64(&mut self, key: &str, v: u64) {
        self.add_key(key);
        self.append_uint64(v);
    }

    fn add_string(&mut self, key: &str, v: &str) {
        self.add_key(key);
        self.append_string(v);
    }

    fn add_time(&mut self, key: &str, t: DateTime<Utc>) {
        self.add_key(key);
        self.append_time(t);
    }

    fn add_reflected(&mut self, key: &str, v: &dyn Reflect) -> Result<()> {
        self.encode_reflected(v)?;
        self.add_key(key);
        self.append_reflected_bytes();
        Ok(())
    }

    fn open_namespace(&mut self, key: &str) {
        self.add_key(key);
        self.buf.append_byte(b'{');
        self.open_namespaces += 1;
    }
}
