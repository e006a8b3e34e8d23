use std::borrow::Cow;
use std::fmt;
use std::io;

use crate::pool::Pool;

/// The precision a float was recorded with. Formatting a value that started life as an `f32`
/// with 64 bits of precision would print noise digits (`0.1f32` becomes `0.10000000149011612`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatBits {
    F32,
    F64,
}

/// A growable byte buffer that is intended to be pooled.
///
/// The only way to construct one is through [`Pool::get`]. Give it back with [`Buffer::free`]
/// (or [`Pool::put`]) when done; the backing storage is then reused by the next caller. A buffer
/// that is simply dropped is deallocated and the pool allocates a replacement on demand.
pub struct Buffer {
    bs: Vec<u8>,
    pool: Option<Pool>,
}

impl Buffer {
    pub(crate) fn from_parts(bs: Vec<u8>, pool: Pool) -> Self {
        Self {
            bs,
            pool: Some(pool),
        }
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.bs
    }

    /// Writes a single byte to the buffer.
    #[inline]
    pub fn append_byte(&mut self, v: u8) {
        self.bs.push(v);
    }

    /// Writes a string to the buffer.
    #[inline]
    pub fn append_str(&mut self, s: &str) {
        self.bs.extend_from_slice(s.as_bytes());
    }

    /// Writes raw bytes to the buffer.
    #[inline]
    pub fn append_bytes(&mut self, bs: &[u8]) {
        self.bs.extend_from_slice(bs);
    }

    /// Appends an integer in base 10.
    pub fn append_int(&mut self, i: i64) {
        let mut scratch = itoa::Buffer::new();
        self.bs.extend_from_slice(scratch.format(i).as_bytes());
    }

    /// Appends an unsigned integer in base 10.
    pub fn append_uint(&mut self, u: u64) {
        let mut scratch = itoa::Buffer::new();
        self.bs.extend_from_slice(scratch.format(u).as_bytes());
    }

    /// Appends `true` or `false`.
    #[inline]
    pub fn append_bool(&mut self, v: bool) {
        self.bs
            .extend_from_slice(if v { b"true" } else { b"false" });
    }

    /// Appends the shortest decimal representation that round-trips to `f` at the given
    /// precision.
    ///
    /// NaN and the infinities are written as `NaN`, `inf` and `-inf`; none of those are valid
    /// JSON numbers, so JSON producers must handle them before calling this.
    pub fn append_float(&mut self, f: f64, bits: FloatBits) {
        let mut scratch = ryu::Buffer::new();
        let s = match bits {
            FloatBits::F32 => scratch.format(f as f32),
            FloatBits::F64 => scratch.format(f),
        };
        self.bs.extend_from_slice(s.as_bytes());
    }

    /// The current content.
    ///
    /// The slice borrows the buffer, so it cannot outlive the next mutation or the return of the
    /// buffer to its pool.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bs
    }

    /// A mutable view over the current content.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bs
    }

    /// The content as text. Borrows the backing storage when it holds valid UTF-8, which is
    /// always the case for output of the JSON encoder; invalid sequences are replaced.
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bs)
    }

    /// The last byte written, if any.
    #[inline]
    pub fn last_byte(&self) -> Option<u8> {
        self.bs.last().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bs.is_empty()
    }

    /// The capacity of the backing storage.
    #[inline]
    pub fn cap(&self) -> usize {
        self.bs.capacity()
    }

    /// Discards all but the first `n` bytes, keeping the allocated storage.
    ///
    /// # Panics
    ///
    /// Panics if `n` is greater than the length of the buffer.
    pub fn truncate(&mut self, n: usize) {
        if n > self.bs.len() {
            panic!(
                "bufpool: truncation out of range ({} > {})",
                n,
                self.bs.len()
            );
        }
        self.bs.truncate(n);
    }

    /// Resets the length to zero. Subsequent writes re-use the backing storage.
    #[inline]
    pub fn reset(&mut self) {
        self.bs.clear();
    }

    /// Trims a final `\n` byte, if there is one.
    pub fn trim_newline(&mut self) {
        if self.bs.last() == Some(&b'\n') {
            self.bs.pop();
        }
    }

    /// Returns the buffer to the pool it came from.
    pub fn free(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.put(self);
        }
    }
}

impl io::Write for Buffer {
    #[inline]
    fn write(&mut self, bs: &[u8]) -> io::Result<usize> {
        self.bs.extend_from_slice(bs);
        Ok(bs.len())
    }

    #[inline]
    fn write_all(&mut self, bs: &[u8]) -> io::Result<()> {
        self.bs.extend_from_slice(bs);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Write for Buffer {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.append_str(s);
        Ok(())
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.bs.len())
            .field("cap", &self.bs.capacity())
            .field("content", &self.as_str())
            .finish()
    }
}
