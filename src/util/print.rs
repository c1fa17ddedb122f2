//! Printing that never touches the allocator. Everything here is fine to call
//! from a signal handler or from inside `GlobalAlloc::alloc()`.

use std::fmt;

/// `write(2)` straight to stderr. Best effort: short writes are continued,
/// a failed write drops the rest.
pub fn putstr(s: &str) {
    putbytes(s.as_bytes())
}

#[cfg(unix)]
pub fn putbytes(mut bytes: &[u8]) {
    use libc::{c_void, STDERR_FILENO};

    while !bytes.is_empty() {
        // SAFETY: `bytes` is valid for reads of `bytes.len()` bytes, and
        // write() is async-signal-safe.
        let n = unsafe { libc::write(STDERR_FILENO, bytes.as_ptr() as *const c_void, bytes.len()) };
        if n <= 0 {
            return;
        }
        bytes = &bytes[n as usize..];
    }
}

#[cfg(not(unix))]
pub fn putbytes(bytes: &[u8]) {
    use std::io::Write;

    let _ = std::io::stderr().write_all(bytes);
}

/// A fixed-capacity line buffer that implements [`fmt::Write`], so that
/// `write!()` can format numbers and pointers without a `String`. Anything
/// past `N` bytes is cut off.
pub struct StackBuf<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> StackBuf<N> {
    pub const fn new() -> Self {
        Self { buf: [0; N], len: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Write the contents to stderr and empty the buffer
    pub fn flush(&mut self) {
        putbytes(self.as_bytes());
        self.len = 0;
    }
}

impl<const N: usize> Default for StackBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for StackBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        if n < s.len() {
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;

    use super::StackBuf;

    #[test]
    fn stack_buf_formats_without_allocating() {
        let mut buf = StackBuf::<32>::new();
        write!(buf, "sig {} at {:#x}", 8, 0xdead_usize).unwrap();
        assert_eq!(buf.as_bytes(), b"sig 8 at 0xdead");
    }

    #[test]
    fn stack_buf_truncates_when_full() {
        let mut buf = StackBuf::<4>::new();
        assert!(write!(buf, "abcdef").is_err());
        assert_eq!(buf.as_bytes(), b"abcd");
        assert!(buf.write_str("g").is_err());
        assert_eq!(buf.as_bytes(), b"abcd");
    }
}
