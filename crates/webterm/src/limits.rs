//! Bounded output capture for evaluation side output.

/// Marker appended when captured output exceeds its limit.
pub const TRUNCATION_MARKER: &str = "\n... [output truncated] ...\n";

/// Buffer that limits how much data can be written.
///
/// Used as the explicit sink handed to a scripting backend: anything the
/// evaluated code writes to its output channel lands here instead of going
/// live to the caller.
#[derive(Debug, Clone)]
pub struct LimitedBuffer {
    buffer: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl LimitedBuffer {
    /// Create an empty buffer holding at most `limit` bytes of payload.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append data, truncating once the limit is reached.
    ///
    /// Always reports the full length as written so callers never see a
    /// short write.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.truncated {
            return data.len();
        }

        let remaining = self.limit.saturating_sub(self.buffer.len());
        let to_write = data.len().min(remaining);
        self.buffer.extend_from_slice(&data[..to_write]);

        if to_write < data.len() {
            self.truncated = true;
            self.buffer.extend_from_slice(TRUNCATION_MARKER.as_bytes());
        }

        data.len()
    }

    /// Drop everything captured so far.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.truncated = false;
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the buffer, returning the captured bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Captured bytes decoded lossily as UTF-8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Whether the limit was hit.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// Borrow the captured bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

impl std::io::Write for LimitedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(LimitedBuffer::write(self, buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::write_literal)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_buffer_under_limit() {
        let mut buf = LimitedBuffer::new(100);
        let written = buf.write(b"hello world");

        assert_eq!(written, 11);
        assert_eq!(buf.as_bytes(), b"hello world");
        assert!(!buf.was_truncated());
    }

    #[test]
    fn test_buffer_exactly_at_limit() {
        let mut buf = LimitedBuffer::new(5);
        buf.write(b"hello");

        assert_eq!(buf.as_bytes(), b"hello");
        assert!(!buf.was_truncated());
    }

    #[test]
    fn test_buffer_over_limit_appends_marker_once() {
        let mut buf = LimitedBuffer::new(5);
        buf.write(b"hello world");
        buf.write(b"more data");

        let out = buf.to_string_lossy();
        assert!(buf.was_truncated());
        assert!(out.starts_with("hello"));
        assert_eq!(out.matches("[output truncated]").count(), 1);
        assert!(!out.contains("more data"));
    }

    #[test]
    fn test_io_write_trait() {
        let mut buf = LimitedBuffer::new(100);
        write!(buf, "{} {}", "hello", 42).unwrap();

        assert_eq!(buf.to_string_lossy(), "hello 42");
    }

    #[test]
    fn test_clear_resets_truncation() {
        let mut buf = LimitedBuffer::new(3);
        buf.write(b"abcdef");
        assert!(buf.was_truncated());

        buf.clear();
        assert!(buf.is_empty());
        assert!(!buf.was_truncated());
    }
}
