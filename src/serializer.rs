//! Formatting of log arguments into owned byte lines.
//!
//! Formatting is two-pass: the first pass measures the output without
//! materialising it, the second writes into an allocation of exactly that
//! length. The writer never grows the allocation, so a `Display` impl that
//! produces more output on the second pass is truncated rather than
//! reallocated.

use std::fmt::{self, Write};
use std::sync::Arc;

use crate::allocator::{LineAllocator, LineBuffer};

/// Carriage-return/newline emitted before a message when the previous output
/// left a line open.
pub const LINE_FINISHER: &[u8] = b"\r\n";

struct CountingWriter {
    len: usize,
}

impl Write for CountingWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.len += s.len();
        Ok(())
    }
}

/// Return the number of bytes `args` formats to.
pub fn measure(args: fmt::Arguments<'_>) -> usize {
    let mut counter = CountingWriter { len: 0 };
    let _ = counter.write_fmt(args);
    counter.len
}

/// Writer appending into a vector without ever exceeding `limit` bytes.
struct BoundedWriter<'a> {
    buf: &'a mut Vec<u8>,
    limit: usize,
}

impl Write for BoundedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = self.limit.saturating_sub(self.buf.len());
        let take = s.len().min(remaining);
        self.buf.extend_from_slice(&s.as_bytes()[..take]);
        Ok(())
    }
}

fn write_bounded(buf: &mut Vec<u8>, limit: usize, args: fmt::Arguments<'_>) {
    let mut writer = BoundedWriter { buf, limit };
    let _ = writer.write_fmt(args);
}

/// A formatted log line of exact length, produced once per log call.
#[derive(Debug)]
pub struct LogLine(LineBuffer);

impl LogLine {
    /// Format `args` into a freshly allocated line.
    ///
    /// Returns `None` when the allocator cannot supply the buffer.
    pub fn format(allocator: &Arc<dyn LineAllocator>, args: fmt::Arguments<'_>) -> Option<Self> {
        Self::format_measured(allocator, args, measure(args))
    }

    /// Format `args` into a buffer of `len` bytes obtained from `allocator`.
    ///
    /// `len` is normally the result of [`measure`] for the same arguments.
    pub fn format_measured(
        allocator: &Arc<dyn LineAllocator>,
        args: fmt::Arguments<'_>,
        len: usize,
    ) -> Option<Self> {
        let mut line = LineBuffer::allocate(allocator, len)?;
        write_bounded(line.bytes_mut(), len, args);
        Some(Self(line))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A capped-length copy of a log line queued for deferred echo.
#[derive(Debug)]
pub struct DeferredMessage(LineBuffer);

impl DeferredMessage {
    /// Format `args` into a buffer of `capacity` bytes, truncating longer
    /// output. When `finish_line` is set the message starts with
    /// [`LINE_FINISHER`].
    pub fn format(
        allocator: &Arc<dyn LineAllocator>,
        capacity: usize,
        finish_line: bool,
        args: fmt::Arguments<'_>,
    ) -> Option<Self> {
        let mut message = LineBuffer::allocate(allocator, capacity)?;
        let bytes = message.bytes_mut();
        if finish_line {
            let take = LINE_FINISHER.len().min(capacity);
            bytes.extend_from_slice(&LINE_FINISHER[..take]);
        }
        write_bounded(bytes, capacity, args);
        Some(Self(message))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{BudgetAllocator, HeapAllocator};
    use rstest::rstest;

    fn heap() -> Arc<dyn LineAllocator> {
        Arc::new(HeapAllocator)
    }

    #[rstest]
    fn measure_matches_formatted_length() {
        assert_eq!(measure(format_args!("count={}", 5)), 7);
        assert_eq!(measure(format_args!("")), 0);
        assert_eq!(measure(format_args!("{:>6}|", "ab")), 7);
    }

    #[rstest]
    fn log_line_holds_exact_bytes() {
        let line = LogLine::format(&heap(), format_args!("count={}", 5)).expect("line");
        assert_eq!(line.as_bytes(), b"count=5");
        assert_eq!(line.len(), 7);
    }

    #[rstest]
    fn log_line_is_none_when_allocation_fails() {
        let allocator: Arc<dyn LineAllocator> = Arc::new(BudgetAllocator::new(4));
        assert!(LogLine::format(&allocator, format_args!("too long for budget")).is_none());
    }

    #[rstest]
    fn log_line_never_exceeds_measured_length() {
        let line =
            LogLine::format_measured(&heap(), format_args!("abcdef"), 3).expect("line");
        assert_eq!(line.as_bytes(), b"abc");
    }

    #[rstest]
    fn deferred_message_truncates_at_capacity() {
        let long = "x".repeat(300);
        let message =
            DeferredMessage::format(&heap(), 256, false, format_args!("{long}")).expect("message");
        assert_eq!(message.len(), 256);
    }

    #[rstest]
    fn deferred_message_prefixes_finisher() {
        let message =
            DeferredMessage::format(&heap(), 16, true, format_args!("hi")).expect("message");
        assert_eq!(message.as_bytes(), b"\r\nhi");
    }
}
