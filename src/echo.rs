//! Local echo output shared by every sink.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Cloneable handle to the local echo writer (stdout by default).
///
/// Write errors are swallowed: a failing echo must not disturb the caller of
/// a log statement. Each call reports how many bytes reached the writer.
#[derive(Clone)]
pub struct EchoWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl EchoWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Write raw bytes and flush.
    pub fn write_bytes(&self, bytes: &[u8]) -> usize {
        let mut writer = self.inner.lock();
        match writer.write_all(bytes).and_then(|()| writer.flush()) {
            Ok(()) => bytes.len(),
            Err(_) => 0,
        }
    }

    /// Format `args` straight into the writer.
    pub fn write_args(&self, args: fmt::Arguments<'_>) -> usize {
        let mut writer = self.inner.lock();
        let mut counted = CountingWrite {
            inner: &mut **writer,
            written: 0,
        };
        let _ = counted.write_fmt(args);
        let written = counted.written;
        let _ = writer.flush();
        written
    }

    /// Write `prefix` then `args` while holding the writer once.
    pub(crate) fn write_prefixed(&self, prefix: &[u8], args: fmt::Arguments<'_>) -> usize {
        let mut writer = self.inner.lock();
        let mut counted = CountingWrite {
            inner: &mut **writer,
            written: 0,
        };
        let _ = counted.write_all(prefix);
        let _ = counted.write_fmt(args);
        let written = counted.written;
        let _ = writer.flush();
        written
    }
}

impl Default for EchoWriter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for EchoWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EchoWriter(<dyn Write>)")
    }
}

struct CountingWrite<'a> {
    inner: &'a mut (dyn Write + Send),
    written: usize,
}

impl Write for CountingWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
