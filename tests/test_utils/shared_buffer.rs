//! In-memory writers used as the local echo target in tests.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

/// Thread-safe byte buffer implementing [`Write`].
///
/// The inner buffer stays private so tests can't bypass the `Write`
/// implementation.
#[derive(Clone, Default)]
pub struct SharedBuf {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuf {
    /// Return a snapshot of the buffer contents.
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    #[allow(dead_code)]
    pub fn text(&self) -> String {
        String::from_utf8(self.contents()).expect("buffer contains invalid UTF-8")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Latch that holds writers back until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
    blocked: AtomicUsize,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    /// Writers currently parked at the gate.
    pub fn blocked(&self) -> usize {
        self.blocked.load(Ordering::SeqCst)
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        if *open {
            return;
        }
        self.blocked.fetch_add(1, Ordering::SeqCst);
        while !*open {
            self.opened.wait(&mut open);
        }
        self.blocked.fetch_sub(1, Ordering::SeqCst);
    }
}

/// [`SharedBuf`] whose writes block until its [`Gate`] opens.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct GatedBuf {
    pub buf: SharedBuf,
    pub gate: Arc<Gate>,
}

impl Write for GatedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.gate.wait();
        self.buf.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
