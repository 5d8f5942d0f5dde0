//! Console collaborator consulted before each log line.
//!
//! The console driver owns the terminal. The log core only asks whether
//! logging is currently suppressed and whether the previous output left a line
//! open that needs a [`LINE_FINISHER`](crate::LINE_FINISHER).

use std::sync::atomic::{AtomicBool, Ordering};

pub trait Console: Send + Sync {
    /// Return `true` while the console has suppressed log output.
    fn is_log_disabled(&self) -> bool {
        false
    }

    /// Return `true` when the next message must start on a fresh line.
    fn needs_line_finish(&self) -> bool {
        false
    }
}

/// Console that never suppresses output and never leaves a line open.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullConsole;

impl Console for NullConsole {}

/// Console state shared with an interactive console driver.
///
/// The driver marks a line open while the user is typing at a prompt; the
/// first log line afterwards consumes the mark and emits the finisher.
#[derive(Debug, Default)]
pub struct ConsoleState {
    log_disabled: AtomicBool,
    line_open: AtomicBool,
}

impl ConsoleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_log_disabled(&self, disabled: bool) {
        self.log_disabled.store(disabled, Ordering::Release);
    }

    /// Record that the console output currently ends mid-line.
    pub fn mark_line_open(&self) {
        self.line_open.store(true, Ordering::Release);
    }

    pub fn is_line_open(&self) -> bool {
        self.line_open.load(Ordering::Acquire)
    }
}

impl Console for ConsoleState {
    fn is_log_disabled(&self) -> bool {
        self.log_disabled.load(Ordering::Acquire)
    }

    fn needs_line_finish(&self) -> bool {
        self.line_open.swap(false, Ordering::AcqRel)
    }
}
