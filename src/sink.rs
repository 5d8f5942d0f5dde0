//! The replaceable process-wide log sink.
//!
//! Log calls reach whichever [`LogSink`] is currently installed in a
//! [`SinkSlot`]. Redirection swaps the active sink; stopping it reinstalls the
//! slot's baseline [`Passthrough`].

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::echo::EchoWriter;

static GLOBAL_SLOT: Lazy<Arc<SinkSlot>> = Lazy::new(|| Arc::new(SinkSlot::default()));

/// The process-wide sink slot, whose baseline echoes to stdout.
pub fn global_slot() -> Arc<SinkSlot> {
    Arc::clone(&GLOBAL_SLOT)
}

/// Formatter installed as the active log sink.
pub trait LogSink: Send + Sync {
    /// Format and emit one message, returning the byte count the sink reports
    /// for it.
    fn emit(&self, args: fmt::Arguments<'_>) -> usize;

    /// Short identifier used in diagnostics.
    fn name(&self) -> &'static str;
}

/// Baseline sink writing straight to the local echo writer.
///
/// No exclusivity, no socket involvement.
#[derive(Clone, Debug, Default)]
pub struct Passthrough {
    echo: EchoWriter,
}

impl Passthrough {
    pub fn new(echo: EchoWriter) -> Self {
        Self { echo }
    }
}

impl LogSink for Passthrough {
    fn emit(&self, args: fmt::Arguments<'_>) -> usize {
        self.echo.write_args(args)
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// Holder of the active sink.
pub struct SinkSlot {
    active: RwLock<Arc<dyn LogSink>>,
    baseline: Arc<dyn LogSink>,
}

impl SinkSlot {
    /// Create a slot whose active sink is `baseline`.
    pub fn new(baseline: Arc<dyn LogSink>) -> Self {
        Self {
            active: RwLock::new(Arc::clone(&baseline)),
            baseline,
        }
    }

    /// Create a slot with a [`Passthrough`] baseline writing to `echo`.
    pub fn with_echo(echo: EchoWriter) -> Self {
        Self::new(Arc::new(Passthrough::new(echo)))
    }

    /// Make `sink` the active sink and return the one it replaced.
    pub fn install(&self, sink: Arc<dyn LogSink>) -> Arc<dyn LogSink> {
        std::mem::replace(&mut *self.active.write(), sink)
    }

    /// Reinstall the baseline sink.
    pub fn restore_baseline(&self) {
        self.install(Arc::clone(&self.baseline));
    }

    /// Emit through the active sink.
    ///
    /// The slot lock is released before the sink runs, so a sink may block on
    /// its own guard without stalling concurrent installs.
    pub fn emit(&self, args: fmt::Arguments<'_>) -> usize {
        let sink = Arc::clone(&*self.active.read());
        sink.emit(args)
    }

    /// Emit through the baseline sink regardless of what is active.
    pub fn emit_baseline(&self, args: fmt::Arguments<'_>) -> usize {
        self.baseline.emit(args)
    }

    pub fn active_name(&self) -> &'static str {
        self.active.read().name()
    }

    /// Return `true` when `sink` is the active sink.
    pub fn is_active(&self, sink: &Arc<dyn LogSink>) -> bool {
        Arc::ptr_eq(&*self.active.read(), sink)
    }
}

impl Default for SinkSlot {
    fn default() -> Self {
        Self::with_echo(EchoWriter::stdout())
    }
}

impl fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSlot")
            .field("active", &self.active_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rstest::rstest;

    #[derive(Default)]
    struct Recording {
        lines: Mutex<Vec<String>>,
    }

    impl LogSink for Recording {
        fn emit(&self, args: fmt::Arguments<'_>) -> usize {
            let line = args.to_string();
            let len = line.len();
            self.lines.lock().push(line);
            len
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[rstest]
    fn install_and_restore_switch_active_sink() {
        let baseline = Arc::new(Recording::default());
        let slot = SinkSlot::new(baseline.clone());
        let redirected = Arc::new(Recording::default());
        let redirected_dyn: Arc<dyn LogSink> = redirected.clone();

        slot.install(Arc::clone(&redirected_dyn));
        assert!(slot.is_active(&redirected_dyn));
        assert_eq!(slot.emit(format_args!("to {}", "socket")), 9);

        slot.restore_baseline();
        assert!(!slot.is_active(&redirected_dyn));
        slot.emit(format_args!("to console"));

        assert_eq!(redirected.lines.lock().as_slice(), ["to socket"]);
        assert_eq!(baseline.lines.lock().as_slice(), ["to console"]);
    }
}
