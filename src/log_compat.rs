//! Compatibility bridge for the Rust `log` crate.
//!
//! [`SocketLogger`] implements `log::Log` by rendering each record as
//! `"<L> (<uptime ms>) <target>: <message>\n"` and handing it to the active
//! sink of a [`SinkSlot`]. Records emitted by this crate itself go to the
//! slot's baseline sink instead, so the redirection path never logs into its
//! own critical section.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use log::{LevelFilter, Metadata, Record};
use once_cell::sync::Lazy;

use crate::error::RedirectError;
use crate::sink::{SinkSlot, global_slot};

const INTERNAL_TARGET: &str = "socket_log";

/// `log::Log` implementation forwarding records to a [`SinkSlot`].
pub struct SocketLogger {
    slot: Arc<SinkSlot>,
    started: Instant,
}

impl SocketLogger {
    /// Create a logger feeding `slot`. Uptime is measured from this call.
    pub fn with_slot(slot: Arc<SinkSlot>) -> Self {
        Self {
            slot,
            started: Instant::now(),
        }
    }

    fn uptime_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    fn forward(&self, internal: bool, line: fmt::Arguments<'_>) {
        if internal {
            self.slot.emit_baseline(line);
        } else {
            self.slot.emit(line);
        }
    }
}

fn level_letter(level: log::Level) -> char {
    match level {
        log::Level::Error => 'E',
        log::Level::Warn => 'W',
        log::Level::Info => 'I',
        log::Level::Debug => 'D',
        log::Level::Trace => 'V',
    }
}

fn is_internal(target: &str) -> bool {
    target
        .strip_prefix(INTERNAL_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

fn is_enabled_by_global_max(level: log::Level) -> bool {
    log::max_level() >= level.to_level_filter()
}

impl log::Log for SocketLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        is_enabled_by_global_max(metadata.level())
    }

    fn log(&self, record: &Record<'_>) {
        if !is_enabled_by_global_max(record.level()) {
            return;
        }
        self.forward(
            is_internal(record.target()),
            format_args!(
                "{} ({}) {}: {}\n",
                level_letter(record.level()),
                self.uptime_ms(),
                record.target(),
                record.args()
            ),
        );
    }

    fn flush(&self) {}
}

static SOCKET_LOGGER: Lazy<SocketLogger> = Lazy::new(|| SocketLogger::with_slot(global_slot()));
static INSTALL_RESULT: OnceLock<bool> = OnceLock::new();

/// Install [`SocketLogger`] over the process-wide slot as the global logger.
///
/// The operation is idempotent: repeated calls after a successful install
/// only adjust the maximum level. Fails when a different global logger is
/// already set.
pub fn install_global_logger(level: LevelFilter) -> Result<(), RedirectError> {
    let installed = *INSTALL_RESULT.get_or_init(|| log::set_logger(&*SOCKET_LOGGER).is_ok());
    if !installed {
        return Err(RedirectError::LoggerAlreadySet);
    }
    log::set_max_level(level);
    Ok(())
}
