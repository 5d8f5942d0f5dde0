//! Connection flags shared between the socket driver and the log core.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::SocketLogConfig;

/// Link state written by the socket driver and read on every send/receive.
#[derive(Debug, Default)]
pub struct LinkFlags {
    connected: AtomicBool,
    send_enabled: AtomicBool,
    fill_enabled: AtomicBool,
}

impl LinkFlags {
    /// Start disconnected with the send/fill flags taken from `config`.
    pub fn from_config(config: &SocketLogConfig) -> Self {
        Self {
            connected: AtomicBool::new(false),
            send_enabled: AtomicBool::new(config.send_enable),
            fill_enabled: AtomicBool::new(config.fill_enable),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn is_send_enabled(&self) -> bool {
        self.send_enabled.load(Ordering::Acquire)
    }

    pub fn set_send_enabled(&self, enabled: bool) {
        self.send_enabled.store(enabled, Ordering::Release);
    }

    pub fn is_fill_enabled(&self) -> bool {
        self.fill_enabled.load(Ordering::Acquire)
    }

    pub fn set_fill_enabled(&self, enabled: bool) {
        self.fill_enabled.store(enabled, Ordering::Release);
    }

    /// Outbound bytes are accepted when either sending or filling is enabled.
    pub fn accepts_outbound(&self) -> bool {
        self.is_send_enabled() || self.is_fill_enabled()
    }
}
