//! TCP socket driver for the log channels.
//!
//! [`SocketDriver`] runs a pump thread that connects to the configured peer,
//! drains the outbound channel onto the socket and fills the inbound channel
//! from it. It owns the link flags' write side: `connected` follows the
//! connection, and `send_enabled` follows it too when auto-send is on. Lost
//! connections are retried with jittered exponential backoff. The wire
//! carries the raw log bytes without framing.

mod backoff;
mod transport;
mod worker;

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded};
use log::warn;
use parking_lot::Mutex;

use crate::config::SocketLogConfig;
use crate::error::RedirectError;
use crate::link::LinkFlags;
use crate::redirect::SocketLog;

pub use backoff::ReconnectBackoff;
pub use transport::LineEndingFix;

use worker::{PumpLink, pump_loop};

/// Handle to a running socket pump thread.
pub struct SocketDriver {
    name: String,
    link: Arc<LinkFlags>,
    shutdown_tx: Option<Sender<()>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SocketDriver {
    /// Validate `config` and start pumping the channels of `log`.
    ///
    /// `log` must already be initialised; the driver writes to the link flags
    /// `log` was built with.
    pub fn spawn(config: SocketLogConfig, log: &SocketLog) -> Result<Self, RedirectError> {
        config.validate()?;
        let link = PumpLink {
            outbound: log.outbound()?,
            inbound: log.inbound()?,
            flags: log.link(),
        };
        let flags = Arc::clone(&link.flags);
        let name = config.name.clone();
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name(format!("socket-log-{name}"))
            .spawn(move || pump_loop(config, link, shutdown_rx))
            .map_err(|source| RedirectError::Spawn {
                name: "socket-log-pump",
                source,
            })?;
        Ok(Self {
            name,
            link: flags,
            shutdown_tx: Some(shutdown_tx),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Stop the pump thread and wait for it to exit.
    ///
    /// A live connection gets one last drain of the outbound channel before
    /// it is shut down.
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            warn!("socket log {}: pump thread panicked", self.name);
            self.link.set_connected(false);
        }
    }
}

impl Drop for SocketDriver {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for SocketDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketDriver")
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}
