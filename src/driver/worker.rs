//! Pump thread moving bytes between the log channels and a TCP peer.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use log::{info, warn};

use crate::channel::ByteChannel;
use crate::config::SocketLogConfig;
use crate::link::LinkFlags;
use crate::rate_limited_warner::RateLimitedWarner;

use super::backoff::ReconnectBackoff;
use super::transport::{self, LineEndingFix};

const SEND_CHUNK: usize = 512;
const RECV_CHUNK: usize = 256;

/// Everything the pump shares with the log core.
pub(super) struct PumpLink {
    pub(super) outbound: Arc<dyn ByteChannel>,
    pub(super) inbound: Arc<dyn ByteChannel>,
    pub(super) flags: Arc<LinkFlags>,
}

enum SessionEnd {
    PeerClosed,
    Failed(io::Error),
    Stopped,
}

fn stop_requested(shutdown_rx: &Receiver<()>) -> bool {
    matches!(
        shutdown_rx.try_recv(),
        Ok(()) | Err(TryRecvError::Disconnected)
    )
}

/// Sleep for `delay` unless a stop arrives first. Returns `true` on stop.
fn wait_or_stop(shutdown_rx: &Receiver<()>, delay: Duration) -> bool {
    !matches!(
        shutdown_rx.recv_timeout(delay),
        Err(RecvTimeoutError::Timeout)
    )
}

struct Session<'a> {
    stream: TcpStream,
    config: &'a SocketLogConfig,
    link: &'a PumpLink,
    fix: Option<LineEndingFix>,
    chunk: [u8; SEND_CHUNK],
    wire: Vec<u8>,
}

impl<'a> Session<'a> {
    fn new(stream: TcpStream, config: &'a SocketLogConfig, link: &'a PumpLink) -> Self {
        Self {
            stream,
            config,
            link,
            fix: config
                .line_ending_fix_crlf_to_cr
                .then(LineEndingFix::default),
            chunk: [0; SEND_CHUNK],
            wire: Vec::with_capacity(SEND_CHUNK),
        }
    }

    fn drain_outbound(&mut self) -> io::Result<()> {
        if !self.link.flags.is_send_enabled() {
            return Ok(());
        }
        loop {
            let pulled = self.link.outbound.pull(&mut self.chunk);
            if pulled == 0 {
                return Ok(());
            }
            let bytes = &self.chunk[..pulled];
            match self.fix.as_mut() {
                Some(fix) => {
                    self.wire.clear();
                    fix.apply(bytes, &mut self.wire);
                    self.stream.write_all(&self.wire)?;
                }
                None => self.stream.write_all(bytes)?,
            }
        }
    }

    fn receive(&mut self) -> Option<SessionEnd> {
        let mut buf = [0u8; RECV_CHUNK];
        match self.stream.read(&mut buf) {
            Ok(0) => Some(SessionEnd::PeerClosed),
            Ok(n) => {
                self.link.inbound.push(&buf[..n]);
                None
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                None
            }
            Err(err) => Some(SessionEnd::Failed(err)),
        }
    }

    /// Alternate draining and receiving until the peer leaves or a stop
    /// arrives. The read timeout paces the loop.
    fn run(&mut self, shutdown_rx: &Receiver<()>) -> SessionEnd {
        loop {
            if stop_requested(shutdown_rx) {
                let _ = self.drain_outbound().and_then(|()| self.stream.flush());
                let _ = self.stream.shutdown(Shutdown::Both);
                return SessionEnd::Stopped;
            }
            if let Err(err) = self.drain_outbound() {
                return SessionEnd::Failed(err);
            }
            if let Some(end) = self.receive() {
                return end;
            }
        }
    }

    fn on_connect(&self) {
        let flags = &self.link.flags;
        if self.config.reset_send_stream_on_connect {
            self.link.outbound.clear();
        }
        if self.config.auto_send_enable {
            flags.set_send_enabled(true);
        }
        flags.set_connected(true);
    }

    fn on_disconnect(&self) {
        let flags = &self.link.flags;
        flags.set_connected(false);
        if self.config.auto_send_enable {
            flags.set_send_enabled(false);
        }
    }
}

/// Delay before reconnecting; past the deadline the window restarts at the cap.
fn retry_delay(backoff: &mut ReconnectBackoff, name: &str) -> Duration {
    backoff.next_delay(Instant::now()).unwrap_or_else(|| {
        warn!("socket log {name}: still unreachable; retrying at the backoff cap");
        backoff.restart_window();
        backoff.cap()
    })
}

/// Connect, pump, reconnect; returns when a stop is requested.
pub(super) fn pump_loop(config: SocketLogConfig, link: PumpLink, shutdown_rx: Receiver<()>) {
    let mut backoff = ReconnectBackoff::new(config.backoff.clone());
    let warner = RateLimitedWarner::default();
    let name = config.name.as_str();
    loop {
        if stop_requested(&shutdown_rx) {
            break;
        }
        if config.connect_deny {
            if wait_or_stop(&shutdown_rx, config.poll_interval) {
                break;
            }
            continue;
        }

        let now = Instant::now();
        match transport::connect(&config) {
            Ok(stream) => {
                backoff.record_connected(now);
                let peer = stream
                    .peer_addr()
                    .map_or_else(|_| "unknown peer".to_string(), |addr| addr.to_string());
                info!("socket log {name}: connected to {peer}");

                let mut session = Session::new(stream, &config, &link);
                session.on_connect();
                let end = session.run(&shutdown_rx);
                session.on_disconnect();
                backoff.record_disconnected(Instant::now());

                match end {
                    SessionEnd::Stopped => break,
                    SessionEnd::PeerClosed => info!("socket log {name}: {peer} closed"),
                    SessionEnd::Failed(err) => warn!("socket log {name}: {peer} failed: {err}"),
                }
            }
            Err(err) => {
                warner.record_drop();
                warner.warn_if_due(|count| {
                    warn!(
                        "socket log {name}: connecting to {}:{} failed {count} times; last error: {err}",
                        config.host, config.port
                    );
                });
            }
        }
        if wait_or_stop(&shutdown_rx, retry_delay(&mut backoff, name)) {
            break;
        }
    }
    warner.flush(|count| {
        warn!("socket log {name}: {count} connection attempts failed before shutdown");
    });
}
