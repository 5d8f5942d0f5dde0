//! Fixtures building a [`SocketLog`] wired to in-memory collaborators.
//!
//! Every harness gets its own [`SinkSlot`], so tests never touch the
//! process-wide slot and can run in parallel.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use rstest::fixture;
use socket_log::{
    ByteChannel, EchoWriter, RedirectConfig, SinkSlot, SocketLog, SocketLogBuilder,
};

use super::shared_buffer::SharedBuf;

/// A context plus the buffers standing in for the console.
pub struct Harness {
    pub log: SocketLog,
    pub slot: Arc<SinkSlot>,
    /// Local echo output of the redirected sink.
    pub echo: SharedBuf,
    /// Output of the slot's baseline passthrough.
    pub baseline: SharedBuf,
}

/// Build a harness, letting `customise` adjust the builder.
pub fn harness_with(
    config: RedirectConfig,
    customise: impl FnOnce(SocketLogBuilder) -> SocketLogBuilder,
) -> Harness {
    let echo = SharedBuf::default();
    let baseline = SharedBuf::default();
    let slot = Arc::new(SinkSlot::with_echo(EchoWriter::new(baseline.clone())));
    let builder = SocketLog::builder(config)
        .with_echo(EchoWriter::new(echo.clone()))
        .with_sink_slot(Arc::clone(&slot));
    Harness {
        log: customise(builder).build(),
        slot,
        echo,
        baseline,
    }
}

/// Initialised passthrough-echo harness with default capacities.
#[fixture]
pub fn harness(#[default(RedirectConfig::default())] config: RedirectConfig) -> Harness {
    let harness = harness_with(config, |builder| builder);
    harness.log.init();
    harness
}

/// Pull everything currently buffered in `channel`.
pub fn drain(channel: &dyn ByteChannel) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 64];
    loop {
        let n = channel.pull(&mut chunk);
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&chunk[..n]);
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
