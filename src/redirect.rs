//! Redirection controller and the guarded format-and-emit path.
//!
//! [`SocketLog`] owns the exclusivity guard, both byte channels, the deferred
//! echo queue and the failure counters. It moves through an explicit
//! `Uninitialised -> Ready` lifecycle; operations that need the channels fail
//! with [`RedirectError::NotInitialised`] until [`SocketLog::init`] has run.
//!
//! Every emission through the installed sink runs as one critical section:
//! measure, allocate, format, push to the outbound channel, then echo
//! locally. The guard totally orders these sections, so two lines never
//! interleave their bytes in the outbound channel.

use std::fmt;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;

use crate::allocator::{HeapAllocator, LineAllocator};
use crate::channel::{BoundedByteChannel, ByteChannel};
use crate::config::{EchoMode, RedirectConfig, SocketLogConfig};
use crate::console::{Console, NullConsole};
use crate::counters::RedirectCounters;
use crate::deferred::{self, DeferredEcho, DeferredState};
use crate::echo::EchoWriter;
use crate::error::{DeferredError, RedirectError};
use crate::link::LinkFlags;
use crate::rate_limited_warner::RateLimitedWarner;
use crate::serializer::{DeferredMessage, LINE_FINISHER, LogLine, measure};
use crate::sink::{LogSink, SinkSlot, global_slot};

/// State shared by the controller and every sink it installs.
struct Core {
    guard: Mutex<()>,
    outbound: Arc<dyn ByteChannel>,
    inbound: Arc<dyn ByteChannel>,
    link: Arc<LinkFlags>,
    console: Arc<dyn Console>,
    echo: EchoWriter,
    allocator: Arc<dyn LineAllocator>,
    counters: Arc<RedirectCounters>,
    echo_mode: EchoMode,
    deferred: Mutex<Option<DeferredEcho>>,
    deferred_message_capacity: usize,
    deferred_queue_capacity: usize,
    send_report_interval: u64,
    warner: RateLimitedWarner,
}

impl Core {
    fn send(&self, data: &[u8]) -> usize {
        if !self.link.accepts_outbound() {
            return 0;
        }
        let sends = self.counters.record_send();
        if self.send_report_interval > 0 && sends % self.send_report_interval == 0 {
            info!("outbound sends: {sends}");
        }
        self.outbound.push(data)
    }

    fn recv(&self, buf: &mut [u8]) -> usize {
        if !self.link.is_connected() {
            return 0;
        }
        self.inbound.pull(buf)
    }

    fn format_and_emit(&self, args: fmt::Arguments<'_>) -> usize {
        if self.console.is_log_disabled() {
            return measure(args);
        }
        let _guard = self.guard.lock();
        let measured = measure(args);
        let finish_line = self.console.needs_line_finish();

        let mut accepted = 0;
        // Allocation failure skips the socket but still echoes.
        if let Some(line) = LogLine::format_measured(&self.allocator, args, measured) {
            if finish_line {
                self.send(LINE_FINISHER);
            }
            accepted = self.send(line.as_bytes());
        }

        match self.echo_mode {
            EchoMode::Off => {}
            EchoMode::Passthrough => {
                self.echo_now(finish_line, args);
            }
            EchoMode::Deferred => {
                // Drops are counted and warned about inside.
                let _ = self.enqueue_for_echo(finish_line, args);
            }
        }
        accepted
    }

    fn echo_to_console(&self, args: fmt::Arguments<'_>) -> usize {
        if self.console.is_log_disabled() {
            return measure(args);
        }
        let _guard = self.guard.lock();
        let finish_line = self.console.needs_line_finish();
        self.echo_now(finish_line, args);
        measure(args)
    }

    fn echo_now(&self, finish_line: bool, args: fmt::Arguments<'_>) -> usize {
        if finish_line {
            self.echo.write_prefixed(LINE_FINISHER, args)
        } else {
            self.echo.write_args(args)
        }
    }

    fn enqueue_for_echo(
        &self,
        finish_line: bool,
        args: fmt::Arguments<'_>,
    ) -> Result<(), DeferredError> {
        let Some(tx) = self.deferred.lock().as_ref().map(DeferredEcho::sender) else {
            self.report_dropped_echo(DeferredError::QueueMissing);
            return Err(DeferredError::QueueMissing);
        };
        let Some(message) = DeferredMessage::format(
            &self.allocator,
            self.deferred_message_capacity,
            finish_line,
            args,
        ) else {
            self.counters.record_alloc_failure();
            return Err(DeferredError::AllocationFailed);
        };
        deferred::enqueue(&tx, message).inspect_err(|&err| {
            self.counters.record_enqueue_failure();
            self.report_dropped_echo(err);
        })
    }

    fn report_dropped_echo(&self, cause: DeferredError) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("deferred echo dropped {count} messages; last cause: {cause}");
        });
    }
}

/// Sink routing every log line through the socket channel.
struct SocketSink {
    core: Arc<Core>,
}

impl LogSink for SocketSink {
    fn emit(&self, args: fmt::Arguments<'_>) -> usize {
        self.core.format_and_emit(args)
    }

    fn name(&self) -> &'static str {
        "socket"
    }
}

/// Sink echoing to the local console under the guard, without the socket.
struct ConsoleSink {
    core: Arc<Core>,
}

impl LogSink for ConsoleSink {
    fn emit(&self, args: fmt::Arguments<'_>) -> usize {
        self.core.echo_to_console(args)
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

struct Ready {
    core: Arc<Core>,
    installed: Option<Arc<dyn LogSink>>,
}

enum Lifecycle {
    Uninitialised,
    Ready(Ready),
}

/// Redirection controller for one log socket.
pub struct SocketLog {
    config: RedirectConfig,
    link: Arc<LinkFlags>,
    console: Arc<dyn Console>,
    echo: EchoWriter,
    allocator: Arc<dyn LineAllocator>,
    slot: Arc<SinkSlot>,
    counters: Arc<RedirectCounters>,
    state: Mutex<Lifecycle>,
}

impl SocketLog {
    /// Create an uninitialised context using the process-wide sink slot.
    pub fn new(config: RedirectConfig) -> Self {
        SocketLogBuilder::new(config).build()
    }

    pub fn builder(config: RedirectConfig) -> SocketLogBuilder {
        SocketLogBuilder::new(config)
    }

    /// Create the guard and both channels. Safe to call repeatedly.
    ///
    /// On an initialised context nothing is recreated; the guard is taken and
    /// released once so the call cannot overlap an in-flight emission.
    pub fn init(&self) {
        let mut state = self.state.lock();
        match &*state {
            Lifecycle::Ready(ready) => {
                drop(ready.core.guard.lock());
            }
            Lifecycle::Uninitialised => {
                *state = Lifecycle::Ready(Ready {
                    core: Arc::new(self.build_core()),
                    installed: None,
                });
            }
        }
    }

    fn build_core(&self) -> Core {
        Core {
            guard: Mutex::new(()),
            outbound: Arc::new(BoundedByteChannel::new(
                "log_sock_send",
                self.config.send_capacity,
            )),
            inbound: Arc::new(BoundedByteChannel::new(
                "log_sock_recv",
                self.config.recv_capacity,
            )),
            link: Arc::clone(&self.link),
            console: Arc::clone(&self.console),
            echo: self.echo.clone(),
            allocator: Arc::clone(&self.allocator),
            counters: Arc::clone(&self.counters),
            echo_mode: self.config.echo_mode,
            deferred: Mutex::new(None),
            deferred_message_capacity: self.config.deferred_message_capacity,
            deferred_queue_capacity: self.config.deferred_queue_capacity,
            send_report_interval: self.config.send_report_interval,
            warner: RateLimitedWarner::new(self.config.warn_interval),
        }
    }

    fn core(&self) -> Result<Arc<Core>, RedirectError> {
        match &*self.state.lock() {
            Lifecycle::Ready(ready) => Ok(Arc::clone(&ready.core)),
            Lifecycle::Uninitialised => Err(RedirectError::NotInitialised),
        }
    }

    fn install(&self, sink: Arc<dyn LogSink>) -> Result<(), RedirectError> {
        let mut state = self.state.lock();
        let Lifecycle::Ready(ready) = &mut *state else {
            return Err(RedirectError::NotInitialised);
        };
        self.slot.install(Arc::clone(&sink));
        ready.installed = Some(sink);
        Ok(())
    }

    /// Install the socket sink as the active log sink.
    ///
    /// In deferred echo mode the queue is created first, so the sink never
    /// observes a missing queue. Calling this again reuses the existing queue.
    pub fn redirect_start(&self) -> Result<(), RedirectError> {
        let core = self.core()?;
        if core.echo_mode == EchoMode::Deferred {
            let mut deferred = core.deferred.lock();
            if deferred.is_none() {
                *deferred = Some(DeferredEcho::new(core.deferred_queue_capacity));
            }
        }
        self.install(Arc::new(SocketSink { core }))
    }

    /// Install a sink that echoes to the local console only, under the guard.
    pub fn redirect_console(&self) -> Result<(), RedirectError> {
        self.init();
        let core = self.core()?;
        self.install(Arc::new(ConsoleSink { core }))
    }

    /// Restore the baseline passthrough sink.
    ///
    /// The guard, channels and deferred queue stay allocated so a later
    /// [`redirect_start`](Self::redirect_start) is cheap.
    pub fn redirect_stop(&self) {
        self.slot.restore_baseline();
        if let Lifecycle::Ready(ready) = &mut *self.state.lock() {
            ready.installed = None;
        }
    }

    /// Start the deferred echo task. A no-op when it is already running.
    pub fn non_blocking_task_start(&self) -> Result<(), RedirectError> {
        let core = self.core()?;
        if core.echo_mode != EchoMode::Deferred {
            return Err(RedirectError::DeferredDisabled);
        }
        let mut deferred = core.deferred.lock();
        let Some(deferred) = deferred.as_mut() else {
            return Err(RedirectError::QueueMissing);
        };
        deferred.start(self.echo.clone())?;
        self.counters.engage();
        Ok(())
    }

    /// Stop the deferred echo task after it drains what is already queued.
    pub fn non_blocking_task_stop(&self) {
        let Ok(core) = self.core() else {
            return;
        };
        let mut deferred = core.deferred.lock();
        if let Some(deferred) = deferred.as_mut() {
            deferred.stop();
        }
    }

    pub fn deferred_state(&self) -> DeferredState {
        let Ok(core) = self.core() else {
            return DeferredState::Uninitialised;
        };
        let deferred = core.deferred.lock();
        deferred
            .as_ref()
            .map_or(DeferredState::Uninitialised, DeferredEcho::state)
    }

    /// Stop the deferred task, uninstall this context's sink and return to
    /// the uninitialised state.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        let Lifecycle::Ready(ready) = std::mem::replace(&mut *state, Lifecycle::Uninitialised)
        else {
            return;
        };
        if let Some(sink) = ready.installed
            && self.slot.is_active(&sink)
        {
            self.slot.restore_baseline();
        }
        if let Some(mut deferred) = ready.core.deferred.lock().take() {
            deferred.stop();
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.lock(), Lifecycle::Ready(_))
    }

    /// Run the format-and-emit critical section directly, bypassing the slot.
    ///
    /// Returns the number of line bytes the outbound channel accepted.
    pub fn emit(&self, args: fmt::Arguments<'_>) -> Result<usize, RedirectError> {
        Ok(self.core()?.format_and_emit(args))
    }

    /// Format `args` into a capped message and queue it for deferred echo.
    pub fn enqueue_for_echo(&self, args: fmt::Arguments<'_>) -> Result<(), DeferredError> {
        let core = self.core().map_err(|_| DeferredError::QueueMissing)?;
        let _guard = core.guard.lock();
        let finish_line = core.console.needs_line_finish();
        core.enqueue_for_echo(finish_line, args)
    }

    /// Push `data` to the outbound channel when sending or filling is enabled.
    ///
    /// Returns the channel's accepted count unchanged, or `0` when both flags
    /// are off.
    pub fn send(&self, data: &[u8]) -> Result<usize, RedirectError> {
        Ok(self.core()?.send(data))
    }

    /// Pull received bytes into `buf` while a peer is connected.
    ///
    /// Returns `0` without blocking when disconnected or nothing is buffered.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, RedirectError> {
        Ok(self.core()?.recv(buf))
    }

    /// Outbound channel, drained by the socket driver.
    pub fn outbound(&self) -> Result<Arc<dyn ByteChannel>, RedirectError> {
        Ok(Arc::clone(&self.core()?.outbound))
    }

    /// Inbound channel, filled by the socket driver.
    pub fn inbound(&self) -> Result<Arc<dyn ByteChannel>, RedirectError> {
        Ok(Arc::clone(&self.core()?.inbound))
    }

    pub fn link(&self) -> Arc<LinkFlags> {
        Arc::clone(&self.link)
    }

    pub fn sink_slot(&self) -> Arc<SinkSlot> {
        Arc::clone(&self.slot)
    }

    pub fn config(&self) -> &RedirectConfig {
        &self.config
    }

    /// Deferred-path allocation failures; `-1` until the deferred task starts.
    pub fn alloc_failures(&self) -> i64 {
        self.counters.alloc_failures()
    }

    /// Deferred-path enqueue failures; `-1` until the deferred task starts.
    pub fn enqueue_failures(&self) -> i64 {
        self.counters.enqueue_failures()
    }

    pub fn send_count(&self) -> u64 {
        self.counters.sends()
    }

    pub fn counters(&self) -> &RedirectCounters {
        &self.counters
    }
}

impl Drop for SocketLog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for SocketLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketLog")
            .field("echo_mode", &self.config.echo_mode)
            .field("ready", &self.is_ready())
            .field("deferred", &self.deferred_state())
            .finish()
    }
}

/// Builder wiring a [`SocketLog`] to its collaborators.
pub struct SocketLogBuilder {
    config: RedirectConfig,
    link: Option<Arc<LinkFlags>>,
    console: Arc<dyn Console>,
    echo: EchoWriter,
    allocator: Arc<dyn LineAllocator>,
    slot: Option<Arc<SinkSlot>>,
}

impl SocketLogBuilder {
    pub fn new(config: RedirectConfig) -> Self {
        Self {
            config,
            link: None,
            console: Arc::new(NullConsole),
            echo: EchoWriter::stdout(),
            allocator: Arc::new(HeapAllocator),
            slot: None,
        }
    }

    /// Share link flags with a socket driver.
    pub fn with_link(mut self, link: Arc<LinkFlags>) -> Self {
        self.link = Some(link);
        self
    }

    /// Seed fresh link flags from a socket configuration.
    pub fn with_socket_config(mut self, config: &SocketLogConfig) -> Self {
        self.link = Some(Arc::new(LinkFlags::from_config(config)));
        self
    }

    pub fn with_console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = console;
        self
    }

    pub fn with_echo(mut self, echo: EchoWriter) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn LineAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Install sinks into `slot` instead of the process-wide slot.
    pub fn with_sink_slot(mut self, slot: Arc<SinkSlot>) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn build(self) -> SocketLog {
        let link = self
            .link
            .unwrap_or_else(|| Arc::new(LinkFlags::from_config(&SocketLogConfig::default())));
        SocketLog {
            config: self.config,
            link,
            console: self.console,
            echo: self.echo,
            allocator: self.allocator,
            slot: self.slot.unwrap_or_else(global_slot),
            counters: Arc::new(RedirectCounters::default()),
            state: Mutex::new(Lifecycle::Uninitialised),
        }
    }
}
