//! Redirect a device's diagnostic log stream into bounded socket channels.
//!
//! A [`SocketLog`] context installs a sink that formats every log line into an
//! exact-size buffer and pushes it, under one exclusivity guard, into an
//! outbound [`ByteChannel`] that a socket driver drains to a remote peer. Lines
//! are also echoed locally, either synchronously or through a bounded deferred
//! queue drained by a dedicated task.
//!
//! ```no_run
//! use socket_log::{EchoMode, RedirectConfig, SocketLog};
//!
//! let config = RedirectConfig::builder()
//!     .with_echo_mode(EchoMode::Deferred)
//!     .build()?;
//! let log = SocketLog::new(config);
//! log.init();
//! log.redirect_start()?;
//! log.non_blocking_task_start()?;
//! socket_log::global_slot().emit(format_args!("count={}", 5));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod allocator;
mod channel;
mod config;
mod console;
mod counters;
mod deferred;
pub mod driver;
mod echo;
mod error;
mod link;
#[cfg(feature = "log-compat")]
mod log_compat;
mod rate_limited_warner;
mod redirect;
mod serializer;
mod sink;

pub use allocator::{BudgetAllocator, HeapAllocator, LineAllocator, LineBuffer};
pub use channel::{BoundedByteChannel, ByteChannel};
pub use config::{
    AddressFamily, BackoffPolicy, DEFAULT_DEFERRED_MESSAGE_CAPACITY,
    DEFAULT_DEFERRED_QUEUE_CAPACITY, DEFAULT_RECV_CAPACITY, DEFAULT_SEND_CAPACITY, EchoMode,
    RedirectConfig, RedirectConfigBuilder, SocketLogConfig, load_config, parse_config,
};
pub use console::{Console, ConsoleState, NullConsole};
pub use counters::{NOT_ENGAGED, RedirectCounters};
pub use deferred::DeferredState;
pub use driver::SocketDriver;
pub use echo::EchoWriter;
pub use error::{ConfigError, DeferredError, RedirectError};
pub use link::LinkFlags;
#[cfg(feature = "log-compat")]
pub use log_compat::{SocketLogger, install_global_logger};
pub use rate_limited_warner::{DEFAULT_WARN_INTERVAL, RateLimitedWarner};
pub use redirect::{SocketLog, SocketLogBuilder};
pub use serializer::{DeferredMessage, LINE_FINISHER, LogLine, measure};
pub use sink::{LogSink, Passthrough, SinkSlot, global_slot};
