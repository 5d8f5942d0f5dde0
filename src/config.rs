//! Configuration consumed by the redirection controller and the socket driver.
//!
//! [`RedirectConfig`] sizes the channels and selects the local echo mode.
//! [`SocketLogConfig`] describes the remote endpoint and the link flags the
//! socket driver starts from. Both can be built in code or loaded from an INI
//! file via [`load_config`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

mod file;

pub use file::{load_config, parse_config};

/// Default outbound (device to remote) channel capacity in bytes.
pub const DEFAULT_SEND_CAPACITY: usize = 2 * 1024;
/// Default inbound (remote to device) channel capacity in bytes.
pub const DEFAULT_RECV_CAPACITY: usize = 256;
/// Default number of messages the deferred echo queue holds.
pub const DEFAULT_DEFERRED_QUEUE_CAPACITY: usize = 30;
/// Default size of a deferred echo message; longer output is truncated.
pub const DEFAULT_DEFERRED_MESSAGE_CAPACITY: usize = 256;
/// Default number of sends between "outbound sends" reports.
pub const DEFAULT_SEND_REPORT_INTERVAL: u64 = 1000;
/// Default TCP port of the remote log consumer.
pub const DEFAULT_PORT: u16 = 3334;
/// Default connection timeout applied by the socket driver.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default interval at which the socket driver polls both channels.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Default base delay for exponential backoff retries.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Default maximum delay for exponential backoff retries.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(10);
/// Default duration of a healthy connection that resets backoff state.
pub const DEFAULT_BACKOFF_RESET: Duration = Duration::from_secs(30);
/// Default window after which a failing connection restarts its backoff.
pub const DEFAULT_BACKOFF_DEADLINE: Duration = Duration::from_secs(120);

/// How log lines are echoed to the local console while redirected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EchoMode {
    /// Lines go to the socket channel only.
    Off,
    /// Lines are echoed synchronously inside the critical section.
    #[default]
    Passthrough,
    /// Lines are queued for the deferred echo task.
    Deferred,
}

impl fmt::Display for EchoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EchoMode::Off => "off",
            EchoMode::Passthrough => "passthrough",
            EchoMode::Deferred => "deferred",
        };
        f.write_str(s)
    }
}

impl FromStr for EchoMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "passthrough" | "sync" => Ok(Self::Passthrough),
            "deferred" | "non_blocking" => Ok(Self::Deferred),
            other => Err(ConfigError::InvalidConfig(format!(
                "unknown echo mode {other:?}"
            ))),
        }
    }
}

/// Sizing and echo policy for a [`SocketLog`](crate::SocketLog) context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectConfig {
    pub send_capacity: usize,
    pub recv_capacity: usize,
    pub echo_mode: EchoMode,
    pub deferred_queue_capacity: usize,
    pub deferred_message_capacity: usize,
    /// Log an "outbound sends" report every this many sends; `0` disables it.
    pub send_report_interval: u64,
    pub warn_interval: Duration,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            send_capacity: DEFAULT_SEND_CAPACITY,
            recv_capacity: DEFAULT_RECV_CAPACITY,
            echo_mode: EchoMode::default(),
            deferred_queue_capacity: DEFAULT_DEFERRED_QUEUE_CAPACITY,
            deferred_message_capacity: DEFAULT_DEFERRED_MESSAGE_CAPACITY,
            send_report_interval: DEFAULT_SEND_REPORT_INTERVAL,
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}

impl RedirectConfig {
    pub fn builder() -> RedirectConfigBuilder {
        RedirectConfigBuilder::default()
    }
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ConfigError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Validating builder for [`RedirectConfig`].
#[derive(Clone, Debug, Default)]
pub struct RedirectConfigBuilder {
    send_capacity: Option<usize>,
    recv_capacity: Option<usize>,
    echo_mode: Option<EchoMode>,
    deferred_queue_capacity: Option<usize>,
    deferred_message_capacity: Option<usize>,
    send_report_interval: Option<u64>,
    warn_interval_ms: Option<u64>,
}

impl RedirectConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    option_setter!(
        #[doc = "Set the outbound channel capacity in bytes."]
        with_send_capacity,
        send_capacity,
        usize
    );
    option_setter!(
        #[doc = "Set the inbound channel capacity in bytes."]
        with_recv_capacity,
        recv_capacity,
        usize
    );
    option_setter!(with_echo_mode, echo_mode, EchoMode);
    option_setter!(with_deferred_queue_capacity, deferred_queue_capacity, usize);
    option_setter!(
        with_deferred_message_capacity,
        deferred_message_capacity,
        usize
    );
    option_setter!(with_send_report_interval, send_report_interval, u64);
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);

    pub fn build(&self) -> Result<RedirectConfig, ConfigError> {
        let mut config = RedirectConfig::default();
        if let Some(capacity) = self.send_capacity {
            config.send_capacity = ensure_positive!(capacity, "send_capacity")?;
        }
        if let Some(capacity) = self.recv_capacity {
            config.recv_capacity = ensure_positive!(capacity, "recv_capacity")?;
        }
        if let Some(mode) = self.echo_mode {
            config.echo_mode = mode;
        }
        if let Some(capacity) = self.deferred_queue_capacity {
            config.deferred_queue_capacity =
                ensure_positive!(capacity, "deferred_queue_capacity")?;
        }
        if let Some(capacity) = self.deferred_message_capacity {
            config.deferred_message_capacity =
                ensure_positive!(capacity, "deferred_message_capacity")?;
        }
        if let Some(interval) = self.send_report_interval {
            config.send_report_interval = interval;
        }
        if let Some(ms) = self.warn_interval_ms {
            config.warn_interval = Duration::from_millis(ensure_positive!(ms, "warn_interval_ms")?);
        }
        Ok(config)
    }
}

/// Address family accepted when resolving the remote host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressFamily {
    /// Accept IPv4 and IPv6 addresses.
    Unspecified,
    #[default]
    Inet,
    Inet6,
}

impl FromStr for AddressFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "unspec" | "unspecified" => Ok(Self::Unspecified),
            "inet" | "ipv4" => Ok(Self::Inet),
            "inet6" | "ipv6" => Ok(Self::Inet6),
            other => Err(ConfigError::InvalidConfig(format!(
                "unknown address family {other:?}"
            ))),
        }
    }
}

/// Exponential backoff policy for reconnection attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub reset_after: Duration,
    pub deadline: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
            reset_after: DEFAULT_BACKOFF_RESET,
            deadline: DEFAULT_BACKOFF_DEADLINE,
        }
    }
}

/// Transport parameters and initial link flags for the log socket.
///
/// The core reads only the three link flags (through
/// [`LinkFlags`](crate::LinkFlags)); the rest belongs to the socket driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketLogConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub address_family: AddressFamily,
    /// Outbound bytes may be sent to a connected peer.
    pub send_enable: bool,
    /// Outbound bytes are buffered even while nobody is connected.
    pub fill_enable: bool,
    /// Enable sending automatically when a connection is established.
    pub auto_send_enable: bool,
    /// Discard stale outbound bytes when a connection is established.
    pub reset_send_stream_on_connect: bool,
    /// Rewrite `\r\n` to `\r` on the wire.
    pub line_ending_fix_crlf_to_cr: bool,
    /// Refuse to open connections at all.
    pub connect_deny: bool,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for SocketLogConfig {
    fn default() -> Self {
        Self {
            name: "log".into(),
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            address_family: AddressFamily::default(),
            send_enable: false,
            fill_enable: true,
            auto_send_enable: false,
            reset_send_stream_on_connect: false,
            line_ending_fix_crlf_to_cr: false,
            connect_deny: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl SocketLogConfig {
    /// Override the remote endpoint.
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Override the initial send/fill flags.
    pub fn with_link_flags(mut self, send_enable: bool, fill_enable: bool) -> Self {
        self.send_enable = send_enable;
        self.fill_enable = fill_enable;
        self
    }

    pub fn with_auto_send(mut self, enabled: bool) -> Self {
        self.auto_send_enable = enabled;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("host must not be empty".into()));
        }
        ensure_positive!(self.port, "port")?;
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "connect_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.backoff.base.is_zero() || self.backoff.cap < self.backoff.base {
            return Err(ConfigError::InvalidConfig(
                "backoff cap must be at least the non-zero backoff base".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_match_firmware_sizing() {
        let config = RedirectConfig::default();
        assert_eq!(config.send_capacity, 2048);
        assert_eq!(config.recv_capacity, 256);
        assert_eq!(config.deferred_queue_capacity, 30);
        assert_eq!(config.deferred_message_capacity, 256);
        assert_eq!(config.echo_mode, EchoMode::Passthrough);

        let socket = SocketLogConfig::default();
        assert_eq!(socket.port, 3334);
        assert!(!socket.send_enable);
        assert!(socket.fill_enable);
        socket.validate().expect("defaults are valid");
    }

    #[rstest]
    #[case(RedirectConfigBuilder::new().with_send_capacity(0), "send_capacity")]
    #[case(RedirectConfigBuilder::new().with_recv_capacity(0), "recv_capacity")]
    #[case(
        RedirectConfigBuilder::new().with_deferred_queue_capacity(0),
        "deferred_queue_capacity"
    )]
    #[case(
        RedirectConfigBuilder::new().with_deferred_message_capacity(0),
        "deferred_message_capacity"
    )]
    fn builder_rejects_zero_sizes(#[case] builder: RedirectConfigBuilder, #[case] field: &str) {
        let err = builder.build().expect_err("zero size must be rejected");
        assert!(matches!(err, ConfigError::InvalidConfig(msg) if msg.contains(field)));
    }

    #[rstest]
    fn builder_applies_overrides() {
        let config = RedirectConfig::builder()
            .with_send_capacity(3)
            .with_echo_mode(EchoMode::Deferred)
            .with_deferred_queue_capacity(1)
            .build()
            .expect("valid config");
        assert_eq!(config.send_capacity, 3);
        assert_eq!(config.echo_mode, EchoMode::Deferred);
        assert_eq!(config.deferred_queue_capacity, 1);
        assert_eq!(config.recv_capacity, DEFAULT_RECV_CAPACITY);
    }

    #[rstest]
    #[case("off", EchoMode::Off)]
    #[case("Passthrough", EchoMode::Passthrough)]
    #[case("deferred", EchoMode::Deferred)]
    fn echo_mode_parses(#[case] input: &str, #[case] expected: EchoMode) {
        assert_eq!(input.parse::<EchoMode>().expect("valid mode"), expected);
    }

    #[rstest]
    fn socket_config_rejects_empty_host() {
        let config = SocketLogConfig::default().with_endpoint("  ", 1);
        assert!(config.validate().is_err());
    }
}
