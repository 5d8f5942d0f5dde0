//! INI loader for [`SocketLogConfig`] and [`RedirectConfig`].
//!
//! Recognised sections are `[socket_log]` and `[redirect]`; unknown keys are
//! rejected so typos surface at startup instead of silently keeping defaults.
//!
//! ```ini
//! [socket_log]
//! host = 192.168.4.2
//! port = 3334
//! auto_send_enable = true
//!
//! [redirect]
//! echo = deferred
//! send_capacity = 4096
//! ```

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::{RedirectConfig, RedirectConfigBuilder, SocketLogConfig};
use crate::error::ConfigError;

/// Read and parse the configuration file at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<(SocketLogConfig, RedirectConfig), ConfigError> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::Io(io::Error::new(
                ErrorKind::NotFound,
                format!("{} doesn't exist", path.display()),
            )));
        }
        Err(err) => return Err(err.into()),
    };
    if text.trim().is_empty() {
        return Err(ConfigError::Parse(format!(
            "{} is an empty file",
            path.display()
        )));
    }
    parse_config(&text)
}

/// Parse configuration from INI text. Missing sections keep their defaults.
pub fn parse_config(text: &str) -> Result<(SocketLogConfig, RedirectConfig), ConfigError> {
    let ini = Ini::load_from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
    let socket = match ini.section(Some("socket_log")) {
        Some(props) => parse_socket_section(props)?,
        None => SocketLogConfig::default(),
    };
    let redirect = match ini.section(Some("redirect")) {
        Some(props) => parse_redirect_section(props)?,
        None => RedirectConfig::default(),
    };
    socket.validate()?;
    Ok((socket, redirect))
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidConfig(format!("{key}: invalid value {value:?}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidConfig(format!(
            "{key}: expected a boolean, got {value:?}"
        ))),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_value::<u64>(key, value).map(Duration::from_millis)
}

fn parse_socket_section(props: &Properties) -> Result<SocketLogConfig, ConfigError> {
    let mut config = SocketLogConfig::default();
    for (key, value) in props.iter() {
        match key {
            "name" => config.name = value.trim().to_string(),
            "host" => config.host = value.trim().to_string(),
            "port" => config.port = parse_value(key, value)?,
            "address_family" => config.address_family = value.parse()?,
            "send_enable" => config.send_enable = parse_bool(key, value)?,
            "fill_enable" => config.fill_enable = parse_bool(key, value)?,
            "auto_send_enable" => config.auto_send_enable = parse_bool(key, value)?,
            "reset_send_stream_on_connect" => {
                config.reset_send_stream_on_connect = parse_bool(key, value)?;
            }
            "line_ending_fix_crlf_to_cr" => {
                config.line_ending_fix_crlf_to_cr = parse_bool(key, value)?;
            }
            "connect_deny" => config.connect_deny = parse_bool(key, value)?,
            "connect_timeout_ms" => config.connect_timeout = parse_millis(key, value)?,
            "poll_interval_ms" => config.poll_interval = parse_millis(key, value)?,
            "backoff_base_ms" => config.backoff.base = parse_millis(key, value)?,
            "backoff_cap_ms" => config.backoff.cap = parse_millis(key, value)?,
            "backoff_reset_after_ms" => config.backoff.reset_after = parse_millis(key, value)?,
            "backoff_deadline_ms" => config.backoff.deadline = parse_millis(key, value)?,
            other => {
                return Err(ConfigError::InvalidConfig(format!(
                    "unknown key {other:?} in [socket_log]"
                )));
            }
        }
    }
    Ok(config)
}

fn parse_redirect_section(props: &Properties) -> Result<RedirectConfig, ConfigError> {
    let mut builder = RedirectConfigBuilder::new();
    for (key, value) in props.iter() {
        builder = match key {
            "send_capacity" => builder.with_send_capacity(parse_value(key, value)?),
            "recv_capacity" => builder.with_recv_capacity(parse_value(key, value)?),
            "echo" => builder.with_echo_mode(value.parse()?),
            "deferred_queue_capacity" => {
                builder.with_deferred_queue_capacity(parse_value(key, value)?)
            }
            "deferred_message_capacity" => {
                builder.with_deferred_message_capacity(parse_value(key, value)?)
            }
            "send_report_interval" => builder.with_send_report_interval(parse_value(key, value)?),
            "warn_interval_ms" => builder.with_warn_interval_ms(parse_value(key, value)?),
            other => {
                return Err(ConfigError::InvalidConfig(format!(
                    "unknown key {other:?} in [redirect]"
                )));
            }
        };
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AddressFamily, EchoMode};
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[rstest]
    fn parses_both_sections() {
        let text = r#"
[socket_log]
host = 10.0.0.7
port = 4000
address_family = inet6
auto_send_enable = yes
line_ending_fix_crlf_to_cr = 1
backoff_base_ms = 50

[redirect]
echo = deferred
send_capacity = 4096
deferred_queue_capacity = 8
"#;
        let (socket, redirect) = parse_config(text).expect("valid config");
        assert_eq!(socket.host, "10.0.0.7");
        assert_eq!(socket.port, 4000);
        assert_eq!(socket.address_family, AddressFamily::Inet6);
        assert!(socket.auto_send_enable);
        assert!(socket.line_ending_fix_crlf_to_cr);
        assert_eq!(socket.backoff.base, Duration::from_millis(50));
        assert_eq!(redirect.echo_mode, EchoMode::Deferred);
        assert_eq!(redirect.send_capacity, 4096);
        assert_eq!(redirect.deferred_queue_capacity, 8);
    }

    #[rstest]
    fn missing_sections_keep_defaults() {
        let (socket, redirect) = parse_config("[other]\nkey = value\n").expect("valid config");
        assert_eq!(socket, SocketLogConfig::default());
        assert_eq!(redirect, RedirectConfig::default());
    }

    #[rstest]
    #[case("[socket_log]\nprot = 1\n", "prot")]
    #[case("[socket_log]\nsend_enable = maybe\n", "send_enable")]
    #[case("[redirect]\nsend_capacity = 0\n", "send_capacity")]
    #[case("[redirect]\necho = loud\n", "loud")]
    fn rejects_invalid_entries(#[case] text: &str, #[case] needle: &str) {
        let err = parse_config(text).expect_err("invalid entry must fail");
        assert!(
            matches!(&err, ConfigError::InvalidConfig(msg) if msg.contains(needle)),
            "unexpected error: {err}"
        );
    }

    #[rstest]
    fn load_config_reads_from_disk() {
        let mut file = NamedTempFile::new().expect("create temp ini file");
        writeln!(file, "[redirect]\necho = off\n").expect("write ini contents");
        let (_, redirect) = load_config(file.path()).expect("should parse");
        assert_eq!(redirect.echo_mode, EchoMode::Off);
    }

    #[rstest]
    fn load_config_rejects_empty_file() {
        let file = NamedTempFile::new().expect("create temp ini file");
        let err = load_config(file.path()).expect_err("empty files must fail");
        assert!(matches!(err, ConfigError::Parse(msg) if msg.contains("empty")));
    }

    #[rstest]
    fn load_config_reports_missing_file() {
        let err = load_config("/nonexistent/socket_log.ini").expect_err("missing file");
        assert!(matches!(err, ConfigError::Io(e) if e.kind() == ErrorKind::NotFound));
    }
}
