//! Diagnostics the crate reports through the `log` facade.

mod test_utils;

use logtest::Logger;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use rstest::{fixture, rstest};
use serial_test::serial;
use socket_log::{EchoMode, EchoWriter, RedirectConfig};
use test_utils::{GatedBuf, harness_with};

/// `Logger::start` installs the global logger, which succeeds once per process.
static LOGGER: Lazy<Mutex<Logger>> = Lazy::new(|| Mutex::new(Logger::start()));

#[fixture]
fn logger() -> MutexGuard<'static, Logger> {
    let mut logger = LOGGER.lock();
    while logger.pop().is_some() {}
    logger
}

fn take_matching(logger: &mut Logger, needle: &str) -> Vec<logtest::Record> {
    let mut matching = Vec::new();
    while let Some(record) = logger.pop() {
        if record.args().contains(needle) {
            matching.push(record);
        }
    }
    matching
}

#[rstest]
#[serial]
fn send_totals_are_reported_periodically(mut logger: MutexGuard<'static, Logger>) {
    let config = RedirectConfig::builder()
        .with_send_report_interval(2)
        .build()
        .expect("valid config");
    let harness = harness_with(config, |builder| builder);
    harness.log.init();

    for _ in 0..5 {
        harness.log.send(b"x").expect("send");
    }

    let reports = take_matching(&mut logger, "outbound sends:");
    let messages: Vec<&str> = reports.iter().map(|r| r.args()).collect();
    assert_eq!(messages, ["outbound sends: 2", "outbound sends: 4"]);
    assert!(reports.iter().all(|r| r.level() == log::Level::Info));
    assert!(reports.iter().all(|r| r.target() == "socket_log::redirect"));
}

#[rstest]
#[serial]
fn queue_overflow_warns_once_per_interval(mut logger: MutexGuard<'static, Logger>) {
    let gated = GatedBuf::default();
    let config = RedirectConfig::builder()
        .with_echo_mode(EchoMode::Deferred)
        .with_deferred_queue_capacity(1)
        .build()
        .expect("valid config");
    let harness = harness_with(config, |builder| {
        builder.with_echo(EchoWriter::new(gated.clone()))
    });
    harness.log.init();
    harness.log.redirect_start().expect("redirect");
    harness.log.non_blocking_task_start().expect("start");

    for i in 0..6 {
        harness.slot.emit(format_args!("line {i}"));
    }
    gated.gate.open();
    harness.log.non_blocking_task_stop();

    assert!(harness.log.enqueue_failures() >= 4);
    let warnings = take_matching(&mut logger, "deferred echo dropped");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].level(), log::Level::Warn);
}

#[rstest]
#[serial]
fn echo_without_queue_is_reported(mut logger: MutexGuard<'static, Logger>) {
    let config = RedirectConfig::builder()
        .with_echo_mode(EchoMode::Deferred)
        .build()
        .expect("valid config");
    let harness = harness_with(config, |builder| builder);
    harness.log.init();

    // No redirect_start, so the deferred queue does not exist yet.
    assert_eq!(harness.log.emit(format_args!("lost echo")).expect("emit"), 9);

    let warnings = take_matching(&mut logger, "deferred echo dropped");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].args().contains("has not been created"));
    assert!(harness.echo.contents().is_empty());
}
