//! Routes the crate's `log` records to the host application.
//!
//! Session events arrive on SDK delivery threads, so the host needs the
//! session's own trace of what it dropped, resolved or timed out. Install a
//! [`Logger`] once with [`set_logger`]:
//!
//! ```swift
//! final class SessionLog: Logger {
//!     func log(level: LogLevel, message: String) {
//!         os_log("%{public}@", log: .sessionkit, type: level.osLogType, message)
//!     }
//! }
//!
//! setLogger(logger: SessionLog())
//! ```

use std::sync::{Arc, OnceLock};

/// Receives the session's log lines.
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Called once per record that passes the level filter.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, uniffi::Enum)]
pub enum LogLevel {
    /// Per-event dispatch detail.
    Trace,
    /// State transitions and tracker bookkeeping.
    Debug,
    /// Flow milestones: connected, request resolved, credentials stored.
    Info,
    /// Dropped events and failed preference writes.
    Warn,
    /// Failures surfaced to the caller.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Self::Trace,
            log::Level::Debug => Self::Debug,
            log::Level::Info => Self::Info,
            log::Level::Warn => Self::Warn,
            log::Level::Error => Self::Error,
        }
    }
}

static HOST_LOGGER: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// `log` backend that hands records to [`HOST_LOGGER`].
struct HostBridge;

static BRIDGE: HostBridge = HostBridge;

impl log::Log for HostBridge {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        is_forwarded(metadata.level(), metadata.target())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        match HOST_LOGGER.get() {
            Some(host) => host.log(record.level().into(), message),
            None => eprintln!("[sessionkit {}] {message}", record.level()),
        }
    }

    fn flush(&self) {}
}

/// Below `Info`, only records emitted by `sessionkit` crates are forwarded.
fn is_forwarded(level: log::Level, target: &str) -> bool {
    level <= log::Level::Info || target.starts_with("sessionkit")
}

/// Installs `logger` as the destination of every session log record.
///
/// Only the first logger is kept; later calls are ignored with a notice on
/// stderr. If another `log` backend is already installed, records keep going
/// there instead.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if HOST_LOGGER.set(logger).is_err() {
        eprintln!("sessionkit: logger already installed, keeping the first one");
        return;
    }
    match log::set_logger(&BRIDGE) {
        Ok(()) => log::set_max_level(log::LevelFilter::Trace),
        Err(e) => eprintln!("sessionkit: cannot install log bridge: {e}"),
    }
}
