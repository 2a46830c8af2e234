//! Host-provided logger bridge for `ConsentKit` log messages.

use std::sync::{Arc, OnceLock};

/// Trait representing a logger that receives `ConsentKit` log messages.
///
/// It is exported via `UniFFI` so host applications can route gate warnings
/// (unsupported CMP, timeouts, cancelled auctions) into their own logging.
///
/// # Examples
///
/// ```rust
/// use consentkit_core::logger::{Logger, LogLevel};
///
/// struct StdoutLogger;
///
/// impl Logger for StdoutLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         println!("[{:?}] {}", level, message);
///     }
/// }
/// ```
///
/// ## Swift
///
/// ```swift
/// class ConsentKitLoggerBridge: ConsentKit.Logger {
///     static let shared = ConsentKitLoggerBridge()
///
///     func log(level: ConsentKit.LogLevel, message: String) {
///         Log.log(level.toCoreLevel(), message)
///     }
/// }
///
/// ConsentKit.setLogger(logger: ConsentKitLoggerBridge.shared) // once per process
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very low priority, extremely detailed messages.
    Trace,
    /// Debugging information such as late CMP responses.
    Debug,
    /// Configuration defaults and other progress notes.
    Info,
    /// Recoverable problems; the auction continues.
    Warn,
    /// Failures that cancel an auction.
    Error,
}

/// Bridges the `log` facade to the host-provided [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Debug and trace output from dependencies is dropped; everything from
/// `consentkit` crates is forwarded.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    let is_verbose = matches!(level, log::Level::Debug | log::Level::Trace);
    let is_ours = module_path.is_some_and(|path| path.starts_with("consentkit"));
    !is_verbose || is_ours
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Sets the global logger.
///
/// Only the first call installs a logger; later calls are reported and ignored.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_debug_is_filtered() {
        assert!(!should_forward(log::Level::Debug, Some("tokio::runtime")));
        assert!(!should_forward(log::Level::Trace, None));
        assert!(should_forward(log::Level::Warn, Some("tokio::runtime")));
    }

    #[test]
    fn test_own_debug_is_forwarded() {
        assert!(should_forward(
            log::Level::Debug,
            Some("consentkit_core::gate")
        ));
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(log_level(log::Level::Warn), LogLevel::Warn);
        assert_eq!(log_level(log::Level::Error), LogLevel::Error);
    }
}
