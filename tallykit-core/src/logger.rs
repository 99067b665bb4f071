use std::sync::{Arc, OnceLock};

/// Receives log records emitted by the pipeline.
///
/// Implemented by the host and exported via `UniFFI`, so records from queueing, delivery
/// and identity resolution end up in the host's own logging system.
///
/// # Examples
///
/// ```rust
/// use tallykit_core::logger::{LogLevel, Logger};
///
/// struct StdoutLogger;
///
/// impl Logger for StdoutLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         println!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Swift
///
/// ```swift
/// final class TallyKitLogBridge: TallyKit.Logger {
///     func log(level: TallyKit.LogLevel, message: String) {
///         os_log("%{public}@", message)
///     }
/// }
///
/// TallyKit.setLogger(logger: TallyKitLogBridge()) // once per process
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    ///
    /// # Arguments
    ///
    /// * `level` - The severity level of the log message.
    /// * `message` - The log message to be recorded.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing, such as each delivery attempt.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of the pipeline (launch classification, flush results).
    Info,
    /// Recoverable problems: dropped events, persistence failures, identity conflicts.
    Warn,
    /// Failures the pipeline cannot recover from on its own.
    Error,
}

/// Forwards `log` records to the host-provided [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let is_record_from_tallykit = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("tallykit"));

        let is_debug_or_trace_level =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;

        // Dependencies (reqwest, hyper, rustls) are chatty below info.
        if is_debug_or_trace_level && !is_record_from_tallykit {
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

/// Sets the global logger that receives every record emitted by the SDK.
///
/// Only the first call has an effect; later calls print a notice and keep the existing
/// logger. Rust hosts that already install a `log` implementation (for example through
/// `tracing-log`) do not need to call this.
///
/// # Arguments
///
/// * `logger` - An `Arc` containing the host's logger implementation.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        println!("Logger already set");
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
