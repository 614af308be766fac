use std::sync::{Arc, OnceLock};

/// Receives log records emitted by the SDK.
///
/// Implement this on the host side and install it with [`set_logger`] to
/// route SDK logs into the app's logging pipeline.
///
/// ```rust
/// use paymentkit_core::logger::{LogLevel, Logger};
///
/// struct PrintLogger;
///
/// impl Logger for PrintLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         println!("[{level:?}] {message}");
///     }
/// }
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log record.
#[derive(Debug, Clone, uniffi::Enum)]
pub enum LogLevel {
    /// Extremely detailed tracing output.
    Trace,
    /// Lower-priority debugging information.
    Debug,
    /// Progress of normal operation.
    Info,
    /// Potentially harmful situations.
    Warn,
    /// Errors that may still allow the SDK to continue.
    Error,
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

/// Forwards records from the `log` crate to the host-provided [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        // Debug/trace records from other crates in the host process are not
        // this SDK's to forward.
        let from_sdk = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("paymentkit"));
        let is_debug_or_trace =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;
        if is_debug_or_trace && !from_sdk {
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

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs the host-provided logger and initializes the logging system.
/// Call at most once, before any SDK operation that should be logged.
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
