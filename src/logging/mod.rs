//! Logging infrastructure - structured tracing for native calls
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels per module
//! - Zero-cost when disabled
//! - Optional JSON output and file output

use once_cell::sync::OnceCell;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub use tracing::{debug, error, info, trace, warn, Level};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // FIDDLE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("FIDDLE_LOG_LEVEL") {
            config.level = match level_str.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            };
        }

        // FIDDLE_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("FIDDLE_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("FIDDLE_LOG_JSON").is_ok();
        config.show_spans = std::env::var("FIDDLE_LOG_SPANS").is_ok();

        config
    }

    /// Verbose logging of every call
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            show_spans: true,
            ..Self::default()
        }
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call has an effect. If the host already installed a
/// global subscriber, that one is kept.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("fiddle={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let (plain, json) = if config.json_format {
            let layer = fmt::layer()
                .json()
                .with_writer(io::stdout)
                .with_span_events(span_events.clone());
            (None, Some(layer))
        } else {
            let layer = fmt::layer()
                .with_writer(io::stdout)
                .with_span_events(span_events.clone())
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions));
            (Some(layer), None)
        };

        let file = config
            .log_path
            .as_deref()
            .filter(|_| config.file_output)
            .map(|path| {
                let path = Path::new(path);
                let dir = path
                    .parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let name = path.file_name().unwrap_or_else(|| OsStr::new("fiddle.log"));
                fmt::layer()
                    .with_ansi(false)
                    .with_span_events(span_events)
                    .with_writer(tracing_appender::rolling::never(dir, name))
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(plain)
            .with(json)
            .with(file)
            .try_init()
            .ok(); // Ignore error if the host installed its own subscriber
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Call-path events
// ============================================================================

/// Log a native function call
#[inline]
pub fn log_call(function: &str, arg_count: usize, frame_bytes: usize) {
    trace!(
        event = "native_call",
        function,
        args = arg_count,
        frame_bytes,
        "calling native function"
    );
}

/// Log a native function return
#[inline]
pub fn log_return(function: &str, last_error: i32) {
    trace!(
        event = "native_return",
        function,
        last_error,
        "native function returned"
    );
}

/// Log an invocation rejected before the native call
pub fn log_rejected(function: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "call_rejected",
        function,
        error = %error,
        "native call rejected"
    );
}
