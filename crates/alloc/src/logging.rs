//! Injectable logging sink for allocator events
//!
//! Every allocator and the tracker hold a [`SharedLogger`]. The default is
//! [`TracingLogger`] when the `logging` feature is enabled and
//! [`NoopLogger`] otherwise; tests inject a [`RecordingLogger`] to assert on
//! what was reported.

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Log level for memory-related events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Trace-level details (very verbose)
    Trace,
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings (non-critical issues)
    Warn,
    /// Errors (critical issues)
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "TRACE"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Memory event that can be logged
#[derive(Debug, Clone)]
pub struct MemoryEvent {
    /// Type of memory event (`"allocate"`, `"double_free"`, ...)
    pub event_type: &'static str,
    /// Source component that generated the event
    pub source: String,
    /// Log level for this event
    pub level: LogLevel,
    /// Message describing the event
    pub message: String,
    /// Additional structured data for the event
    pub data: Vec<(&'static str, String)>,
    /// Timestamp when the event occurred (milliseconds since epoch)
    pub timestamp: i64,
}

impl MemoryEvent {
    /// Create a new memory event
    pub fn new(
        event_type: &'static str,
        source: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            source: source.into(),
            level,
            message: message.into(),
            data: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add structured data to the event
    #[must_use = "builder methods must be chained or built"]
    pub fn with_data(mut self, key: &'static str, value: impl ToString) -> Self {
        self.data.push((key, value.to_string()));
        self
    }
}

impl fmt::Display for MemoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.level, self.source, self.event_type, self.message
        )?;
        if !self.data.is_empty() {
            f.write_str(" {")?;
            for (i, (key, value)) in self.data.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            f.write_str("}")?;
        }
        Ok(())
    }
}

/// Trait for logging memory events
pub trait MemoryLogger: Send + Sync {
    /// Log a memory event
    fn log(&self, event: &MemoryEvent);

    /// Returns false if events at `level` would be discarded
    ///
    /// Callers use this to skip building expensive messages.
    fn enabled(&self, level: LogLevel) -> bool {
        let _ = level;
        true
    }

    /// Log a memory event with a specific level
    fn log_with_level(&self, level: LogLevel, event_type: &'static str, source: &str, message: &str) {
        if self.enabled(level) {
            self.log(&MemoryEvent::new(event_type, source, level, message));
        }
    }

    /// Log a debug message
    fn debug(&self, event_type: &'static str, source: &str, message: &str) {
        self.log_with_level(LogLevel::Debug, event_type, source, message);
    }

    /// Log an info message
    fn info(&self, event_type: &'static str, source: &str, message: &str) {
        self.log_with_level(LogLevel::Info, event_type, source, message);
    }

    /// Log a warning message
    fn warn(&self, event_type: &'static str, source: &str, message: &str) {
        self.log_with_level(LogLevel::Warn, event_type, source, message);
    }

    /// Log an error message
    fn error(&self, event_type: &'static str, source: &str, message: &str) {
        self.log_with_level(LogLevel::Error, event_type, source, message);
    }
}

/// Shared handle to a logger
pub type SharedLogger = Arc<dyn MemoryLogger>;

/// No-op logger that discards all events
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl MemoryLogger for NoopLogger {
    fn log(&self, _event: &MemoryEvent) {}

    fn enabled(&self, _level: LogLevel) -> bool {
        false
    }
}

/// Logger that forwards events to `tracing`
#[cfg(feature = "logging")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

#[cfg(feature = "logging")]
impl MemoryLogger for TracingLogger {
    fn log(&self, event: &MemoryEvent) {
        let data = if event.data.is_empty() {
            String::new()
        } else {
            event
                .data
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(" ")
        };

        match event.level {
            LogLevel::Trace => tracing::trace!(
                source = %event.source, event = event.event_type, %data, "{}", event.message
            ),
            LogLevel::Debug => tracing::debug!(
                source = %event.source, event = event.event_type, %data, "{}", event.message
            ),
            LogLevel::Info => tracing::info!(
                source = %event.source, event = event.event_type, %data, "{}", event.message
            ),
            LogLevel::Warn => tracing::warn!(
                source = %event.source, event = event.event_type, %data, "{}", event.message
            ),
            LogLevel::Error => tracing::error!(
                source = %event.source, event = event.event_type, %data, "{}", event.message
            ),
        }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Trace => tracing::enabled!(tracing::Level::TRACE),
            LogLevel::Debug => tracing::enabled!(tracing::Level::DEBUG),
            LogLevel::Info => tracing::enabled!(tracing::Level::INFO),
            LogLevel::Warn => tracing::enabled!(tracing::Level::WARN),
            LogLevel::Error => tracing::enabled!(tracing::Level::ERROR),
        }
    }
}

/// Logger that keeps every event in memory
///
/// Useful in tests and for dumping a diagnostic trail after the fact.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<MemoryEvent>>,
    min_level: Option<LogLevel>,
}

impl RecordingLogger {
    /// Records every event
    pub fn new() -> Self {
        Self::default()
    }

    /// Records events at `level` or above
    pub fn with_min_level(level: LogLevel) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            min_level: Some(level),
        }
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<MemoryEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events of the given type
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }

    /// Number of recorded events at the given level
    pub fn count_level(&self, level: LogLevel) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.level == level)
            .count()
    }

    /// Drops all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl MemoryLogger for RecordingLogger {
    fn log(&self, event: &MemoryEvent) {
        if self.enabled(event.level) {
            self.events.lock().push(event.clone());
        }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        self.min_level.is_none_or(|min| level >= min)
    }
}

/// Logger used when none is injected
pub fn default_logger() -> SharedLogger {
    #[cfg(feature = "logging")]
    {
        Arc::new(TracingLogger)
    }
    #[cfg(not(feature = "logging"))]
    {
        Arc::new(NoopLogger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_event() {
        let event = MemoryEvent::new("allocate", "pool", LogLevel::Debug, "allocated block")
            .with_data("size", 64)
            .with_data("alignment", 16);

        assert_eq!(event.event_type, "allocate");
        assert_eq!(event.source, "pool");
        assert_eq!(event.level, LogLevel::Debug);
        assert_eq!(event.data.len(), 2);
        assert_eq!(event.data[0], ("size", "64".to_string()));
        assert_eq!(
            event.to_string(),
            "DEBUG [pool] allocate: allocated block {size=64, alignment=16}"
        );
    }

    #[test]
    fn test_noop_logger() {
        let logger = NoopLogger;
        assert!(!logger.enabled(LogLevel::Error));
        logger.error("corruption", "pool", "ignored");
    }

    #[test]
    fn test_recording_logger() {
        let logger = RecordingLogger::new();
        logger.warn("double_free", "pool", "block freed twice");
        logger.info("reset", "linear", "arena reset");
        logger.warn("double_free", "pool", "again");

        assert_eq!(logger.count("double_free"), 2);
        assert_eq!(logger.count_level(LogLevel::Info), 1);
        assert_eq!(logger.events().len(), 3);

        logger.clear();
        assert!(logger.events().is_empty());
    }

    #[test]
    fn test_recording_logger_min_level() {
        let logger = RecordingLogger::with_min_level(LogLevel::Warn);
        logger.debug("allocate", "stack", "noise");
        logger.error("overflow", "stack", "signal");

        assert_eq!(logger.events().len(), 1);
        assert_eq!(logger.events()[0].event_type, "overflow");
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }
}
