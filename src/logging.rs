/// Structured logging for the import and correlation runs
///
/// Provides context-rich logging with component and location identifiers,
/// timestamps, and severity levels. Supports both console output and
/// file-based logging for unattended runs.
///
/// A `Logger` is a plain value. Each importer and correlator is handed its
/// own clone at construction; there is no process-wide logger state.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Importer,
    Correlator,
    Validator,
    Database,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Importer => write!(f, "IMPORT"),
            Component::Correlator => write!(f, "CORR"),
            Component::Validator => write!(f, "VALID"),
            Component::Database => write!(f, "DB"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Logger {
    /// Minimum log level to emit
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<PathBuf>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
    /// Console output on/off; file output is unaffected
    console: bool,
}

impl Logger {
    pub fn new(min_level: LogLevel, log_file: Option<&Path>, console_timestamps: bool) -> Self {
        Logger {
            min_level,
            log_file: log_file.map(Path::to_path_buf),
            console_timestamps,
            console: true,
        }
    }

    /// A logger that emits nothing. Used by tests and library callers that
    /// only want the returned reports.
    pub fn disabled() -> Self {
        Logger {
            min_level: LogLevel::Error,
            log_file: None,
            console_timestamps: false,
            console: false,
        }
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        (self.console || self.log_file.is_some()) && level >= self.min_level
    }

    fn log(&self, level: LogLevel, component: Component, location: Option<&str>, message: &str) {
        if !self.enabled(level) {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let location_part = location.map(|s| format!(" [{}]", s)).unwrap_or_default();
        let log_entry = format!(
            "{} {} {}{}: {}",
            timestamp, level, component, location_part, message
        );

        if self.console {
            if self.console_timestamps {
                match level {
                    LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                    LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
                }
            } else {
                match level {
                    LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, location_part, message),
                    LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, location_part, message),
                    LogLevel::Info => println!("   {}", message),
                    LogLevel::Debug => println!("   [DEBUG] {}", message),
                }
            }
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path.display(), e);
            }
        }
    }

    fn append_to_file(path: &Path, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }

    pub fn debug(&self, component: Component, location: Option<&str>, message: &str) {
        self.log(LogLevel::Debug, component, location, message);
    }

    pub fn info(&self, component: Component, location: Option<&str>, message: &str) {
        self.log(LogLevel::Info, component, location, message);
    }

    pub fn warn(&self, component: Component, location: Option<&str>, message: &str) {
        self.log(LogLevel::Warning, component, location, message);
    }

    pub fn error(&self, component: Component, location: Option<&str>, message: &str) {
        self.log(LogLevel::Error, component, location, message);
    }

    /// Rewrites the current console line with an advisory progress counter.
    /// Never written to the log file.
    pub fn progress(&self, message: &str) {
        if self.console && self.min_level <= LogLevel::Info {
            print!("\r\t{}", message);
            let _ = std::io::stdout().flush();
        }
    }

    /// Ends a progress line started with `progress`.
    pub fn finish_progress(&self) {
        if self.console && self.min_level <= LogLevel::Info {
            println!();
        }
    }
}

// ---------------------------------------------------------------------------
// Summary Logging
// ---------------------------------------------------------------------------

/// Severity for an outcome where `failed` of `total` items did not succeed.
pub fn outcome_level(total: usize, failed: usize) -> LogLevel {
    if failed == 0 {
        LogLevel::Info
    } else if failed >= total {
        LogLevel::Error
    } else {
        LogLevel::Warning
    }
}

/// Log the totals of one importer execution
pub fn log_import_summary(
    logger: &Logger,
    importer: &str,
    succeeded: usize,
    duplicates: usize,
    errors: usize,
) {
    let total = succeeded + duplicates + errors;
    let message = format!(
        "Import '{}' complete: {}/{} inserted, {} duplicates, {} errors",
        importer, succeeded, total, duplicates, errors
    );
    logger.log(outcome_level(total, duplicates + errors), Component::Importer, None, &message);
}

/// Log the totals of one front-end ingestion pass
pub fn log_ingest_summary(logger: &Logger, source: &str, accepted: usize, rejected: usize, skipped: usize) {
    let message = format!(
        "Processed {} records from {}: {} accepted, {} validation failures, {} skipped",
        accepted + rejected + skipped,
        source,
        accepted,
        rejected,
        skipped
    );
    logger.log(outcome_level(accepted + rejected, rejected), Component::Validator, None, &message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_log_level_parses_cli_names() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(outcome_level(45, 0), LogLevel::Info);
        assert_eq!(outcome_level(45, 1), LogLevel::Warning);
        assert_eq!(outcome_level(3, 3), LogLevel::Error);
        assert_eq!(outcome_level(0, 0), LogLevel::Info);
    }

    #[test]
    fn test_file_output_includes_component_and_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let mut logger = Logger::new(LogLevel::Info, Some(&path), false);
        logger.console = false;

        logger.debug(Component::Correlator, Some("WAGG01"), "filtered out");
        logger.warn(Component::Correlator, Some("WAGG01"), "no rainfall in block");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("WARN CORR [WAGG01]: no rainfall in block"));
    }

    #[test]
    fn test_disabled_logger_emits_nothing() {
        let logger = Logger::disabled();
        assert!(!logger.enabled(LogLevel::Error));
    }
}
