/// Error taxonomy for the import and correlation engines.
///
/// Record-level failures (`ValidationError`, `InsertFailure::Duplicate`,
/// `InsertFailure::Execution`) are caught at the smallest scope and counted.
/// Everything else is fatal for the run and propagates to the binary.

use crate::importer::ImportReport;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Why a single field was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationReason {
    /// Required field absent, null, or empty.
    Missing,
    /// Field expected to be numeric did not parse.
    NotNumeric,
    /// Field expected to hold a date and time did not parse.
    NotTimestamp,
    /// Numeric value outside its plausible physical range (inclusive bounds).
    OutOfRange { min: f64, max: f64 },
    /// Domain requires a value >= 0.
    Negative,
    /// The record routes to a table that is not in the location registry.
    UnknownDestination,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReason::Missing => write!(f, "missing value"),
            ValidationReason::NotNumeric => write!(f, "not a number"),
            ValidationReason::NotTimestamp => write!(f, "not a timestamp"),
            ValidationReason::OutOfRange { min, max } => {
                write!(f, "out of range [{}, {}]", min, max)
            }
            ValidationReason::Negative => write!(f, "negative value"),
            ValidationReason::UnknownDestination => write!(f, "unknown destination"),
        }
    }
}

/// A record failed structural or semantic checks.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason} for field '{field}' [{}]", .value.as_deref().unwrap_or(""))]
pub struct ValidationError {
    pub field: String,
    pub value: Option<String>,
    pub reason: ValidationReason,
}

impl ValidationError {
    pub fn new(field: &str, value: Option<&str>, reason: ValidationReason) -> Self {
        Self {
            field: field.to_string(),
            value: value.map(String::from),
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Setup errors
// ---------------------------------------------------------------------------

/// Missing or invalid settings. Always raised before any store access.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("DB config missing {0}")]
    MissingCredential(&'static str),

    #[error("DB config has invalid {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("database schema must be defined before entries are added")]
    SchemaUnset,

    #[error("could not resolve field mapping for '{0}'")]
    UnmappedField(String),

    #[error("unknown monitoring location: {0}")]
    UnknownLocation(String),
}

/// An object the correlation run depends on does not exist.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreconditionError {
    #[error("could not find database {0}")]
    MissingDatabase(String),

    #[error("could not find table {table} in database {database}")]
    MissingTable { table: String, database: String },
}

/// Failure to establish or hold a store connection.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("database connection failed: {0}")]
pub struct ConnectionError(pub String);

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Outcome of one failed insert statement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InsertFailure {
    /// Unique-constraint violation. Counted, never retried.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// Any other statement-level failure. Counted, never retried.
    #[error("insert failed: {0}")]
    Execution(String),

    /// The connection itself is gone; the rest of the batch is abandoned.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Failure while reading a time series.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("series query failed: {0}")]
    Query(String),
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Fatal errors from `Importer::execute` and friends.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Connection lost part way through `execute`. `report` holds the counts
    /// reached before the loss; `succeeded` covers committed rows only.
    #[error("import interrupted after {} committed rows: {source}", .report.succeeded)]
    Interrupted {
        #[source]
        source: ConnectionError,
        report: Box<ImportReport>,
    },

    #[error("failed to write artifact file {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Dump(#[from] IngestError),
}

/// A dump file could not be read or parsed as a whole.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read dump file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dump at line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("invalid JSON dump: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal errors from a correlation run.
#[derive(Error, Debug)]
pub enum CorrelationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no {series} series bounds found for location {location}")]
    MissingBounds {
        series: &'static str,
        location: String,
    },

    #[error("correlated entry rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

impl From<ConnectionError> for CorrelationError {
    fn from(err: ConnectionError) -> Self {
        CorrelationError::Store(StoreError::Connection(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field_and_value() {
        let err = ValidationError::new("Rainfall (mm)", Some("-1"), ValidationReason::Negative);
        let msg = err.to_string();
        assert!(msg.contains("Rainfall (mm)"), "{}", msg);
        assert!(msg.contains("[-1]"), "{}", msg);
    }

    #[test]
    fn test_missing_value_renders_empty_brackets() {
        let err = ValidationError::new("ResultValue", None, ValidationReason::Missing);
        assert_eq!(err.to_string(), "missing value for field 'ResultValue' []");
    }
}
