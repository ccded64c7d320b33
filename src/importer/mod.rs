/// Batch importer.
///
/// Accumulates normalized entries as rendered insert operations, then runs
/// them against an `InsertTarget` in commit-sized batches. Statement-level
/// failures are classified (duplicate or other), counted, written to
/// timestamped artifact files, and never abort the batch. Only a lost
/// connection stops a run early.

pub mod artifacts;
pub mod pg;

use crate::entry::NormalizedEntry;
use crate::error::{ConfigurationError, ConnectionError, ImportError, InsertFailure};
use crate::locations::TableId;
use crate::logging::{self, Component, Logger};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_COMMIT_SIZE: usize = 100;
pub const MIN_COMMIT_SIZE: usize = 10;
pub const MAX_COMMIT_SIZE: usize = 50_000;

/// Clamps a requested commit size into `[MIN_COMMIT_SIZE, MAX_COMMIT_SIZE]`.
pub fn clamp_commit_size(requested: usize) -> usize {
    requested.clamp(MIN_COMMIT_SIZE, MAX_COMMIT_SIZE)
}

// ---------------------------------------------------------------------------
// Schema and mapping
// ---------------------------------------------------------------------------

/// Ordered canonical field names. Fixes column order for every insert.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema(Vec<String>);

impl Schema {
    pub fn new<S: AsRef<str>>(fields: &[S]) -> Self {
        Schema(fields.iter().map(|f| f.as_ref().to_string()).collect())
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Source field name → destination column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapping(HashMap<String, String>);

impl FieldMapping {
    pub fn new<S: AsRef<str>>(pairs: &[(S, S)]) -> Self {
        FieldMapping(
            pairs
                .iter()
                .map(|(from, to)| (from.as_ref().to_string(), to.as_ref().to_string()))
                .collect(),
        )
    }

    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Insert operations
// ---------------------------------------------------------------------------

/// One rendered insert bound to one destination table.
///
/// The row travels as a single JSON parameter that the server expands with
/// `json_populate_record`, so every value reaches its column through the
/// column type's own input conversion and never through SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOperation {
    table: TableId,
    columns: Vec<String>,
    values: Vec<Option<String>>,
}

impl InsertOperation {
    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Parameterized statement text; `$1` is `row_json()`.
    pub fn statement(&self) -> String {
        let table = self.table.quoted();
        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {table} ({columns}) SELECT {columns} FROM json_populate_record(NULL::{table}, $1::json)"
        )
    }

    /// Column → value object; NULL values become JSON null.
    pub fn row_json(&self) -> serde_json::Value {
        let row = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(column, value)| {
                let value = match value {
                    Some(v) => serde_json::Value::String(v.clone()),
                    None => serde_json::Value::Null,
                };
                (column.clone(), value)
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(row)
    }

    /// Standalone statement with the row inlined as a string literal. Used
    /// for dry runs and artifact files so failed rows can be replayed.
    pub fn to_sql(&self) -> String {
        let literal = quote_literal(&self.row_json().to_string());
        format!("{};", self.statement().replace("$1", &literal))
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Ordered, append-only list of pending operations.
#[derive(Debug, Default)]
pub struct InsertBatch {
    operations: Vec<InsertOperation>,
}

impl InsertBatch {
    pub fn push(&mut self, operation: InsertOperation) {
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InsertOperation> {
        self.operations.iter()
    }

    fn take(&mut self) -> Vec<InsertOperation> {
        std::mem::take(&mut self.operations)
    }
}

// ---------------------------------------------------------------------------
// Execution target
// ---------------------------------------------------------------------------

/// Where rendered operations are executed.
///
/// Implementations must leave the transaction usable after a failed
/// `insert`, so the batch can continue past duplicates and errors.
pub trait InsertTarget {
    fn insert(&mut self, operation: &InsertOperation) -> Result<(), InsertFailure>;

    fn commit(&mut self) -> Result<(), ConnectionError>;
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    /// Rows inserted and committed.
    pub succeeded: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub commits: usize,
    /// Rows inserted but rolled back with an open transaction when the
    /// connection was lost.
    pub uncommitted: usize,
    pub duplicates_file: Option<PathBuf>,
    pub errors_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Importer
// ---------------------------------------------------------------------------

pub struct Importer {
    name: String,
    schema: Option<Schema>,
    mapping: Option<FieldMapping>,
    commit_size: usize,
    artifact_dir: PathBuf,
    batch: InsertBatch,
    logger: Logger,
}

impl Importer {
    pub fn new(logger: Logger) -> Self {
        Importer {
            name: "DEFAULT".to_string(),
            schema: None,
            mapping: None,
            commit_size: DEFAULT_COMMIT_SIZE,
            artifact_dir: PathBuf::from("."),
            batch: InsertBatch::default(),
            logger,
        }
    }

    /// Sets the schema, optional field mapping, commit size (clamped), and
    /// the name used in artifact file names. Must precede `add`.
    pub fn configure(
        &mut self,
        schema: Schema,
        mapping: Option<FieldMapping>,
        commit_size: usize,
        name: &str,
    ) {
        let clamped = clamp_commit_size(commit_size);
        if clamped != commit_size {
            self.logger.warn(
                Component::Importer,
                None,
                &format!("Commit size {} clamped to {}", commit_size, clamped),
            );
        }
        self.schema = Some(schema);
        self.mapping = mapping;
        self.commit_size = clamped;
        self.name = name.to_string();
    }

    /// Directory receiving duplicate and error artifact files.
    pub fn with_artifact_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.artifact_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commit_size(&self) -> usize {
        self.commit_size
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Renders `entry` against the schema and appends it to the batch.
    ///
    /// Fails, without touching the store, when no schema is configured or a
    /// schema field has no mapping.
    pub fn add(&mut self, entry: NormalizedEntry) -> Result<(), ConfigurationError> {
        let schema = match &self.schema {
            Some(s) if !s.is_empty() => s,
            _ => return Err(ConfigurationError::SchemaUnset),
        };

        let mut columns = Vec::with_capacity(schema.len());
        let mut values = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let column = match &self.mapping {
                Some(mapping) => {
                    let column = mapping
                        .column_for(field)
                        .ok_or_else(|| ConfigurationError::UnmappedField(field.clone()))?;
                    self.logger.debug(
                        Component::Importer,
                        None,
                        &format!("Remapping dump field '{}' to db field '{}'", field, column),
                    );
                    column.to_string()
                }
                None => field.clone(),
            };
            columns.push(column);
            values.push(entry.get(field).map(String::from));
        }

        self.batch.push(InsertOperation {
            table: entry.destination(),
            columns,
            values,
        });
        Ok(())
    }

    /// Every pending operation as a standalone statement, in insertion order.
    /// Nothing is executed and the batch is left intact.
    pub fn dry_run(&self) -> Vec<String> {
        self.batch.iter().map(InsertOperation::to_sql).collect()
    }

    /// Drops every pending operation, returning how many were discarded.
    pub fn discard(&mut self) -> usize {
        self.batch.take().len()
    }

    /// Executes the batch in insertion order, committing every
    /// `commit_size` operations and once more for any remainder.
    ///
    /// The batch is drained whether or not the run completes. Duplicate and
    /// error statements are written to artifact files before returning, even
    /// when a connection failure cuts the run short; that failure comes back
    /// as `ImportError::Interrupted` carrying the counts up to the last commit.
    pub fn execute<T: InsertTarget + ?Sized>(
        &mut self,
        target: &mut T,
    ) -> Result<ImportReport, ImportError> {
        let operations = self.batch.take();
        let total = operations.len();
        let mut report = ImportReport::default();

        if total == 0 {
            self.logger
                .warn(Component::Importer, None, &format!("Import '{}' has no inserts to make", self.name));
            return Ok(report);
        }

        self.logger.info(
            Component::Importer,
            None,
            &format!("Starting import '{}': {} inserts", self.name, total),
        );

        let mut duplicates = Vec::new();
        let mut errors = Vec::new();
        let mut statements_since_commit = 0;
        let mut inserted_since_commit = 0;
        let mut aborted: Option<ConnectionError> = None;

        self.logger.progress(&format!("0 / {}", total));

        for (i, operation) in operations.iter().enumerate() {
            match target.insert(operation) {
                Ok(()) => inserted_since_commit += 1,
                Err(InsertFailure::Duplicate(message)) => {
                    self.logger.warn(
                        Component::Importer,
                        Some(operation.table().as_str()),
                        &format!("Duplicate row, continuing: {}", message),
                    );
                    duplicates.push(operation.to_sql());
                }
                Err(InsertFailure::Execution(message)) => {
                    self.logger.warn(
                        Component::Importer,
                        Some(operation.table().as_str()),
                        &format!("Insert failed, continuing: {}", message),
                    );
                    errors.push(operation.to_sql());
                }
                Err(InsertFailure::Connection(err)) => {
                    aborted = Some(err);
                    break;
                }
            }

            statements_since_commit += 1;
            if statements_since_commit == self.commit_size {
                if let Err(err) = target.commit() {
                    aborted = Some(err);
                    break;
                }
                report.commits += 1;
                report.succeeded += inserted_since_commit;
                statements_since_commit = 0;
                inserted_since_commit = 0;
            }

            self.logger.progress(&format!(
                "{} / {} ({} duplicates, {} errors)",
                i + 1,
                total,
                duplicates.len(),
                errors.len()
            ));
        }

        if aborted.is_none() && statements_since_commit > 0 {
            match target.commit() {
                Ok(()) => {
                    report.commits += 1;
                    report.succeeded += inserted_since_commit;
                    inserted_since_commit = 0;
                }
                Err(err) => aborted = Some(err),
            }
        }
        report.uncommitted = inserted_since_commit;
        self.logger.finish_progress();

        report.duplicates = duplicates.len();
        report.errors = errors.len();
        report.duplicates_file = self.persist("duplicates", &duplicates)?;
        report.errors_file = self.persist("errors", &errors)?;

        if let Some(err) = aborted {
            self.logger.error(
                Component::Importer,
                None,
                &format!(
                    "Import '{}' aborted after {} of {} inserts ({} committed, {} rolled back): {}",
                    self.name,
                    report.succeeded + report.uncommitted + report.duplicates + report.errors,
                    total,
                    report.succeeded,
                    report.uncommitted,
                    err
                ),
            );
            return Err(ImportError::Interrupted {
                source: err,
                report: Box::new(report),
            });
        }

        logging::log_import_summary(
            &self.logger,
            &self.name,
            report.succeeded,
            report.duplicates,
            report.errors,
        );
        Ok(report)
    }

    fn persist(&self, kind: &str, statements: &[String]) -> Result<Option<PathBuf>, ImportError> {
        let path = artifacts::write_artifact(&self.artifact_dir, kind, &self.name, "sql", statements)?;
        if let Some(ref p) = path {
            self.logger.warn(
                Component::Importer,
                None,
                &format!("Encountered {} {}. Dumped failed inserts to {}", statements.len(), kind, p.display()),
            );
        }
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
