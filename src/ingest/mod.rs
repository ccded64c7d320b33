/// Dump-file front-ends.
///
/// Each source dump (CoSMo CSV, CNV rainfall CSV, Flowworks JSON) is read
/// into `RawRecord`s, filtered, validated, and handed to a configured
/// `Importer`. Records failing validation are collected and written to an
/// invalid-rows log; they never stop the import.

pub mod cnv;
pub mod cosmo;
pub mod flowworks;

use crate::entry::{RawRecord, SourceFormat};
use crate::error::{ConfigurationError, ImportError, IngestError};
use crate::importer::{FieldMapping, Importer, Schema, artifacts};
use crate::logging::{self, Component, Logger};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Dump sources
// ---------------------------------------------------------------------------

/// One kind of source dump and how it maps onto its database tables.
pub trait DumpSource {
    fn format(&self) -> SourceFormat;

    /// Name used for artifact files and log lines.
    fn importer_name(&self) -> String {
        self.format().to_string()
    }

    /// Dump field names in insert column order.
    fn schema(&self) -> Schema;

    /// Dump field name → database column, when they differ.
    fn mapping(&self) -> Option<FieldMapping> {
        None
    }

    fn read_dump(&self, text: &str) -> Result<Vec<RawRecord>, IngestError>;

    /// Whether a record belongs in this import at all. Unwanted records are
    /// skipped, not rejected.
    fn wants(&self, _raw: &RawRecord) -> bool {
        true
    }
}

/// The front-end for `format`. Correlated rows have no dump file.
pub fn dump_source(format: SourceFormat) -> Option<Box<dyn DumpSource>> {
    match format {
        SourceFormat::Cosmo => Some(Box::new(cosmo::CosmoDump)),
        SourceFormat::CnvRainfall => Some(Box::new(cnv::CnvRainfallDump)),
        SourceFormat::Flowworks => Some(Box::new(flowworks::FlowworksDump)),
        SourceFormat::ConductivityRainfall(_) => None,
    }
}

// ---------------------------------------------------------------------------
// CSV parsing
// ---------------------------------------------------------------------------

/// Splits one CSV line, honouring double-quoted fields and `""` escapes.
pub fn split_csv_line(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            (c, _) => current.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(current);
    Ok(fields)
}

/// Reads a headed CSV dump into records keyed by the header names.
///
/// `skip_lines` metadata lines precede the header. Blank lines are ignored.
/// Short rows leave the trailing fields null; rows with more fields than the
/// header are malformed.
pub fn read_csv_records(text: &str, skip_lines: usize) -> Result<Vec<RawRecord>, IngestError> {
    let mut lines = text
        .lines()
        .enumerate()
        .skip(skip_lines)
        .filter(|(_, line)| !line.trim().is_empty());

    let header = match lines.next() {
        Some((i, line)) => split_csv_line(line.trim_start_matches('\u{feff}'))
            .map_err(|message| IngestError::Malformed { line: i + 1, message })?,
        None => return Ok(Vec::new()),
    };

    let mut records = Vec::new();
    for (i, line) in lines {
        let values = split_csv_line(line).map_err(|message| IngestError::Malformed { line: i + 1, message })?;
        if values.len() > header.len() {
            return Err(IngestError::Malformed {
                line: i + 1,
                message: format!("{} fields, header has {}", values.len(), header.len()),
            });
        }

        let mut values = values.into_iter();
        let record: RawRecord = header.iter().map(|name| (name.as_str(), values.next())).collect();
        records.push(record);
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestSummary {
    pub accepted: usize,
    pub skipped: usize,
    /// One line per rejected record: the record followed by the reason.
    pub rejects: Vec<String>,
}

impl IngestSummary {
    pub fn rejected(&self) -> usize {
        self.rejects.len()
    }
}

/// Validates `records` and adds the valid ones to `importer`.
///
/// Validation failures are logged and collected. A configuration failure
/// from the importer (no schema, unmapped field) stops immediately.
pub fn ingest_records(
    source: &dyn DumpSource,
    records: Vec<RawRecord>,
    importer: &mut Importer,
    logger: &Logger,
) -> Result<IngestSummary, ConfigurationError> {
    let validator = source.format().validator();
    let mut summary = IngestSummary::default();

    for (i, raw) in records.into_iter().enumerate() {
        if !source.wants(&raw) {
            summary.skipped += 1;
            logger.debug(Component::Validator, None, &format!("Skipping record {}: {}", i + 1, raw));
            continue;
        }

        match validator.validate(&raw) {
            Ok(entry) => {
                importer.add(entry)?;
                summary.accepted += 1;
            }
            Err(err) => {
                logger.error(
                    Component::Validator,
                    None,
                    &format!("Error constructing {} entry from record {}: {}", source.format(), i + 1, err),
                );
                summary.rejects.push(format!("{} -- {}", raw, err));
            }
        }

        logger.progress(&format!(
            "Records processed: {}. Validation failures: {}",
            summary.accepted,
            summary.rejected()
        ));
    }
    logger.finish_progress();

    logging::log_ingest_summary(
        logger,
        &source.importer_name(),
        summary.accepted,
        summary.rejected(),
        summary.skipped,
    );
    Ok(summary)
}

/// Writes rejected records to `<dir>/<importer>_invalid_rows_<ts>.log`.
pub fn write_rejects(dir: &Path, importer: &str, rejects: &[String]) -> Result<Option<PathBuf>, ImportError> {
    artifacts::write_artifact(dir, importer, "invalid_rows", "log", rejects)
}

/// Settings for one dump import.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub commit_size: usize,
    pub artifact_dir: PathBuf,
}

/// A dump read and validated into an importer, ready to execute or print.
pub struct StagedImport {
    pub importer: Importer,
    pub summary: IngestSummary,
    pub rejects_file: Option<PathBuf>,
}

/// Reads `dump`, validates every record, and stages the valid ones.
pub fn stage_import(
    source: &dyn DumpSource,
    dump: &Path,
    options: &ImportOptions,
    logger: &Logger,
) -> Result<StagedImport, ImportError> {
    let name = source.importer_name();
    logger.info(
        Component::Importer,
        None,
        &format!("Beginning import of {} data from dump file {}", name, dump.display()),
    );

    let text = std::fs::read_to_string(dump).map_err(|err| IngestError::Read {
        path: dump.to_path_buf(),
        source: err,
    })?;
    let records = source.read_dump(&text)?;
    logger.debug(Component::Importer, None, &format!("Read {} records from dump", records.len()));

    let mut importer = Importer::new(logger.clone()).with_artifact_dir(&options.artifact_dir);
    importer.configure(source.schema(), source.mapping(), options.commit_size, &name);

    let summary = ingest_records(source, records, &mut importer, logger)?;
    let rejects_file = write_rejects(&options.artifact_dir, &name, &summary.rejects)?;
    if let Some(ref path) = rejects_file {
        logger.warn(
            Component::Validator,
            None,
            &format!("Found {} invalid records. Logged to {}", summary.rejected(), path.display()),
        );
    }

    Ok(StagedImport {
        importer,
        summary,
        rejects_file,
    })
}
