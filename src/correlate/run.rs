/// End-to-end correlation run against PostgreSQL.
///
/// Checks that every database and destination table exists, then correlates
/// each configured location in turn. Each location gets its own store
/// connections and its own importer, so a connection failure for one
/// location does not stop the others.

use super::entry::{CORRELATION_IMPORTER_NAME, CORRELATION_SCHEMA};
use super::store::{PgSeriesStore, SeriesSpec};
use super::{CorrelationConfig, CorrelationReport, Correlator};
use crate::config::{CorrelationSettings, DbConfig, ImporterSettings};
use crate::db;
use crate::error::CorrelationError;
use crate::importer::{ImportReport, Importer, Schema};
use crate::ingest::write_rejects;
use crate::locations::TableId;
use crate::logging::{Component, Logger};
use std::path::PathBuf;

/// What happened to a location's correlated entries.
#[derive(Debug)]
pub enum ImportOutcome {
    /// Statements printed instead of executed.
    DryRun(Vec<String>),
    Executed(ImportReport),
}

#[derive(Debug)]
pub struct LocationOutcome {
    pub location: TableId,
    pub result: Result<LocationRun, CorrelationError>,
}

#[derive(Debug)]
pub struct LocationRun {
    pub report: CorrelationReport,
    pub import: ImportOutcome,
    /// Log of entries skipped under `SkipAndCollect`, if any.
    pub skipped_file: Option<PathBuf>,
}

/// An importer configured for one location's correlation table.
pub fn correlation_importer(location: TableId, settings: &ImporterSettings, logger: &Logger) -> Importer {
    let mut importer = Importer::new(logger.clone()).with_artifact_dir(&settings.artifact_dir);
    importer.configure(
        Schema::new(CORRELATION_SCHEMA),
        None,
        settings.commit_size,
        &format!("{}-{}", CORRELATION_IMPORTER_NAME, location),
    );
    importer
}

/// Runs the precondition checks and every configured location.
///
/// Setup and precondition failures are returned as errors. Failures while
/// correlating a location are recorded in that location's outcome.
pub fn run_correlation(
    target: &DbConfig,
    settings: &CorrelationSettings,
    importer_settings: &ImporterSettings,
    dry_run: bool,
    logger: &Logger,
) -> Result<Vec<LocationOutcome>, CorrelationError> {
    let config = settings.to_correlation_config()?;

    let mut catalog = db::connect(target)?;
    db::verify_correlation_targets(
        &mut catalog,
        &target.database,
        &[settings.reference_database.as_str(), settings.secondary_database.as_str()],
        &config.locations,
        logger,
    )?;
    drop(catalog);
    logger.info(Component::Correlator, None, "Precheck passed. Running correlation...");

    let mut outcomes = Vec::with_capacity(config.locations.len());
    for &location in &config.locations {
        logger.info(
            Component::Correlator,
            Some(location.as_str()),
            "Running conductivity-rainfall correlation",
        );
        let result = correlate_location(target, settings, &config, importer_settings, dry_run, location, logger);
        if let Err(ref err) = result {
            logger.error(
                Component::Correlator,
                Some(location.as_str()),
                &format!("Correlation aborted: {}", err),
            );
        }
        outcomes.push(LocationOutcome { location, result });
    }
    Ok(outcomes)
}

fn correlate_location(
    target: &DbConfig,
    settings: &CorrelationSettings,
    config: &CorrelationConfig,
    importer_settings: &ImporterSettings,
    dry_run: bool,
    location: TableId,
    logger: &Logger,
) -> Result<LocationRun, CorrelationError> {
    let reference = PgSeriesStore::connect(
        &target.with_database(&settings.reference_database),
        SeriesSpec::cosmo_specific_conductance(),
    )?;
    let secondary = PgSeriesStore::connect(
        &target.with_database(&settings.secondary_database),
        SeriesSpec::cnv_rainfall()?,
    )?;

    let mut importer = correlation_importer(location, importer_settings, logger);
    let mut correlator = Correlator::new(reference, secondary, config.clone(), logger.clone());
    let report = correlator.run(location, &mut importer)?;

    let skipped_file = write_rejects(&importer_settings.artifact_dir, importer.name(), &report.skipped)?;

    let import = if dry_run {
        let statements = importer.dry_run();
        importer.discard();
        ImportOutcome::DryRun(statements)
    } else {
        ImportOutcome::Executed(importer.execute_postgres(target)?)
    };

    Ok(LocationRun {
        report,
        import,
        skipped_file,
    })
}
