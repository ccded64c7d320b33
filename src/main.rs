/// `nssk` command-line entry point.
///
/// ```text
/// nssk import cosmo doi.org_10.25976_0gvo-9d12.csv --config conf/cosmo.json
/// nssk import cnv-rainfall NorthVancouverCityHall_export.csv --dry-run
/// nssk correlate --config conf/correlation.toml --location WAGG01
/// ```

use clap::{Parser, Subcommand, ValueEnum};
use nssk_ingest::config::ServiceConfig;
use nssk_ingest::correlate::run::{ImportOutcome, run_correlation};
use nssk_ingest::entry::SourceFormat;
use nssk_ingest::ingest::{ImportOptions, dump_source, stage_import};
use nssk_ingest::logging::{Component, LogLevel, Logger};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "nssk", version, about = "Import NSSK sensor dumps and correlate conductivity with rainfall")]
struct Cli {
    /// Minimum level logged
    #[arg(long, global = true, value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    log_level: Option<String>,

    /// Append log lines to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a source data dump
    Import {
        #[arg(value_enum)]
        source: DumpKind,

        /// Dump file to read
        dump: PathBuf,

        /// Database config (.json credentials or .toml service config)
        #[arg(long, env = "NSSK_CONFIG")]
        config: Option<PathBuf>,

        /// Print insert statements instead of writing to the database
        #[arg(long)]
        dry_run: bool,

        /// Inserts per commit, clamped to 10..=50000
        #[arg(long)]
        commit_size: Option<usize>,

        /// Where duplicate, error, and invalid-row files are written
        #[arg(long)]
        artifact_dir: Option<PathBuf>,
    },

    /// Correlate CoSMo conductivity with CNV rainfall
    Correlate {
        #[arg(long, env = "NSSK_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long)]
        dry_run: bool,

        /// Locations to correlate; repeats allowed
        #[arg(long = "location")]
        locations: Vec<String>,

        /// Skip invalid correlated entries instead of aborting
        #[arg(long)]
        skip_invalid: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DumpKind {
    Cosmo,
    CnvRainfall,
    Flowworks,
}

impl From<DumpKind> for SourceFormat {
    fn from(kind: DumpKind) -> Self {
        match kind {
            DumpKind::Cosmo => SourceFormat::Cosmo,
            DumpKind::CnvRainfall => SourceFormat::CnvRainfall,
            DumpKind::Flowworks => SourceFormat::Flowworks,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(ServiceConfig::load(p)?),
        None => Ok(ServiceConfig::default()),
    }
}

fn build_logger(cli: &Cli, config: &ServiceConfig) -> Result<Logger, Box<dyn std::error::Error>> {
    let level = match &cli.log_level {
        Some(level) => level.parse::<LogLevel>()?,
        None => config.logging.level()?,
    };
    let file = cli.log_file.as_deref().or(config.logging.file.as_deref());
    Ok(Logger::new(level, file, false))
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Import {
            source,
            dump,
            config,
            dry_run,
            commit_size,
            artifact_dir,
        } => {
            let service = load_config(config.as_deref())?;
            let logger = build_logger(cli, &service)?;
            let options = ImportOptions {
                commit_size: commit_size.unwrap_or(service.importer.commit_size),
                artifact_dir: artifact_dir.clone().unwrap_or_else(|| service.importer.artifact_dir.clone()),
            };
            let source = dump_source((*source).into()).ok_or("source has no dump front-end")?;

            // Credentials are checked before the dump is read.
            let db_config = if *dry_run { None } else { Some(service.db_config()?) };
            logger.info(
                Component::System,
                None,
                if *dry_run { "Executing dry run" } else { "Executing import" },
            );

            let read_start = Instant::now();
            let mut staged = stage_import(source.as_ref(), dump, &options, &logger)?;
            logger.info(
                Component::Importer,
                None,
                &format!(
                    "Processed {} records from {} in {:.3} sec",
                    staged.summary.accepted,
                    dump.display(),
                    read_start.elapsed().as_secs_f64()
                ),
            );

            match db_config {
                None => {
                    for statement in staged.importer.dry_run() {
                        println!("{}", statement);
                    }
                }
                Some(db_config) => {
                    let import_start = Instant::now();
                    let report = staged.importer.execute_postgres(&db_config)?;
                    logger.info(
                        Component::Importer,
                        None,
                        &format!(
                            "Completed database import in {:.3} sec: {}",
                            import_start.elapsed().as_secs_f64(),
                            serde_json::to_string(&report)?
                        ),
                    );
                }
            }
            Ok(())
        }

        Command::Correlate {
            config,
            dry_run,
            locations,
            skip_invalid,
        } => {
            let mut service = load_config(config.as_deref())?;
            let logger = build_logger(cli, &service)?;
            if !locations.is_empty() {
                service.correlation.locations = locations.clone();
            }
            if *skip_invalid {
                service.correlation.skip_invalid = true;
            }
            let target = service.db_config()?;

            let outcomes = run_correlation(&target, &service.correlation, &service.importer, *dry_run, &logger)?;

            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(run) => match &run.import {
                        ImportOutcome::DryRun(statements) => {
                            for statement in statements {
                                println!("{}", statement);
                            }
                        }
                        ImportOutcome::Executed(report) => logger.info(
                            Component::Correlator,
                            Some(outcome.location.as_str()),
                            &format!(
                                "{} entries from {} blocks: {} inserted, {} duplicates, {} errors",
                                run.report.entries,
                                run.report.blocks,
                                report.succeeded,
                                report.duplicates,
                                report.errors
                            ),
                        ),
                    },
                    Err(_) => failed += 1,
                }
            }

            if failed > 0 {
                return Err(format!("correlation failed for {} of {} locations", failed, outcomes.len()).into());
            }
            Ok(())
        }
    }
}
