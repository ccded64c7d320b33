/// NSSK environmental data ingestion.
///
/// Imports CoSMo water-quality, CNV rainfall and Flowworks flow dumps into
/// PostgreSQL, and derives per-location conductivity/rainfall correlation
/// tables from the imported series.

pub mod config;
pub mod correlate;
pub mod db;
pub mod entry;
pub mod error;
pub mod importer;
pub mod ingest;
pub mod locations;
pub mod logging;
pub mod model;
