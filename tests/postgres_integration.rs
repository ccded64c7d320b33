/// Live PostgreSQL checks for the insert target, catalog probes, and series
/// stores.
///
/// Prerequisites:
/// - PostgreSQL reachable with the NSSK_DB_* variables set (or in .env)
/// - The connecting user may create temporary tables
///
/// Every table used here is TEMPORARY, so nothing persists after the session.
///
/// Run with: cargo test --test postgres_integration -- --ignored --test-threads=1

use chrono::{NaiveDate, NaiveDateTime};
use nssk_ingest::config::DbConfig;
use nssk_ingest::correlate::store::{PgSeriesStore, SeriesSpec, SeriesStore};
use nssk_ingest::db::{self, CatalogProbe};
use nssk_ingest::entry::{RawRecord, RecordValidator};
use nssk_ingest::importer::Importer;
use nssk_ingest::importer::pg::PgInsertTarget;
use nssk_ingest::ingest::DumpSource;
use nssk_ingest::ingest::flowworks::{FlowworksDump, FlowworksValidator};
use nssk_ingest::locations::TableId;
use nssk_ingest::logging::Logger;
use postgres::Client;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn test_config() -> DbConfig {
    DbConfig::from_env().expect("NSSK_DB_* must be set for live tests")
}

fn test_client() -> Client {
    db::connect(&test_config()).expect("Failed to connect to test database")
}

fn at(day: u32, hour: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 10, day)
        .unwrap()
        .and_hms_opt(hour, min, 0)
        .unwrap()
}

fn flow_record(date: &str, value: &str) -> RawRecord {
    [("date", Some(date)), ("value", Some(value))].into_iter().collect()
}

// ---------------------------------------------------------------------------
// Insert target
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_duplicate_is_rolled_back_to_savepoint_and_counted() {
    let mut client = test_client();
    client
        .batch_execute(
            "CREATE TEMP TABLE \"DNV\" (
                 \"MeasurementTimestamp\" TIMESTAMP PRIMARY KEY,
                 \"FlowReading\" DOUBLE PRECISION
             )",
        )
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut importer = Importer::new(Logger::disabled()).with_artifact_dir(dir.path());
    importer.configure(FlowworksDump.schema(), FlowworksDump.mapping(), 10, "flowworks");
    for (date, value) in [
        ("2021-03-29T14:00:00", "11.5"),
        ("2021-03-29T14:05:00", "null"),
        ("2021-03-29T14:00:00", "12.0"),
        ("2021-03-29T14:10:00", "10.9"),
    ] {
        importer
            .add(FlowworksValidator.validate(&flow_record(date, value)).unwrap())
            .unwrap();
    }

    let mut target = PgInsertTarget::from_client(client);
    let report = importer.execute(&mut target).unwrap();
    assert_eq!((report.succeeded, report.duplicates, report.errors), (3, 1, 0));
    assert!(report.duplicates_file.is_some());

    let mut client = target.into_client();
    let count: i64 = client
        .query_one("SELECT COUNT(*) FROM \"DNV\"", &[])
        .unwrap()
        .get(0);
    assert_eq!(count, 3);

    let nulls: i64 = client
        .query_one("SELECT COUNT(*) FROM \"DNV\" WHERE \"FlowReading\" IS NULL", &[])
        .unwrap()
        .get(0);
    assert_eq!(nulls, 1);
}

#[test]
#[ignore]
fn test_bad_value_is_an_error_not_a_duplicate() {
    let mut client = test_client();
    client
        .batch_execute("CREATE TEMP TABLE \"DNV\" (\"MeasurementTimestamp\" TIMESTAMP, \"FlowReading\" SMALLINT)")
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut importer = Importer::new(Logger::disabled()).with_artifact_dir(dir.path());
    importer.configure(FlowworksDump.schema(), FlowworksDump.mapping(), 10, "flowworks");
    importer
        .add(FlowworksValidator.validate(&flow_record("2021-03-29T14:00:00", "1")).unwrap())
        .unwrap();
    importer
        .add(FlowworksValidator.validate(&flow_record("2021-03-29T14:05:00", "99999999")).unwrap())
        .unwrap();

    let mut target = PgInsertTarget::from_client(client);
    let report = importer.execute(&mut target).unwrap();
    assert_eq!((report.succeeded, report.duplicates, report.errors), (1, 0, 1));
    assert!(report.errors_file.is_some());
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_catalog_finds_connected_database_only() {
    let config = test_config();
    let mut client = test_client();
    assert!(client.database_exists(&config.database).unwrap());
    assert!(!client.database_exists("nssk_database_that_does_not_exist").unwrap());
    assert!(!client.table_exists("nssk_table_that_does_not_exist").unwrap());
}

// ---------------------------------------------------------------------------
// Series stores
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_cosmo_series_combines_date_and_time_and_filters() {
    let mut client = test_client();
    client
        .batch_execute(
            "CREATE TEMP TABLE \"WAGG01\" (
                 \"ActivityStartDate\" TEXT,
                 \"ActivityStartTime\" TEXT,
                 \"CharacteristicName\" TEXT,
                 \"ResultValue\" TEXT
             );
             INSERT INTO \"WAGG01\" VALUES
                 ('2023-10-01', '12:00:00', 'Specific conductance', '150.5'),
                 ('2023-10-01', '12:00:00', 'Temperature, water', '11.2'),
                 ('2023-10-03', '08:30:00', 'Specific conductance', '149.0'),
                 ('2023-10-09', '00:00:00', 'Specific conductance', '151.0');",
        )
        .unwrap();

    let location = TableId::parse("WAGG01").unwrap();
    let mut store = PgSeriesStore::from_client(client, SeriesSpec::cosmo_specific_conductance());
    assert_eq!(store.earliest(location).unwrap(), Some(at(1, 12, 0)));
    assert_eq!(store.latest(location).unwrap(), Some(at(9, 0, 0)));

    let readings = store.readings(location, at(1, 0, 0), at(8, 0, 0)).unwrap();
    let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![150.5, 149.0]);
    assert_eq!(readings[1].timestamp, at(3, 8, 30));
}

#[test]
#[ignore]
fn test_empty_rainfall_table_has_no_bounds() {
    let mut client = test_client();
    client
        .batch_execute("CREATE TEMP TABLE \"CNV\" (\"MeasurementTimestamp\" TIMESTAMP, \"Rainfall\" NUMERIC)")
        .unwrap();

    let location = TableId::parse("WAGG01").unwrap();
    let mut store = PgSeriesStore::from_client(client, SeriesSpec::cnv_rainfall().unwrap());
    assert_eq!(store.earliest(location).unwrap(), None);
    assert!(store.readings(location, at(1, 0, 0), at(8, 0, 0)).unwrap().is_empty());
}
