/// City of North Vancouver rain gauge exports.
///
/// The export carries two metadata lines above the CSV header and uses
/// column names the database can't take as-is, so every dump field is mapped
/// to a plain column name. All rows go to the fixed `CNV` table.

use super::{DumpSource, read_csv_records};
use crate::entry::{
    FieldMap, RawRecord, RecordValidator, SourceFormat, is_null_text, parse_in_range, parse_non_negative,
    parse_timestamp, require, resolve_destination,
};
use crate::error::{IngestError, ValidationError};
use crate::importer::{FieldMapping, Schema};
use crate::locations::{CNV_SITE, TableId};

pub const TIMESTAMP_FIELD: &str = "yyyy/MM/dd HH:mm:ss";
pub const AIR_TEMPERATURE_FIELD: &str = "Air Temperature - 5 min Intervals (°C)";
pub const BAROMETER_FIELD: &str = "Barometer 5 min Intervals (mbar)";
pub const HOURLY_RAINFALL_FIELD: &str = "Hourly Rainfall (mm)";
pub const RAINFALL_FIELD: &str = "Rainfall (mm)";

/// Dump fields in column order.
pub const CNV_RAINFALL_DUMP_SCHEMA: &[&str] = &[
    TIMESTAMP_FIELD,
    AIR_TEMPERATURE_FIELD,
    BAROMETER_FIELD,
    HOURLY_RAINFALL_FIELD,
    RAINFALL_FIELD,
];

/// Table columns, parallel to `CNV_RAINFALL_DUMP_SCHEMA`.
pub const CNV_RAINFALL_DB_SCHEMA: &[&str] = &[
    "MeasurementTimestamp",
    "AirTemperature",
    "BarometricPressure",
    "HourlyRainfall",
    "Rainfall",
];

const METADATA_LINES: usize = 2;
const TIMESTAMP_FORMATS: &[&str] = &["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const BAROMETER_RANGE: (f64, f64) = (800.0, 1200.0);
const AIR_TEMPERATURE_RANGE: (f64, f64) = (-80.0, 80.0);

pub struct CnvRainfallValidator;

impl RecordValidator for CnvRainfallValidator {
    fn format(&self) -> SourceFormat {
        SourceFormat::CnvRainfall
    }

    fn check(&self, raw: &RawRecord) -> Result<(), ValidationError> {
        let timestamp = require(raw, TIMESTAMP_FIELD)?;
        parse_timestamp(TIMESTAMP_FIELD, timestamp, TIMESTAMP_FORMATS)?;

        parse_non_negative(RAINFALL_FIELD, require(raw, RAINFALL_FIELD)?)?;

        if let Some(hourly) = raw.get(HOURLY_RAINFALL_FIELD).filter(|v| !is_null_text(v)) {
            parse_non_negative(HOURLY_RAINFALL_FIELD, hourly)?;
        }
        let temp = require(raw, AIR_TEMPERATURE_FIELD)?;
        parse_in_range(AIR_TEMPERATURE_FIELD, temp, AIR_TEMPERATURE_RANGE.0, AIR_TEMPERATURE_RANGE.1)?;
        let pressure = require(raw, BAROMETER_FIELD)?;
        parse_in_range(BAROMETER_FIELD, pressure, BAROMETER_RANGE.0, BAROMETER_RANGE.1)?;
        Ok(())
    }

    fn nullable_fields(&self) -> &[&str] {
        &[HOURLY_RAINFALL_FIELD]
    }

    fn destination(&self, _fields: &FieldMap) -> Result<TableId, ValidationError> {
        resolve_destination("site", Some(CNV_SITE))
    }
}

pub struct CnvRainfallDump;

impl DumpSource for CnvRainfallDump {
    fn format(&self) -> SourceFormat {
        SourceFormat::CnvRainfall
    }

    fn schema(&self) -> Schema {
        Schema::new(CNV_RAINFALL_DUMP_SCHEMA)
    }

    fn mapping(&self) -> Option<FieldMapping> {
        let pairs: Vec<(&str, &str)> = CNV_RAINFALL_DUMP_SCHEMA
            .iter()
            .copied()
            .zip(CNV_RAINFALL_DB_SCHEMA.iter().copied())
            .collect();
        Some(FieldMapping::new(&pairs))
    }

    fn read_dump(&self, text: &str) -> Result<Vec<RawRecord>, IngestError> {
        read_csv_records(text, METADATA_LINES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationReason;

    fn record(rainfall: &str, hourly: &str) -> RawRecord {
        [
            (TIMESTAMP_FIELD, Some("2024/03/28 07:30:00")),
            (AIR_TEMPERATURE_FIELD, Some("6.4")),
            (BAROMETER_FIELD, Some("1012.3")),
            (HOURLY_RAINFALL_FIELD, Some(hourly)),
            (RAINFALL_FIELD, Some(rainfall)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_valid_row_goes_to_cnv() {
        let entry = CnvRainfallValidator.validate(&record("0.2", "")).unwrap();
        assert_eq!(entry.destination().as_str(), "CNV");
        assert!(!entry.is_defined(HOURLY_RAINFALL_FIELD));
        assert_eq!(entry.get(RAINFALL_FIELD), Some("0.2"));
    }

    #[test]
    fn test_negative_rainfall_rejected() {
        let err = CnvRainfallValidator.validate(&record("-0.2", "")).unwrap_err();
        assert_eq!(err.field, RAINFALL_FIELD);
        assert_eq!(err.reason, ValidationReason::Negative);
    }

    #[test]
    fn test_missing_rainfall_rejected() {
        let err = CnvRainfallValidator.validate(&record("", "1.0")).unwrap_err();
        assert_eq!(err.field, RAINFALL_FIELD);
        assert_eq!(err.reason, ValidationReason::Missing);
    }

    #[test]
    fn test_negative_hourly_rainfall_rejected() {
        let err = CnvRainfallValidator.validate(&record("0", "-1")).unwrap_err();
        assert_eq!(err.field, HOURLY_RAINFALL_FIELD);
    }

    #[test]
    fn test_barometer_bounds() {
        let mut raw = record("0", "");
        raw.set(BAROMETER_FIELD, Some("1300".to_string()));
        let err = CnvRainfallValidator.validate(&raw).unwrap_err();
        assert_eq!(err.field, BAROMETER_FIELD);
        assert!(matches!(err.reason, ValidationReason::OutOfRange { .. }));
    }

    #[test]
    fn test_blank_weather_fields_rejected() {
        let mut raw = record("0", "");
        raw.set(AIR_TEMPERATURE_FIELD, Some("  ".to_string()));
        let err = CnvRainfallValidator.validate(&raw).unwrap_err();
        assert_eq!(err.field, AIR_TEMPERATURE_FIELD);
        assert_eq!(err.reason, ValidationReason::Missing);

        let mut raw = record("0", "");
        raw.set(BAROMETER_FIELD, Some(String::new()));
        let err = CnvRainfallValidator.validate(&raw).unwrap_err();
        assert_eq!(err.field, BAROMETER_FIELD);
        assert_eq!(err.reason, ValidationReason::Missing);

        raw.set(BAROMETER_FIELD, Some("n/a".to_string()));
        assert_eq!(
            CnvRainfallValidator.validate(&raw).unwrap_err().reason,
            ValidationReason::NotNumeric
        );
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let mut raw = record("0", "");
        raw.set(TIMESTAMP_FIELD, Some("28/03/2024".to_string()));
        assert_eq!(
            CnvRainfallValidator.validate(&raw).unwrap_err().reason,
            ValidationReason::NotTimestamp
        );
    }

    #[test]
    fn test_dump_skips_metadata_lines() {
        let text = "\
North Vancouver City Hall
Exported 2024-03-28 07:33:12
yyyy/MM/dd HH:mm:ss,Air Temperature - 5 min Intervals (°C),Barometer 5 min Intervals (mbar),Hourly Rainfall (mm),Rainfall (mm)
2024/03/28 07:25:00,6.3,1012.2,,0
2024/03/28 07:30:00,6.4,1012.3,0.2,0.2
";
        let records = CnvRainfallDump.read_dump(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get(RAINFALL_FIELD), Some("0.2"));
        assert!(records.iter().all(|r| CnvRainfallValidator.validate(r).is_ok()));
    }

    #[test]
    fn test_mapping_covers_schema() {
        let mapping = CnvRainfallDump.mapping().unwrap();
        for field in CNV_RAINFALL_DUMP_SCHEMA {
            assert!(mapping.column_for(field).is_some(), "{} unmapped", field);
        }
        assert_eq!(mapping.column_for(TIMESTAMP_FIELD), Some("MeasurementTimestamp"));
    }
}
