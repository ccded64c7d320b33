/// District of North Vancouver Flowworks flow-meter exports.
///
/// The export is a single JSON document:
/// `{"datapoints":[{"date":"2021-03-29T14:00:00","value":11.46656}, ...]}`.
/// Gaps in the record come through as a `null` value (sometimes the string
/// `"null"`) and are stored as NULL.

use super::DumpSource;
use crate::entry::{
    FieldMap, RawRecord, RecordValidator, SourceFormat, is_null_text, parse_number, parse_timestamp, require,
    resolve_destination,
};
use crate::error::{IngestError, ValidationError};
use crate::importer::{FieldMapping, Schema};
use crate::locations::{DNV_SITE, TableId};
use serde::Deserialize;
use serde_json::Value;

pub const DATE_FIELD: &str = "date";
pub const VALUE_FIELD: &str = "value";

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Deserialize)]
struct DumpFile {
    datapoints: Vec<serde_json::Map<String, Value>>,
}

fn json_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

pub struct FlowworksValidator;

impl RecordValidator for FlowworksValidator {
    fn format(&self) -> SourceFormat {
        SourceFormat::Flowworks
    }

    fn check(&self, raw: &RawRecord) -> Result<(), ValidationError> {
        parse_timestamp(DATE_FIELD, require(raw, DATE_FIELD)?, TIMESTAMP_FORMATS)?;
        if let Some(value) = raw.get(VALUE_FIELD).filter(|v| !is_null_text(v)) {
            parse_number(VALUE_FIELD, value)?;
        }
        Ok(())
    }

    fn nullable_fields(&self) -> &[&str] {
        &[VALUE_FIELD]
    }

    fn destination(&self, _fields: &FieldMap) -> Result<TableId, ValidationError> {
        resolve_destination("site", Some(DNV_SITE))
    }
}

pub struct FlowworksDump;

impl DumpSource for FlowworksDump {
    fn format(&self) -> SourceFormat {
        SourceFormat::Flowworks
    }

    fn schema(&self) -> Schema {
        Schema::new(&[DATE_FIELD, VALUE_FIELD])
    }

    fn mapping(&self) -> Option<FieldMapping> {
        Some(FieldMapping::new(&[
            (DATE_FIELD, "MeasurementTimestamp"),
            (VALUE_FIELD, "FlowReading"),
        ]))
    }

    fn read_dump(&self, text: &str) -> Result<Vec<RawRecord>, IngestError> {
        let dump: DumpFile = serde_json::from_str(text)?;
        Ok(dump
            .datapoints
            .into_iter()
            .map(|point| point.into_iter().map(|(k, v)| (k, json_text(v))).collect::<RawRecord>())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationReason;

    const DUMP: &str = r#"{"datapoints":[
        {"date":"2021-03-29T14:00:00","value":11.46656},
        {"date":"2021-03-29T14:05:00","value":null},
        {"date":"2021-03-29T14:10:00","value":"null"},
        {"date":"","value":3.2}
    ]}"#;

    #[test]
    fn test_read_dump_converts_values_to_text() {
        let records = FlowworksDump.read_dump(DUMP).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].get(VALUE_FIELD), Some("11.46656"));
        assert!(records[1].contains(VALUE_FIELD));
        assert_eq!(records[1].get(VALUE_FIELD), None);
        assert_eq!(records[2].get(VALUE_FIELD), Some("null"));
    }

    #[test]
    fn test_null_values_are_stored_as_null() {
        let records = FlowworksDump.read_dump(DUMP).unwrap();
        for raw in &records[1..3] {
            let entry = FlowworksValidator.validate(raw).unwrap();
            assert!(!entry.is_defined(VALUE_FIELD));
            assert_eq!(entry.destination().as_str(), "DNV");
        }
    }

    #[test]
    fn test_missing_date_rejected() {
        let records = FlowworksDump.read_dump(DUMP).unwrap();
        let err = FlowworksValidator.validate(&records[3]).unwrap_err();
        assert_eq!(err.field, DATE_FIELD);
        assert_eq!(err.reason, ValidationReason::Missing);
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let raw: RawRecord = [(DATE_FIELD, Some("2021-03-29T14:00:00")), (VALUE_FIELD, Some("high"))]
            .into_iter()
            .collect();
        assert_eq!(
            FlowworksValidator.validate(&raw).unwrap_err().reason,
            ValidationReason::NotNumeric
        );
    }

    #[test]
    fn test_malformed_json_is_an_ingest_error() {
        assert!(matches!(
            FlowworksDump.read_dump(r#"{"points":[]}"#),
            Err(IngestError::Json(_))
        ));
    }
}
