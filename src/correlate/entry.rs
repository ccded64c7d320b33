/// Correlated conductivity/rainfall rows.

use crate::entry::{
    FieldMap, RawRecord, RecordValidator, SourceFormat, parse_non_negative, parse_timestamp, require,
};
use crate::error::ValidationError;
use crate::locations::TableId;
use crate::model::{CorrelatedEntry, TIMESTAMP_FORMAT};

pub const COSMO_TIMESTAMP_FIELD: &str = "CosmoTimeStamp";
pub const CONDUCTANCE_FIELD: &str = "Conductance";
pub const RAINFALL_AMOUNT_FIELD: &str = "RainfallAmount";
pub const RAINFALL_TIMESTAMP_FIELD: &str = "RainfallTimeStamp";

/// Columns of every per-location correlation table. The rainfall timestamp
/// keeps fanned-out rows for one conductivity reading distinct.
pub const CORRELATION_SCHEMA: &[&str] = &[
    COSMO_TIMESTAMP_FIELD,
    CONDUCTANCE_FIELD,
    RAINFALL_AMOUNT_FIELD,
    RAINFALL_TIMESTAMP_FIELD,
];

pub const CORRELATION_IMPORTER_NAME: &str = "conductivity-rainfall-correlation";

/// Renders a pair as a raw record in `CORRELATION_SCHEMA` order.
pub fn to_record(entry: &CorrelatedEntry) -> RawRecord {
    [
        (COSMO_TIMESTAMP_FIELD, entry.reference.timestamp.format(TIMESTAMP_FORMAT).to_string()),
        (CONDUCTANCE_FIELD, entry.reference.value.to_string()),
        (RAINFALL_AMOUNT_FIELD, entry.secondary.value.to_string()),
        (RAINFALL_TIMESTAMP_FIELD, entry.secondary.timestamp.format(TIMESTAMP_FORMAT).to_string()),
    ]
    .into_iter()
    .map(|(name, value)| (name, Some(value)))
    .collect()
}

/// Rules for correlated rows. The destination is fixed by the location being
/// correlated, not read from the record.
pub struct CorrelationValidator {
    location: TableId,
}

impl CorrelationValidator {
    pub fn new(location: TableId) -> Self {
        CorrelationValidator { location }
    }
}

impl RecordValidator for CorrelationValidator {
    fn format(&self) -> SourceFormat {
        SourceFormat::ConductivityRainfall(self.location)
    }

    fn check(&self, raw: &RawRecord) -> Result<(), ValidationError> {
        parse_timestamp(COSMO_TIMESTAMP_FIELD, require(raw, COSMO_TIMESTAMP_FIELD)?, &[TIMESTAMP_FORMAT])?;
        parse_non_negative(CONDUCTANCE_FIELD, require(raw, CONDUCTANCE_FIELD)?)?;
        parse_non_negative(RAINFALL_AMOUNT_FIELD, require(raw, RAINFALL_AMOUNT_FIELD)?)?;
        if let Some(ts) = raw.get(RAINFALL_TIMESTAMP_FIELD) {
            parse_timestamp(RAINFALL_TIMESTAMP_FIELD, ts, &[TIMESTAMP_FORMAT])?;
        }
        Ok(())
    }

    fn destination(&self, _fields: &FieldMap) -> Result<TableId, ValidationError> {
        Ok(self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationReason;
    use crate::model::Reading;
    use chrono::NaiveDate;

    fn pair(conductance: f64, rainfall: f64) -> CorrelatedEntry {
        let ts = NaiveDate::from_ymd_opt(2023, 10, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        CorrelatedEntry {
            reference: Reading::new(ts, conductance),
            secondary: Reading::new(ts + chrono::Duration::minutes(3), rainfall),
        }
    }

    fn validator() -> CorrelationValidator {
        CorrelationValidator::new(TableId::parse("WAGG02").unwrap())
    }

    #[test]
    fn test_record_renders_schema_fields() {
        let raw = to_record(&pair(152.5, 0.2));
        let names: Vec<_> = raw.iter().map(|(n, _)| n).collect();
        assert_eq!(names, CORRELATION_SCHEMA);
        assert_eq!(raw.get(COSMO_TIMESTAMP_FIELD), Some("2023-10-01 12:00:00"));
        assert_eq!(raw.get(RAINFALL_TIMESTAMP_FIELD), Some("2023-10-01 12:03:00"));
        assert_eq!(raw.get(CONDUCTANCE_FIELD), Some("152.5"));
    }

    #[test]
    fn test_valid_pair_routes_to_location() {
        let entry = validator().validate(&to_record(&pair(152.5, 0.0))).unwrap();
        assert_eq!(entry.destination().as_str(), "WAGG02");
    }

    #[test]
    fn test_negative_values_rejected() {
        let err = validator().validate(&to_record(&pair(-1.0, 0.2))).unwrap_err();
        assert_eq!(err.field, CONDUCTANCE_FIELD);
        assert_eq!(err.reason, ValidationReason::Negative);

        let err = validator().validate(&to_record(&pair(10.0, -0.2))).unwrap_err();
        assert_eq!(err.field, RAINFALL_AMOUNT_FIELD);
    }

    #[test]
    fn test_missing_timestamp_rejected() {
        let mut raw = to_record(&pair(1.0, 1.0));
        raw.set(COSMO_TIMESTAMP_FIELD, None);
        let err = validator().validate(&raw).unwrap_err();
        assert_eq!(err.field, COSMO_TIMESTAMP_FIELD);
        assert_eq!(err.reason, ValidationReason::Missing);
    }
}
