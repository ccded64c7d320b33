/// CoSMo (Community Stream Monitoring) water-quality dumps.
///
/// The open-data CSV mixes several datasets and many stations. Only rows from
/// the CoSMo dataset at registered sensors are imported; each lands in the
/// table named after its `MonitoringLocationID`.

use super::{DumpSource, read_csv_records};
use crate::entry::{
    FieldMap, RawRecord, RecordValidator, SourceFormat, is_null_text, parse_date, parse_in_range,
    parse_non_negative, parse_number, parse_time, require, resolve_destination,
};
use crate::error::{IngestError, ValidationError, ValidationReason};
use crate::importer::Schema;
use crate::locations::{LocationKind, TableId, find_location};

pub const DATASET_NAME_FIELD: &str = "DatasetName";
pub const COSMO_DATASET_NAME: &str = "DFO PSEC Community Stream Monitoring (CoSMo)";
pub const LOCATION_ID_FIELD: &str = "MonitoringLocationID";

/// Dump columns, which are also the table columns.
pub const COSMO_SCHEMA: &[&str] = &[
    "DatasetName",
    "MonitoringLocationID",
    "MonitoringLocationName",
    "MonitoringLocationLatitude",
    "MonitoringLocationLongitude",
    "MonitoringLocationHorizontalCoordinateReferenceSystem",
    "MonitoringLocationHorizontalAccuracyMeasure",
    "MonitoringLocationHorizontalAccuracyUnit",
    "MonitoringLocationVerticalMeasure",
    "MonitoringLocationVerticalUnit",
    "MonitoringLocationType",
    "ActivityType",
    "ActivityMediaName",
    "ActivityStartDate",
    "ActivityStartTime",
    "ActivityEndDate",
    "ActivityEndTime",
    "ActivityDepthHeightMeasure",
    "ActivityDepthHeightUnit",
    "SampleCollectionEquipmentName",
    "CharacteristicName",
    "MethodSpeciation",
    "ResultSampleFraction",
    "ResultValue",
    "ResultUnit",
    "ResultValueType",
    "ResultDetectionCondition",
    "ResultDetectionQuantitationLimitMeasure",
    "ResultDetectionQuantitationLimitUnit",
    "ResultDetectionQuantitationLimitType",
    "ResultStatusID",
    "ResultComment",
    "ResultAnalyticalMethodID",
    "ResultAnalyticalMethodContext",
    "ResultAnalyticalMethodName",
    "AnalysisStartDate",
    "AnalysisStartTime",
    "AnalysisStartTimeZone",
    "LaboratoryName",
    "LaboratorySampleID",
];

/// Part of the table's uniqueness key, so stored as NULL rather than ''.
const NULLABLE_FIELDS: &[&str] = &["ActivityEndDate", "ActivityEndTime", "AnalysisStartDate", "AnalysisStartTime"];

const TEMPERATURE_RANGE: (f64, f64) = (-80.0, 80.0);

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Optional date and time columns. Checked only when a value is given.
const OPTIONAL_DATES: &[&str] = &["ActivityEndDate", "AnalysisStartDate"];
const OPTIONAL_TIMES: &[&str] = &["ActivityEndTime", "AnalysisStartTime"];

fn is_cosmo_sensor(id: &str) -> bool {
    find_location(id).is_some_and(|l| l.kind == LocationKind::CosmoSensor)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub struct CosmoValidator;

impl RecordValidator for CosmoValidator {
    fn format(&self) -> SourceFormat {
        SourceFormat::Cosmo
    }

    fn check(&self, raw: &RawRecord) -> Result<(), ValidationError> {
        require(raw, LOCATION_ID_FIELD)?;
        // The correlator reads start date + start time as the reading's timestamp.
        parse_date("ActivityStartDate", require(raw, "ActivityStartDate")?, DATE_FORMATS)?;
        parse_time("ActivityStartTime", require(raw, "ActivityStartTime")?, TIME_FORMATS)?;
        for field in OPTIONAL_DATES {
            if let Some(date) = raw.get(field).filter(|v| !is_null_text(v)) {
                parse_date(field, date, DATE_FORMATS)?;
            }
        }
        for field in OPTIONAL_TIMES {
            if let Some(time) = raw.get(field).filter(|v| !is_null_text(v)) {
                parse_time(field, time, TIME_FORMATS)?;
            }
        }
        let characteristic = require(raw, "CharacteristicName")?.to_ascii_lowercase();
        let result = require(raw, "ResultValue")?;

        if characteristic.contains("temperature") {
            parse_in_range("ResultValue", result, TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1)?;
        } else if characteristic.contains("conductivity") || characteristic.contains("conductance") {
            parse_non_negative("ResultValue", result)?;
        } else {
            parse_number("ResultValue", result)?;
        }

        if let Some(lat) = raw.get("MonitoringLocationLatitude").filter(|v| !v.trim().is_empty()) {
            parse_in_range("MonitoringLocationLatitude", lat, -90.0, 90.0)?;
        }
        if let Some(lon) = raw.get("MonitoringLocationLongitude").filter(|v| !v.trim().is_empty()) {
            parse_in_range("MonitoringLocationLongitude", lon, -180.0, 180.0)?;
        }
        Ok(())
    }

    fn nullable_fields(&self) -> &[&str] {
        NULLABLE_FIELDS
    }

    fn destination(&self, fields: &FieldMap) -> Result<TableId, ValidationError> {
        let id = fields.get(LOCATION_ID_FIELD);
        let table = resolve_destination(LOCATION_ID_FIELD, id)?;
        if table.location().kind != LocationKind::CosmoSensor {
            return Err(ValidationError::new(LOCATION_ID_FIELD, id, ValidationReason::UnknownDestination));
        }
        Ok(table)
    }
}

// ---------------------------------------------------------------------------
// Dump
// ---------------------------------------------------------------------------

pub struct CosmoDump;

impl DumpSource for CosmoDump {
    fn format(&self) -> SourceFormat {
        SourceFormat::Cosmo
    }

    fn schema(&self) -> Schema {
        Schema::new(COSMO_SCHEMA)
    }

    fn read_dump(&self, text: &str) -> Result<Vec<RawRecord>, IngestError> {
        read_csv_records(text, 0)
    }

    fn wants(&self, raw: &RawRecord) -> bool {
        raw.get(DATASET_NAME_FIELD) == Some(COSMO_DATASET_NAME)
            && raw.get(LOCATION_ID_FIELD).is_some_and(is_cosmo_sensor)
    }
}
