/// Record validation and normalization.
///
/// Front-ends hand over `RawRecord`s (field name → string or null). A
/// `RecordValidator` checks a record against source-specific rules and, on
/// success, produces a `NormalizedEntry`: every value scrubbed of SQL-hostile
/// characters, optional empties coerced to null, and a destination table
/// resolved against the location registry.

use crate::error::{ValidationError, ValidationReason};
use crate::locations::TableId;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

/// Characters stripped from every normalized value.
pub const SCRUBBED_CHARS: &[char] = &['[', ']', '\'', '"', '$', '#', '@', '!', '{', '}', ',', '|'];

// ---------------------------------------------------------------------------
// Field maps
// ---------------------------------------------------------------------------

/// Ordered mapping of field name to optional string value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    fields: Vec<(String, Option<String>)>,
}

/// A record as produced by a CSV/JSON front-end.
pub type RawRecord = FieldMap;

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, replacing an existing value in place or appending.
    pub fn set(&mut self, name: &str, value: Option<String>) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Value of `name`; `None` if the field is absent or null.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, Option<V>)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            let key: String = k.into();
            map.set(&key, v.map(Into::into));
        }
        map
    }
}

impl fmt::Display for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                Some(v) => write!(f, "{}: {:?}", name, v)?,
                None => write!(f, "{}: null", name)?,
            }
        }
        write!(f, "}}")
    }
}

/// Empty, blank, or the literal text `null` in any case.
pub fn is_null_text(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v.eq_ignore_ascii_case("null")
}

/// Removes every character in `SCRUBBED_CHARS`. Idempotent.
pub fn scrub(value: &str) -> String {
    value.chars().filter(|c| !SCRUBBED_CHARS.contains(c)).collect()
}

// ---------------------------------------------------------------------------
// Normalized entries
// ---------------------------------------------------------------------------

/// A validated, scrubbed record bound to its destination table.
///
/// Only `RecordValidator::validate` builds these, so holding one proves the
/// record passed its source's rules.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    fields: FieldMap,
    destination: TableId,
}

impl NormalizedEntry {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name)
    }

    /// `true` when the field is present and not null.
    pub fn is_defined(&self, name: &str) -> bool {
        self.fields.get(name).is_some()
    }

    pub fn destination(&self) -> TableId {
        self.destination
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// Source formats the service knows how to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Cosmo,
    CnvRainfall,
    Flowworks,
    /// Correlated conductivity/rainfall rows for one location.
    ConductivityRainfall(TableId),
}

impl SourceFormat {
    /// The validator implementing this format's rules.
    pub fn validator(self) -> Box<dyn RecordValidator> {
        match self {
            SourceFormat::Cosmo => Box::new(crate::ingest::cosmo::CosmoValidator),
            SourceFormat::CnvRainfall => Box::new(crate::ingest::cnv::CnvRainfallValidator),
            SourceFormat::Flowworks => Box::new(crate::ingest::flowworks::FlowworksValidator),
            SourceFormat::ConductivityRainfall(location) => {
                Box::new(crate::correlate::entry::CorrelationValidator::new(location))
            }
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Cosmo => write!(f, "cosmo"),
            SourceFormat::CnvRainfall => write!(f, "cnv-rainfall"),
            SourceFormat::Flowworks => write!(f, "flowworks"),
            SourceFormat::ConductivityRainfall(_) => write!(f, "conductivity-rainfall-correlation"),
        }
    }
}

/// Source-specific validation rules.
///
/// Implementors supply `check` and `destination`; `validate` ties them
/// together with scrubbing and null coercion.
pub trait RecordValidator {
    fn format(&self) -> SourceFormat;

    /// Structural and semantic checks against the raw, unscrubbed record.
    fn check(&self, raw: &RawRecord) -> Result<(), ValidationError>;

    /// Fields stored as NULL when blank or spelled `null`.
    fn nullable_fields(&self) -> &[&str] {
        &[]
    }

    /// Resolves the destination table from the scrubbed fields.
    fn destination(&self, fields: &FieldMap) -> Result<TableId, ValidationError>;

    fn validate(&self, raw: &RawRecord) -> Result<NormalizedEntry, ValidationError> {
        self.check(raw)?;

        let nullable = self.nullable_fields();
        let mut fields = FieldMap::new();
        for (name, value) in raw.iter() {
            let value = match value {
                Some(v) if nullable.contains(&name) && is_null_text(v) => None,
                Some(v) => Some(scrub(v)),
                None => None,
            };
            fields.set(name, value);
        }

        let destination = self.destination(&fields)?;
        Ok(NormalizedEntry { fields, destination })
    }
}

// ---------------------------------------------------------------------------
// Field checks shared by validators
// ---------------------------------------------------------------------------

/// Returns the trimmed value of a required field.
pub fn require<'a>(raw: &'a RawRecord, field: &str) -> Result<&'a str, ValidationError> {
    match raw.get(field).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        other => Err(ValidationError::new(field, other, ValidationReason::Missing)),
    }
}

/// Parses a numeric field. NaN and infinities are rejected.
pub fn parse_number(field: &str, value: &str) -> Result<f64, ValidationError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::new(field, Some(value), ValidationReason::NotNumeric))
}

/// Parses a date-time field against each of `formats` in turn.
pub fn parse_timestamp(field: &str, value: &str, formats: &[&str]) -> Result<NaiveDateTime, ValidationError> {
    formats
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value.trim(), f).ok())
        .ok_or_else(|| ValidationError::new(field, Some(value), ValidationReason::NotTimestamp))
}

/// Date-only counterpart of `parse_timestamp`.
pub fn parse_date(field: &str, value: &str, formats: &[&str]) -> Result<NaiveDate, ValidationError> {
    formats
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(value.trim(), f).ok())
        .ok_or_else(|| ValidationError::new(field, Some(value), ValidationReason::NotTimestamp))
}

/// Time-of-day counterpart of `parse_timestamp`.
pub fn parse_time(field: &str, value: &str, formats: &[&str]) -> Result<NaiveTime, ValidationError> {
    formats
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(value.trim(), f).ok())
        .ok_or_else(|| ValidationError::new(field, Some(value), ValidationReason::NotTimestamp))
}

/// Parses a numeric field and checks it lies in `[min, max]`.
pub fn parse_in_range(field: &str, value: &str, min: f64, max: f64) -> Result<f64, ValidationError> {
    let v = parse_number(field, value)?;
    if v < min || v > max {
        return Err(ValidationError::new(
            field,
            Some(value),
            ValidationReason::OutOfRange { min, max },
        ));
    }
    Ok(v)
}

/// Parses a numeric field that must be zero or positive.
pub fn parse_non_negative(field: &str, value: &str) -> Result<f64, ValidationError> {
    let v = parse_number(field, value)?;
    if v < 0.0 {
        return Err(ValidationError::new(field, Some(value), ValidationReason::Negative));
    }
    Ok(v)
}

/// Resolves a location id to a destination, reporting failures against `field`.
pub fn resolve_destination(field: &str, id: Option<&str>) -> Result<TableId, ValidationError> {
    let id = id.ok_or_else(|| ValidationError::new(field, None, ValidationReason::Missing))?;
    TableId::parse(id)
        .map_err(|_| ValidationError::new(field, Some(id), ValidationReason::UnknownDestination))
}
