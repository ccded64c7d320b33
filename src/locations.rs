/// Monitoring location registry.
///
/// Defines the closed set of monitoring locations this service writes to.
/// Every destination table is named after a location in this registry, so
/// routing a record anywhere else is rejected when its `TableId` is built
/// rather than when the insert reaches the database.

use crate::error::ConfigurationError;
use std::fmt;

// ---------------------------------------------------------------------------
// Location metadata
// ---------------------------------------------------------------------------

/// What kind of instrument reports under a location id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    /// CoSMo community stream-monitoring water-quality sonde.
    CosmoSensor,
    /// City of North Vancouver rain gauge.
    RainGauge,
    /// District of North Vancouver Flowworks flow meter.
    FlowMeter,
}

/// Metadata for a single monitoring location.
#[derive(Debug)]
pub struct Location {
    /// Location id; doubles as the destination table name.
    pub id: &'static str,
    /// Watercourse or site the instrument sits on.
    pub site: &'static str,
    pub kind: LocationKind,
}

/// Rain gauge feeding the `CNV` rainfall table.
pub const CNV_SITE: &str = "CNV";

/// Flow meter feeding the `DNV` flow table.
pub const DNV_SITE: &str = "DNV";

/// All monitored locations, CoSMo sensors grouped by creek.
pub static LOCATION_REGISTRY: &[Location] = &[
    Location { id: "WAGG01", site: "Wagg Creek", kind: LocationKind::CosmoSensor },
    Location { id: "WAGG02", site: "Wagg Creek", kind: LocationKind::CosmoSensor },
    Location { id: "WAGG03", site: "Wagg Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MOSQ01", site: "Mosquito Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MOSQ02", site: "Mosquito Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MOSQ03", site: "Mosquito Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MOSQ04", site: "Mosquito Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MOSQ05", site: "Mosquito Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MOSQ06", site: "Mosquito Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MOSQ07", site: "Mosquito Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MISS01", site: "Mission Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MACK02", site: "Mackay Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MACK03", site: "Mackay Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MACK04", site: "Mackay Creek", kind: LocationKind::CosmoSensor },
    Location { id: "MACK05", site: "Mackay Creek", kind: LocationKind::CosmoSensor },
    Location { id: "HAST01", site: "Hastings Creek", kind: LocationKind::CosmoSensor },
    Location { id: "HAST02", site: "Hastings Creek", kind: LocationKind::CosmoSensor },
    Location { id: "HAST03", site: "Hastings Creek", kind: LocationKind::CosmoSensor },
    Location { id: CNV_SITE, site: "City of North Vancouver", kind: LocationKind::RainGauge },
    Location { id: DNV_SITE, site: "District of North Vancouver", kind: LocationKind::FlowMeter },
];

/// Locations correlated against CNV rainfall when none are configured.
pub const DEFAULT_CORRELATION_LOCATIONS: &[&str] = &["WAGG01", "WAGG02", "WAGG03"];

/// Looks up a location by id. Returns `None` if not found.
pub fn find_location(id: &str) -> Option<&'static Location> {
    LOCATION_REGISTRY.iter().find(|l| l.id == id)
}

/// Ids of every CoSMo sensor in the registry.
pub fn cosmo_sensor_ids() -> Vec<&'static str> {
    LOCATION_REGISTRY
        .iter()
        .filter(|l| l.kind == LocationKind::CosmoSensor)
        .map(|l| l.id)
        .collect()
}

// ---------------------------------------------------------------------------
// Destination tags
// ---------------------------------------------------------------------------

/// A destination table, guaranteed to name a registered location.
#[derive(Debug, Clone, Copy)]
pub struct TableId(&'static Location);

impl TableId {
    /// Resolves `id` against the registry.
    pub fn parse(id: &str) -> Result<TableId, ConfigurationError> {
        find_location(id)
            .map(TableId)
            .ok_or_else(|| ConfigurationError::UnknownLocation(id.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        self.0.id
    }

    /// The id as a double-quoted SQL identifier. Registry ids are
    /// alphanumeric, so no escaping is required.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0.id)
    }

    pub fn location(&self) -> &'static Location {
        self.0
    }
}

impl PartialEq for TableId {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for TableId {}

impl std::hash::Hash for TableId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosmo_ids_are_four_letters_two_digits() {
        for id in cosmo_sensor_ids() {
            assert_eq!(id.len(), 6, "sensor id '{}' should be 6 characters", id);
            assert!(id[..4].chars().all(|c| c.is_ascii_uppercase()), "bad prefix in '{}'", id);
            assert!(id[4..].chars().all(|c| c.is_ascii_digit()), "bad suffix in '{}'", id);
        }
    }

    #[test]
    fn test_no_duplicate_location_ids() {
        let mut seen = std::collections::HashSet::new();
        for location in LOCATION_REGISTRY {
            assert!(
                seen.insert(location.id),
                "duplicate location id '{}' found in LOCATION_REGISTRY",
                location.id
            );
        }
    }

    #[test]
    fn test_fixed_sites_have_expected_kinds() {
        assert_eq!(find_location(CNV_SITE).map(|l| l.kind), Some(LocationKind::RainGauge));
        assert_eq!(find_location(DNV_SITE).map(|l| l.kind), Some(LocationKind::FlowMeter));
    }

    #[test]
    fn test_default_correlation_locations_are_cosmo_sensors() {
        for id in DEFAULT_CORRELATION_LOCATIONS {
            let location = find_location(id).expect("default location should be registered");
            assert_eq!(location.kind, LocationKind::CosmoSensor);
        }
    }

    #[test]
    fn test_table_id_rejects_unknown_location() {
        assert!(TableId::parse("WAGG01").is_ok());
        assert!(matches!(
            TableId::parse("WAGG99"),
            Err(ConfigurationError::UnknownLocation(id)) if id == "WAGG99"
        ));
        // Injection attempts never become identifiers.
        assert!(TableId::parse("WAGG01\"; DROP TABLE x; --").is_err());
    }

    #[test]
    fn test_table_id_quoting_and_display() {
        let table = TableId::parse("HAST02").unwrap();
        assert_eq!(table.quoted(), "\"HAST02\"");
        assert_eq!(table.to_string(), "HAST02");
        assert_eq!(table.location().site, "Hastings Creek");
    }
}
