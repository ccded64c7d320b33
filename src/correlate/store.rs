/// Time-series reads for the correlator.

use crate::config::DbConfig;
use crate::db;
use crate::error::{ConfigurationError, ConnectionError, StoreError};
use crate::locations::{CNV_SITE, TableId};
use crate::model::Reading;
use chrono::NaiveDateTime;
use postgres::Client;
use postgres::types::ToSql;

/// Read access to one series, keyed by location.
///
/// `readings` returns rows with `from <= timestamp < to`, ordered by
/// timestamp.
pub trait SeriesStore {
    fn earliest(&mut self, location: TableId) -> Result<Option<NaiveDateTime>, StoreError>;

    fn latest(&mut self, location: TableId) -> Result<Option<NaiveDateTime>, StoreError>;

    fn readings(
        &mut self,
        location: TableId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Reading>, StoreError>;
}

// ---------------------------------------------------------------------------
// Series definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SeriesTable {
    /// One table per location, named after it.
    PerLocation,
    /// One shared table regardless of location.
    Fixed(TableId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimestampColumns {
    Single(String),
    /// Separate date and time columns, combined in the query.
    DateTime { date: String, time: String },
}

/// Where a series lives and how to read `(timestamp, value)` out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSpec {
    pub table: SeriesTable,
    pub timestamp: TimestampColumns,
    pub value: String,
    /// Optional `column = value` row filter.
    pub filter: Option<(String, String)>,
}

fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl SeriesSpec {
    /// CoSMo specific conductance from the per-sensor tables.
    pub fn cosmo_specific_conductance() -> Self {
        SeriesSpec {
            table: SeriesTable::PerLocation,
            timestamp: TimestampColumns::DateTime {
                date: "ActivityStartDate".to_string(),
                time: "ActivityStartTime".to_string(),
            },
            value: "ResultValue".to_string(),
            filter: Some(("CharacteristicName".to_string(), "Specific conductance".to_string())),
        }
    }

    /// CNV rainfall from the fixed `CNV` table.
    pub fn cnv_rainfall() -> Result<Self, ConfigurationError> {
        Ok(SeriesSpec {
            table: SeriesTable::Fixed(TableId::parse(CNV_SITE)?),
            timestamp: TimestampColumns::Single("MeasurementTimestamp".to_string()),
            value: "Rainfall".to_string(),
            filter: None,
        })
    }

    pub fn table_for(&self, location: TableId) -> TableId {
        match &self.table {
            SeriesTable::PerLocation => location,
            SeriesTable::Fixed(table) => *table,
        }
    }

    fn timestamp_expr(&self) -> String {
        match &self.timestamp {
            TimestampColumns::Single(column) => format!("{}::timestamp", ident(column)),
            TimestampColumns::DateTime { date, time } => {
                format!("({}::date + {}::time)", ident(date), ident(time))
            }
        }
    }

    /// `MIN`/`MAX` of the timestamp. The filter value, if any, is `$1`.
    pub fn bound_query(&self, location: TableId, aggregate: &str) -> String {
        let mut sql = format!(
            "SELECT {}({}) FROM {}",
            aggregate,
            self.timestamp_expr(),
            self.table_for(location).quoted()
        );
        if let Some((column, _)) = &self.filter {
            sql.push_str(&format!(" WHERE {} = $1", ident(column)));
        }
        sql
    }

    /// Rows in `[$1, $2)` ordered by timestamp. The filter value, if any, is
    /// `$3`. Rows with a NULL value are left out.
    pub fn range_query(&self, location: TableId) -> String {
        let ts = self.timestamp_expr();
        let value = ident(&self.value);
        let mut sql = format!(
            "SELECT {ts}, {value}::float8 FROM {} WHERE {ts} >= $1 AND {ts} < $2 AND {value} IS NOT NULL",
            self.table_for(location).quoted()
        );
        if let Some((column, _)) = &self.filter {
            sql.push_str(&format!(" AND {} = $3", ident(column)));
        }
        sql.push_str(" ORDER BY 1");
        sql
    }

    fn filter_value(&self) -> Option<&String> {
        self.filter.as_ref().map(|(_, value)| value)
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL store
// ---------------------------------------------------------------------------

pub struct PgSeriesStore {
    client: Client,
    spec: SeriesSpec,
}

impl PgSeriesStore {
    pub fn connect(config: &DbConfig, spec: SeriesSpec) -> Result<Self, ConnectionError> {
        Ok(PgSeriesStore {
            client: db::connect(config)?,
            spec,
        })
    }

    pub fn from_client(client: Client, spec: SeriesSpec) -> Self {
        PgSeriesStore { client, spec }
    }

    fn bound(&mut self, location: TableId, aggregate: &str) -> Result<Option<NaiveDateTime>, StoreError> {
        let sql = self.spec.bound_query(location, aggregate);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(value) = self.spec.filter_value() {
            params.push(value);
        }
        let row = self.client.query_one(&sql, &params).map_err(db::store_error)?;
        row.try_get(0).map_err(db::store_error)
    }
}

impl SeriesStore for PgSeriesStore {
    fn earliest(&mut self, location: TableId) -> Result<Option<NaiveDateTime>, StoreError> {
        self.bound(location, "MIN")
    }

    fn latest(&mut self, location: TableId) -> Result<Option<NaiveDateTime>, StoreError> {
        self.bound(location, "MAX")
    }

    fn readings(
        &mut self,
        location: TableId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        let sql = self.spec.range_query(location);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(3);
        params.push(&from);
        params.push(&to);
        if let Some(value) = self.spec.filter_value() {
            params.push(value);
        }

        self.client
            .query(&sql, &params)
            .map_err(db::store_error)?
            .iter()
            .map(|row| -> Result<Reading, StoreError> {
                Ok(Reading::new(
                    row.try_get(0).map_err(db::store_error)?,
                    row.try_get(1).map_err(db::store_error)?,
                ))
            })
            .collect()
    }
}
