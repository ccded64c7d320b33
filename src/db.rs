/// Database connections and catalog existence probes.

use crate::config::DbConfig;
use crate::error::{ConnectionError, CorrelationError, PreconditionError, StoreError};
use crate::locations::TableId;
use crate::logging::{Component, Logger};
use postgres::{Client, NoTls};

/// Opens a blocking connection with the resolved credentials.
pub fn connect(config: &DbConfig) -> Result<Client, ConnectionError> {
    postgres::Config::new()
        .host(&config.host)
        .port(config.port)
        .user(&config.user)
        .password(&config.password)
        .dbname(&config.database)
        .connect(NoTls)
        .map_err(|e| {
            ConnectionError(format!(
                "{}@{}:{}/{}: {}",
                config.user, config.host, config.port, config.database, e
            ))
        })
}

/// Maps a query failure to a store error, separating dead connections from
/// statement failures.
pub fn store_error(err: postgres::Error) -> StoreError {
    if err.is_closed() {
        StoreError::Connection(ConnectionError(err.to_string()))
    } else {
        StoreError::Query(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Existence probes
// ---------------------------------------------------------------------------

/// Catalog lookups used before a correlation run.
pub trait CatalogProbe {
    fn database_exists(&mut self, name: &str) -> Result<bool, StoreError>;

    /// Whether `table` exists in the database this probe is connected to.
    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError>;
}

impl CatalogProbe for Client {
    fn database_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        let row = self
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)",
                &[&name],
            )
            .map_err(store_error)?;
        Ok(row.get(0))
    }

    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        let row = self
            .query_one(
                "SELECT EXISTS (
                     SELECT 1 FROM information_schema.tables
                     WHERE table_schema = current_schema() AND table_name = $1
                 )",
                &[&table],
            )
            .map_err(store_error)?;
        Ok(row.get(0))
    }
}

/// Checks that the target database, every source database, and one
/// destination table per location exist. The probe must be connected to
/// the target database.
pub fn verify_correlation_targets<P: CatalogProbe + ?Sized>(
    probe: &mut P,
    target_database: &str,
    source_databases: &[&str],
    locations: &[TableId],
    logger: &Logger,
) -> Result<(), CorrelationError> {
    for database in std::iter::once(target_database).chain(source_databases.iter().copied()) {
        if !probe.database_exists(database)? {
            return Err(PreconditionError::MissingDatabase(database.to_string()).into());
        }
        logger.debug(Component::Database, None, &format!("Found database {}", database));
    }

    for location in locations {
        if !probe.table_exists(location.as_str())? {
            return Err(PreconditionError::MissingTable {
                table: location.to_string(),
                database: target_database.to_string(),
            }
            .into());
        }
        logger.debug(
            Component::Database,
            Some(location.as_str()),
            &format!("Found destination table in {}", target_database),
        );
    }
    Ok(())
}
