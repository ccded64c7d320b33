/// PostgreSQL execution target for the batch importer.
///
/// A failed statement poisons a PostgreSQL transaction, so each insert runs
/// under its own savepoint. A failure rolls back to the savepoint and the
/// surrounding commit batch carries on.

use super::{ImportReport, Importer, InsertOperation, InsertTarget};
use crate::config::DbConfig;
use crate::db;
use crate::error::{ConnectionError, ImportError, InsertFailure};
use postgres::error::SqlState;
use postgres::{Client, Statement};
use std::collections::HashMap;

const SAVEPOINT: &str = "nssk_insert";

pub struct PgInsertTarget {
    client: Client,
    in_transaction: bool,
    statements: HashMap<String, Statement>,
}

impl PgInsertTarget {
    pub fn connect(config: &DbConfig) -> Result<Self, ConnectionError> {
        Ok(Self::from_client(db::connect(config)?))
    }

    pub fn from_client(client: Client) -> Self {
        PgInsertTarget {
            client,
            in_transaction: false,
            statements: HashMap::new(),
        }
    }

    /// Gives the session back. Any open transaction is left open.
    pub fn into_client(self) -> Client {
        self.client
    }

    fn control(&mut self, sql: &str) -> Result<(), ConnectionError> {
        self.client
            .batch_execute(sql)
            .map_err(|e| ConnectionError(format!("{}: {}", sql, e)))
    }

    fn prepared(&mut self, sql: String) -> Result<Statement, InsertFailure> {
        if let Some(statement) = self.statements.get(&sql) {
            return Ok(statement.clone());
        }
        let statement = self.client.prepare(&sql).map_err(|e| classify_failure(&e))?;
        self.statements.insert(sql, statement.clone());
        Ok(statement)
    }
}

impl InsertTarget for PgInsertTarget {
    fn insert(&mut self, operation: &InsertOperation) -> Result<(), InsertFailure> {
        if !self.in_transaction {
            self.control("BEGIN")?;
            self.in_transaction = true;
        }
        self.control(&format!("SAVEPOINT {}", SAVEPOINT))?;

        let result = self
            .prepared(operation.statement())
            .and_then(|statement| {
                let row = operation.row_json();
                self.client
                    .execute(&statement, &[&row])
                    .map_err(|e| classify_failure(&e))
            });

        match result {
            Ok(_) => {
                self.control(&format!("RELEASE SAVEPOINT {}", SAVEPOINT))?;
                Ok(())
            }
            Err(InsertFailure::Connection(err)) => Err(InsertFailure::Connection(err)),
            Err(failure) => {
                self.control(&format!("ROLLBACK TO SAVEPOINT {}", SAVEPOINT))?;
                Err(failure)
            }
        }
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        if self.in_transaction {
            self.control("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

/// Unique-constraint violations are duplicates; a closed connection is
/// fatal; everything else is a per-statement error.
pub fn classify_failure(err: &postgres::Error) -> InsertFailure {
    match err.code() {
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => InsertFailure::Duplicate(err.to_string()),
        Some(_) => InsertFailure::Execution(err.to_string()),
        None if err.is_closed() => InsertFailure::Connection(ConnectionError(err.to_string())),
        None => InsertFailure::Execution(err.to_string()),
    }
}

impl Importer {
    /// Opens one connection from `config` and executes the pending batch.
    pub fn execute_postgres(&mut self, config: &DbConfig) -> Result<ImportReport, ImportError> {
        let mut target = PgInsertTarget::connect(config)?;
        self.execute(&mut target)
    }
}
