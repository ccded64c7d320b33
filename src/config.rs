/// Service configuration.
///
/// Database credentials come from a JSON file (the `host`/`port`/`user`/
/// `pass`/`dbname` layout used by the import scripts' `-cfg` files), from the
/// `[database]` table of a TOML service config, or from `NSSK_DB_*`
/// environment variables. Every credential is required; the first missing
/// one is reported by name.

use crate::correlate::{CorrelationConfig, ValidationPolicy};
use crate::error::ConfigurationError;
use crate::importer::DEFAULT_COMMIT_SIZE;
use crate::locations::{DEFAULT_CORRELATION_LOCATIONS, TableId};
use crate::logging::LogLevel;
use chrono::Duration;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Database credentials
// ---------------------------------------------------------------------------

/// A port given either as a number or as a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(i64),
    Text(String),
}

/// Credentials as they appear on disk, before presence checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDbConfig {
    host: Option<String>,
    port: Option<PortValue>,
    user: Option<String>,
    #[serde(alias = "password")]
    pass: Option<String>,
    #[serde(alias = "database")]
    dbname: Option<String>,
}

/// Fully resolved connection parameters.
#[derive(Clone, PartialEq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigurationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigurationError::MissingCredential(key)),
    }
}

impl RawDbConfig {
    pub fn resolve(self) -> Result<DbConfig, ConfigurationError> {
        let host = required(self.host, "host")?;
        let port = match self.port {
            None => return Err(ConfigurationError::MissingCredential("port")),
            Some(PortValue::Number(n)) => u16::try_from(n).map_err(|_| ConfigurationError::InvalidValue {
                key: "port",
                value: n.to_string(),
            })?,
            Some(PortValue::Text(s)) => s.trim().parse::<u16>().map_err(|_| ConfigurationError::InvalidValue {
                key: "port",
                value: s.clone(),
            })?,
        };
        Ok(DbConfig {
            host,
            port,
            user: required(self.user, "user")?,
            password: required(self.pass, "pass")?,
            database: required(self.dbname, "dbname")?,
        })
    }
}

impl DbConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let raw: RawDbConfig = serde_json::from_str(json).map_err(|e| ConfigurationError::Parse {
            path: PathBuf::from("<json>"),
            message: e.to_string(),
        })?;
        raw.resolve()
    }

    /// Reads `NSSK_DB_HOST`, `NSSK_DB_PORT`, `NSSK_DB_USER`,
    /// `NSSK_DB_PASSWORD` and `NSSK_DB_NAME` through `lookup`.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigurationError> {
        RawDbConfig {
            host: lookup("NSSK_DB_HOST"),
            port: lookup("NSSK_DB_PORT").map(PortValue::Text),
            user: lookup("NSSK_DB_USER"),
            pass: lookup("NSSK_DB_PASSWORD"),
            dbname: lookup("NSSK_DB_NAME"),
        }
        .resolve()
    }

    /// Credentials from the process environment, after loading `.env`.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same server and credentials, different database.
    pub fn with_database(&self, database: &str) -> DbConfig {
        DbConfig {
            database: database.to_string(),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Service settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImporterSettings {
    pub commit_size: usize,
    pub artifact_dir: PathBuf,
}

impl Default for ImporterSettings {
    fn default() -> Self {
        ImporterSettings {
            commit_size: DEFAULT_COMMIT_SIZE,
            artifact_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorrelationSettings {
    pub reference_database: String,
    pub secondary_database: String,
    pub increment_days: i64,
    pub margin_minutes: i64,
    pub locations: Vec<String>,
    /// Skip and collect invalid correlated entries instead of aborting.
    pub skip_invalid: bool,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        CorrelationSettings {
            reference_database: "NSSK_COSMO".to_string(),
            secondary_database: "NSSK_CNV_RAINFALL".to_string(),
            increment_days: 7,
            margin_minutes: 5,
            locations: DEFAULT_CORRELATION_LOCATIONS.iter().map(|s| s.to_string()).collect(),
            skip_invalid: false,
        }
    }
}

impl CorrelationSettings {
    /// Validates the settings into an engine configuration.
    pub fn to_correlation_config(&self) -> Result<CorrelationConfig, ConfigurationError> {
        if self.increment_days <= 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "increment_days",
                value: self.increment_days.to_string(),
            });
        }
        if self.margin_minutes < 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "margin_minutes",
                value: self.margin_minutes.to_string(),
            });
        }
        let locations = self
            .locations
            .iter()
            .map(|id| TableId::parse(id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CorrelationConfig {
            increment: Duration::days(self.increment_days),
            margin: Duration::minutes(self.margin_minutes),
            locations,
            policy: if self.skip_invalid {
                ValidationPolicy::SkipAndCollect
            } else {
                ValidationPolicy::Abort
            },
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl LoggingSettings {
    pub fn level(&self) -> Result<LogLevel, ConfigurationError> {
        match &self.level {
            None => Ok(LogLevel::Info),
            Some(s) => s.parse().map_err(|_| ConfigurationError::InvalidValue {
                key: "level",
                value: s.clone(),
            }),
        }
    }
}

/// Everything a run needs, as read from one config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub database: RawDbConfig,
    pub importer: ImporterSettings,
    pub correlation: CorrelationSettings,
    pub logging: LoggingSettings,
}

impl ServiceConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(text).map_err(|e| ConfigurationError::Parse {
            path: PathBuf::from("<toml>"),
            message: e.to_string(),
        })
    }

    /// Loads a TOML service config, or a bare JSON credentials file when the
    /// extension is `.json` (other settings then take their defaults).
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let with_path = |err: ConfigurationError| match err {
            ConfigurationError::Parse { message, .. } => ConfigurationError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        };

        if path.extension().is_some_and(|ext| ext == "json") {
            let database: RawDbConfig = serde_json::from_str(&text).map_err(|e| ConfigurationError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            Ok(ServiceConfig {
                database,
                ..ServiceConfig::default()
            })
        } else {
            Self::from_toml_str(&text).map_err(with_path)
        }
    }

    /// Resolves credentials from the file, falling back to the environment
    /// when the file has no `[database]` table at all.
    pub fn db_config(&self) -> Result<DbConfig, ConfigurationError> {
        let d = &self.database;
        if d.host.is_none() && d.port.is_none() && d.user.is_none() && d.pass.is_none() && d.dbname.is_none() {
            return DbConfig::from_env();
        }
        d.clone().resolve()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const JSON_CONFIG: &str = r#"{
        "host": "myhost",
        "port": "10101",
        "user": "myuser",
        "pass": "mypass",
        "dbname": "my_database"
    }"#;

    #[test]
    fn test_json_credentials_resolve() {
        let config = DbConfig::from_json_str(JSON_CONFIG).unwrap();
        assert_eq!(config.host, "myhost");
        assert_eq!(config.port, 10101);
        assert_eq!(config.user, "myuser");
        assert_eq!(config.password, "mypass");
        assert_eq!(config.database, "my_database");
    }

    #[test]
    fn test_numeric_port_accepted() {
        let json = r#"{"host":"h","port":5432,"user":"u","pass":"p","dbname":"d"}"#;
        assert_eq!(DbConfig::from_json_str(json).unwrap().port, 5432);
    }

    #[test]
    fn test_each_missing_credential_is_named() {
        for key in ["host", "port", "user", "pass", "dbname"] {
            let mut value: serde_json::Value = serde_json::from_str(JSON_CONFIG).unwrap();
            value.as_object_mut().unwrap().remove(key);
            let err = DbConfig::from_json_str(&value.to_string()).unwrap_err();
            assert!(
                matches!(err, ConfigurationError::MissingCredential(k) if k == key),
                "expected missing {}, got {:?}",
                key,
                err
            );
        }
    }

    #[test]
    fn test_null_and_blank_credentials_are_missing() {
        let json = r#"{"host":"h","port":1,"user":"  ","pass":null,"dbname":"d"}"#;
        assert!(matches!(
            DbConfig::from_json_str(json),
            Err(ConfigurationError::MissingCredential("user"))
        ));
    }

    #[test]
    fn test_bad_port_is_invalid_value() {
        let json = r#"{"host":"h","port":"http","user":"u","pass":"p","dbname":"d"}"#;
        assert!(matches!(
            DbConfig::from_json_str(json),
            Err(ConfigurationError::InvalidValue { key: "port", .. })
        ));
        let json = r#"{"host":"h","port":70000,"user":"u","pass":"p","dbname":"d"}"#;
        assert!(DbConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_debug_output_redacts_password() {
        let config = DbConfig::from_json_str(JSON_CONFIG).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("mypass"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_env_lookup() {
        let vars: HashMap<&str, &str> = [
            ("NSSK_DB_HOST", "localhost"),
            ("NSSK_DB_PORT", "5432"),
            ("NSSK_DB_USER", "nssk-import"),
            ("NSSK_DB_PASSWORD", "secret"),
            ("NSSK_DB_NAME", "NSSK_COSMO"),
        ]
        .into_iter()
        .collect();
        let config = DbConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.database, "NSSK_COSMO");
        assert_eq!(config.with_database("NSSK_CNV_RAINFALL").database, "NSSK_CNV_RAINFALL");
        assert_eq!(config.with_database("NSSK_CNV_RAINFALL").user, "nssk-import");
    }

    #[test]
    fn test_toml_service_config_with_defaults() {
        let config = ServiceConfig::from_toml_str(
            r#"
            [database]
            host = "db"
            port = 5432
            user = "nssk-import"
            password = "secret"
            database = "NSSK_CONDUCTIVITY_RAINFALL_CORRELATION"

            [correlation]
            locations = ["WAGG01"]
            skip_invalid = true
            "#,
        )
        .unwrap();

        assert_eq!(config.db_config().unwrap().database, "NSSK_CONDUCTIVITY_RAINFALL_CORRELATION");
        assert_eq!(config.importer.commit_size, DEFAULT_COMMIT_SIZE);

        let correlation = config.correlation.to_correlation_config().unwrap();
        assert_eq!(correlation.increment, Duration::days(7));
        assert_eq!(correlation.margin, Duration::minutes(5));
        assert_eq!(correlation.locations, vec![TableId::parse("WAGG01").unwrap()]);
        assert_eq!(correlation.policy, ValidationPolicy::SkipAndCollect);
    }

    #[test]
    fn test_correlation_settings_reject_unknown_location_and_zero_increment() {
        let mut settings = CorrelationSettings::default();
        settings.locations.push("NOPE01".to_string());
        assert!(matches!(
            settings.to_correlation_config(),
            Err(ConfigurationError::UnknownLocation(id)) if id == "NOPE01"
        ));

        let settings = CorrelationSettings {
            increment_days: 0,
            ..CorrelationSettings::default()
        };
        assert!(settings.to_correlation_config().is_err());
    }

    #[test]
    fn test_load_json_file_keeps_default_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cosmo.json");
        std::fs::write(&path, JSON_CONFIG).unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.db_config().unwrap().host, "myhost");
        assert_eq!(config.correlation.increment_days, 7);
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = ServiceConfig::load(Path::new("/nonexistent/nssk.toml")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Read { .. }));
    }
}
