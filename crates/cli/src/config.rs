//! `config.toml` loading
//!
//! The file is parsed into optional settings first so that every absent
//! field can be reported by its dotted path, then resolved into the
//! engine's [`EnvironmentConfig`] for the selected environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use relabel_engine::{
    ConfigError, DatabaseBackendType, EnvironmentConfig, LogConfig, StoreConfig, TargetConfig,
};
use serde::Deserialize;

use crate::logging::LogFormat;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level file layout
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub default_env: Option<String>,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentSettings>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSettings {
    pub target: Option<TargetSettings>,
    pub log: Option<LogSettings>,
}

/// Connection fields shared by the target and log sections
#[derive(Debug, Default, Deserialize)]
pub struct StoreSettings {
    pub backend: Option<DatabaseBackendType>,
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TargetSettings {
    #[serde(flatten)]
    pub store: StoreSettings,
    pub table: Option<String>,
    pub value_column: Option<String>,
    pub key_column: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogSettings {
    #[serde(flatten)]
    pub store: StoreSettings,
    pub ledger_table: Option<String>,
    pub detail_table: Option<String>,
}

impl Settings {
    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::missing_required(
                    path.display().to_string(),
                    "Create it (see config.example.toml) or pass --config",
                )
            } else {
                ConfigError::Io(e)
            }
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Configured environment names, sorted
    pub fn environment_names(&self) -> Vec<&str> {
        self.environments.keys().map(String::as_str).collect()
    }

    fn sole_environment(&self) -> Option<&str> {
        match self.environments.len() {
            1 => self.environments.keys().next().map(String::as_str),
            _ => None,
        }
    }

    /// Resolve the requested environment, or `default_env` when none is given
    pub fn resolve(&self, requested: Option<&str>) -> Result<EnvironmentConfig, ConfigError> {
        let name = requested
            .or(self.default_env.as_deref())
            .or_else(|| self.sole_environment())
            .ok_or_else(|| {
                ConfigError::missing_required(
                    "default_env",
                    "Set default_env or pass --env to pick an environment",
                )
            })?;

        let env = self.environments.get(name).ok_or_else(|| ConfigError::UnknownEnvironment {
            name: name.to_string(),
            available: self.environment_names().join(", "),
        })?;

        let prefix = format!("environments.{}", name);
        let resolved = EnvironmentConfig {
            name: name.to_string(),
            target: resolve_target(&format!("{}.target", prefix), env.target.as_ref())?,
            log: resolve_log(&format!("{}.log", prefix), env.log.as_ref())?,
        };
        resolved.validate()?;
        Ok(resolved)
    }
}

fn required(path: &str, field: &str, value: &Option<String>) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::missing_required(
            format!("{}.{}", path, field),
            "This field has no default",
        )),
    }
}

fn resolve_store(path: &str, store: &StoreSettings) -> Result<StoreConfig, ConfigError> {
    let backend = match (store.backend, store.url.as_deref()) {
        (Some(backend), _) => backend,
        (None, Some(url)) => DatabaseBackendType::from_url(url).ok_or_else(|| {
            ConfigError::invalid_value(
                format!("{}.url", path),
                "<redacted>",
                "a postgres://, mysql:// or sqlite: URL",
            )
        })?,
        (None, None) => {
            return Err(ConfigError::missing_required(
                format!("{}.backend", path),
                "One of postgres, mysql or sqlite",
            ))
        }
    };

    Ok(StoreConfig {
        backend,
        host: store.host.clone(),
        port: store.port,
        user: store.user.clone(),
        password: store.password.clone(),
        database: store.database.clone(),
        url: store.url.clone(),
    })
}

fn resolve_target(
    path: &str,
    target: Option<&TargetSettings>,
) -> Result<TargetConfig, ConfigError> {
    let target = target
        .ok_or_else(|| ConfigError::missing_required(path, "Describe the table to rename"))?;

    Ok(TargetConfig {
        store: resolve_store(path, &target.store)?,
        table: required(path, "table", &target.table)?,
        value_column: required(path, "value_column", &target.value_column)?,
        key_column: required(path, "key_column", &target.key_column)?,
    })
}

fn resolve_log(path: &str, log: Option<&LogSettings>) -> Result<LogConfig, ConfigError> {
    let log = log.ok_or_else(|| {
        ConfigError::missing_required(path, "Describe where the audit trail is kept")
    })?;

    Ok(LogConfig {
        store: resolve_store(path, &log.store)?,
        ledger_table: required(path, "ledger_table", &log.ledger_table)?,
        detail_table: required(path, "detail_table", &log.detail_table)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
default_env = "staging"

[logging]
level = "debug"
format = "json"

[environments.staging.target]
backend = "mysql"
host = "db.internal"
user = "ops"
password = "secret"
database = "crm"
table = "customers"
value_column = "name"
key_column = "id"

[environments.staging.log]
backend = "sqlite"
database = "relabel-log.db"
ledger_table = "rename_batches"
detail_table = "rename_details"

[environments.local.target]
url = "sqlite://local.db"
table = "customers"
value_column = "name"
key_column = "id"
"#;

    #[test]
    fn test_resolves_default_environment() {
        let settings = Settings::parse(SAMPLE).unwrap();
        let env = settings.resolve(None).unwrap();

        assert_eq!(env.name, "staging");
        assert_eq!(env.target.store.backend, DatabaseBackendType::MySQL);
        assert_eq!(env.target.store.port, None);
        assert_eq!(env.log.store.backend, DatabaseBackendType::SQLite);
        assert_eq!(env.log.ledger_table, "rename_batches");
        assert_eq!(settings.logging.format, Some(LogFormat::Json));
        assert_eq!(settings.environment_names(), vec!["local", "staging"]);
    }

    #[test]
    fn test_missing_section_names_full_path() {
        let settings = Settings::parse(SAMPLE).unwrap();
        match settings.resolve(Some("local")) {
            Err(ConfigError::MissingRequired { field, .. }) => {
                assert_eq!(field, "environments.local.log")
            }
            other => panic!("expected missing log section, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_names_full_path() {
        let text = SAMPLE.replace(
            "key_column = \"id\"\n\n[environments.staging.log]",
            "\n[environments.staging.log]",
        );
        let settings = Settings::parse(&text).unwrap();
        match settings.resolve(Some("staging")) {
            Err(ConfigError::MissingRequired { field, .. }) => {
                assert_eq!(field, "environments.staging.target.key_column")
            }
            other => panic!("expected missing key_column, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_environment_lists_available() {
        let settings = Settings::parse(SAMPLE).unwrap();
        match settings.resolve(Some("prod")) {
            Err(ConfigError::UnknownEnvironment { name, available }) => {
                assert_eq!(name, "prod");
                assert_eq!(available, "local, staging");
            }
            other => panic!("expected unknown environment, got {:?}", other),
        }
    }

    #[test]
    fn test_unsafe_identifier_is_rejected_at_load() {
        let text = SAMPLE.replace(
            "table = \"customers\"\nvalue_column",
            "table = \"customers; DROP\"\nvalue_column",
        );
        let settings = Settings::parse(&text).unwrap();
        assert!(matches!(
            settings.resolve(Some("staging")),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unknown_keys_are_parse_errors() {
        assert!(matches!(
            Settings::parse("defualt_env = \"x\""),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.default_env.as_deref(), Some("staging"));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::MissingRequired { .. })));
    }
}
