use std::path::PathBuf;

use datashift_common::{Error, MigrationKind, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration, read from `datashift.yml` or `datashift.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file. `:memory:` opens a throwaway database.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("datashift.db"),
        }
    }
}

/// Settings shared by the catalog, the tracking store and the executor.
/// Built once per run and handed to each of them by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Tracking table shared by schema and data records.
    pub table: String,
    pub column: String,
    pub type_column: String,
    /// Main migrations directory, scanned for both kinds.
    pub directory: PathBuf,
    /// Extra directories scanned for data migrations only.
    pub data_dirs: Vec<PathBuf>,
    pub namespace: String,
    pub data_namespace: String,
    pub schema_prefix: String,
    pub data_prefix: String,
    /// File extension of discovered migration files.
    pub extension: String,
    /// Plan and report without executing units or writing records.
    pub dry_run: bool,
    /// Commit each unit together with its tracking record.
    pub transactional: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            table: "doctrine_migrations".to_string(),
            column: "version".to_string(),
            type_column: "type".to_string(),
            directory: PathBuf::from("migrations"),
            data_dirs: Vec::new(),
            namespace: "Migrations".to_string(),
            data_namespace: "MigrationsData".to_string(),
            schema_prefix: "Version".to_string(),
            data_prefix: "Data".to_string(),
            extension: "sql".to_string(),
            dry_run: false,
            transactional: true,
        }
    }
}

impl MigrationsConfig {
    pub fn prefix(&self, kind: MigrationKind) -> &str {
        match kind {
            MigrationKind::Scheme => &self.schema_prefix,
            MigrationKind::Data => &self.data_prefix,
        }
    }

    pub fn namespace(&self, kind: MigrationKind) -> &str {
        match kind {
            MigrationKind::Scheme => &self.namespace,
            MigrationKind::Data => &self.data_namespace,
        }
    }

    /// Directories scanned for a kind. Data units live in `data_dirs` and
    /// in the main directory; schema units only in the main directory.
    pub fn directories(&self, kind: MigrationKind) -> Vec<PathBuf> {
        match kind {
            MigrationKind::Scheme => vec![self.directory.clone()],
            MigrationKind::Data => {
                let mut dirs = self.data_dirs.clone();
                dirs.push(self.directory.clone());
                dirs
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("table", &self.table),
            ("column", &self.column),
            ("type_column", &self.type_column),
        ] {
            if !is_identifier(value) {
                return Err(Error::Config(format!(
                    "migrations.{field} must be a plain SQL identifier, got '{value}'"
                )));
            }
        }
        if self.column == self.type_column {
            return Err(Error::Config(
                "migrations.column and migrations.type_column must differ".into(),
            ));
        }
        if self.data_prefix.is_empty() || self.schema_prefix.is_empty() {
            return Err(Error::Config("migration file prefixes cannot be empty".into()));
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: Option<String>,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shared_tracking_table() {
        let config = MigrationsConfig::default();
        assert_eq!(config.table, "doctrine_migrations");
        assert_eq!(config.column, "version");
        assert_eq!(config.type_column, "type");
        assert_eq!(config.prefix(MigrationKind::Data), "Data");
        assert_eq!(config.prefix(MigrationKind::Scheme), "Version");
        assert!(config.transactional);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn data_directories_include_the_main_directory_last() {
        let config = MigrationsConfig {
            data_dirs: vec![PathBuf::from("extra")],
            ..Default::default()
        };
        assert_eq!(
            config.directories(MigrationKind::Data),
            vec![PathBuf::from("extra"), PathBuf::from("migrations")]
        );
        assert_eq!(
            config.directories(MigrationKind::Scheme),
            vec![PathBuf::from("migrations")]
        );
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let config = MigrationsConfig {
            table: "migrations; DROP TABLE users".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = MigrationsConfig {
            type_column: "version".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(is_identifier("_migrations2"));
        assert!(!is_identifier("2migrations"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = "migrations:\n  table: app_migrations\n  data_dirs: [seeds]\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.migrations.table, "app_migrations");
        assert_eq!(config.migrations.data_dirs, vec![PathBuf::from("seeds")]);
        assert_eq!(config.migrations.column, "version");
        assert_eq!(config.database.path, PathBuf::from("datashift.db"));
        assert_eq!(config.log.format, LogFormat::Pretty);
    }
}
