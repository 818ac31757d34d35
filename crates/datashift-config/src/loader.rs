use std::path::{Path, PathBuf};

use datashift_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CANDIDATE_NAMES: [&str; 3] = ["datashift.yml", "datashift.yaml", "datashift.toml"];

pub const ENV_DATABASE: &str = "DATASHIFT_DATABASE";
pub const ENV_DRY_RUN: &str = "DATASHIFT_DRY_RUN";

/// Locates, parses and validates the configuration file.
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Search the working directory, then `<config dir>/datashift`.
    pub fn new() -> Self {
        let mut search_dirs = vec![PathBuf::from(".")];
        if let Some(dir) = dirs::config_dir() {
            search_dirs.push(dir.join("datashift"));
        }
        Self {
            explicit: None,
            search_dirs,
        }
    }

    /// Use exactly this file; a missing file is an error.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            explicit: Some(path.into()),
            search_dirs: Vec::new(),
        }
    }

    pub fn with_search_dirs(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            explicit: None,
            search_dirs,
        }
    }

    /// The file that would be loaded, if any.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit {
            return Some(path.clone());
        }
        self.search_dirs
            .iter()
            .flat_map(|dir| CANDIDATE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
    }

    /// Load the configuration, falling back to defaults when no file is
    /// found, then apply environment overrides and validate.
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = match self.resolve_path() {
            Some(path) => {
                let config = parse_file(&path)?;
                info!("loaded config from {}", path.display());
                config
            }
            None => {
                debug!("no config file found, using defaults");
                AppConfig::default()
            }
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        config.migrations.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_file(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}

fn apply_env_overrides(config: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(path) = var(ENV_DATABASE).filter(|p| !p.is_empty()) {
        debug!("database path overridden by {ENV_DATABASE}");
        config.database.path = PathBuf::from(path);
    }
    if let Some(flag) = var(ENV_DRY_RUN) {
        config.migrations.dry_run = matches!(flag.as_str(), "1" | "true" | "yes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("datashift.yml");
        fs::write(
            &path,
            "database:\n  path: app.db\nmigrations:\n  directory: db/migrations\n",
        )
        .unwrap();

        let config = ConfigLoader::with_path(&path).load().unwrap();
        assert_eq!(config.database.path, PathBuf::from("app.db"));
        assert_eq!(config.migrations.directory, PathBuf::from("db/migrations"));
    }

    #[test]
    fn loads_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("datashift.toml");
        fs::write(
            &path,
            "[migrations]\ntable = \"ledger\"\ntransactional = false\n",
        )
        .unwrap();

        let config = ConfigLoader::with_path(&path).load().unwrap();
        assert_eq!(config.migrations.table, "ledger");
        assert!(!config.migrations.transactional);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ConfigLoader::with_path("/nonexistent/datashift.yml")
            .load()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("datashift.ini");
        fs::write(&path, "table=x").unwrap();
        assert!(ConfigLoader::with_path(&path).load().is_err());
    }

    #[test]
    fn search_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_search_dirs(vec![dir.path().to_path_buf()]);
        assert!(loader.resolve_path().is_none());
        let config = loader.load().unwrap();
        assert_eq!(config.migrations.table, "doctrine_migrations");
    }

    #[test]
    fn search_finds_first_candidate() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("datashift.toml"), "").unwrap();
        let loader = ConfigLoader::with_search_dirs(vec![dir.path().to_path_buf()]);
        assert_eq!(
            loader.resolve_path(),
            Some(dir.path().join("datashift.toml"))
        );
    }

    #[test]
    fn invalid_table_name_fails_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("datashift.yml");
        fs::write(&path, "migrations:\n  table: \"bad name\"\n").unwrap();
        assert!(matches!(
            ConfigLoader::with_path(&path).load(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn env_overrides_database_and_dry_run() {
        let env: HashMap<&str, &str> =
            [(ENV_DATABASE, "/tmp/other.db"), (ENV_DRY_RUN, "true")].into();
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert!(config.migrations.dry_run);
    }
}
