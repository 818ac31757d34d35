use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use datashift_common::VersionId;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Template {
    /// Plain SQL statements.
    Sql,
    /// A Rust handler to register with `RegisteredHandlers`.
    Rust,
}

/// Write an empty data migration `<prefix><version>.<ext>` into `dir`.
pub fn write_data_migration(
    dir: &Path,
    prefix: &str,
    sql_extension: &str,
    template: Template,
    version: &VersionId,
) -> Result<PathBuf> {
    let (extension, body) = match template {
        Template::Sql => (sql_extension, sql_template(version)),
        Template::Rust => ("rs", rust_template(version)),
    };
    let path = dir.join(format!("{prefix}{version}.{extension}"));
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;

    info!("generated {}", path.display());
    Ok(path)
}

fn sql_template(version: &VersionId) -> String {
    format!(
        "-- Data migration {version}\n\
         -- Statements are separated by semicolons and run in one transaction.\n\n"
    )
}

fn rust_template(version: &VersionId) -> String {
    format!(
        r#"use datashift_common::Result;
use datashift_engine::{{MigrationContext, RegisteredHandlers}};

/// Data migration {version}.
pub fn register(handlers: &mut RegisteredHandlers) {{
    handlers.register_fn("{version}", up);
}}

fn up(ctx: &mut MigrationContext<'_>) -> Result<()> {{
    let _ = ctx;
    Ok(())
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_sql_template() {
        let dir = TempDir::new().unwrap();
        let version = VersionId::from("20230101000000");
        let path =
            write_data_migration(dir.path(), "Data", "sql", Template::Sql, &version).unwrap();

        assert_eq!(path, dir.path().join("Data20230101000000.sql"));
        let body = fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("-- Data migration 20230101000000"));
    }

    #[test]
    fn writes_rust_template_into_new_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("seeds");
        let version = VersionId::from("20230101000000");
        let path = write_data_migration(&target, "Data", "sql", Template::Rust, &version).unwrap();

        assert_eq!(path, target.join("Data20230101000000.rs"));
        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("handlers.register_fn(\"20230101000000\", up);"));
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let version = VersionId::from("20230101000000");
        write_data_migration(dir.path(), "Data", "sql", Template::Sql, &version).unwrap();
        assert!(
            write_data_migration(dir.path(), "Data", "sql", Template::Sql, &version).is_err()
        );
    }
}
