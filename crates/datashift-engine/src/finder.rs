use std::collections::HashSet;
use std::path::{Path, PathBuf};

use datashift_common::{Error, Result, VersionId};
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::handler::{HandlerRef, RegisteredHandlers};

/// A discovery source: yields `(version, handler reference)` pairs for a
/// namespace, ordered by unit name.
pub trait MigrationFinder {
    fn find(&self, namespace: &str) -> Result<Vec<(VersionId, HandlerRef)>>;
}

/// Discovers migration files named `<prefix><version>.<extension>` below a
/// directory. Subdirectories are scanned and symlinks followed.
#[derive(Debug, Clone)]
pub struct FileFinder {
    directory: PathBuf,
    prefix: String,
    pattern: Regex,
}

impl FileFinder {
    pub fn new(
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: &str,
    ) -> Result<Self> {
        let prefix = prefix.into();
        let pattern = RegexBuilder::new(&format!(
            r"^{}([^/\\]{{1,255}})\.{}$",
            regex::escape(&prefix),
            regex::escape(extension.trim_start_matches('.')),
        ))
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Config(format!("invalid migration file pattern: {e}")))?;

        Ok(Self {
            directory: directory.into(),
            prefix,
            pattern,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Scan `dir` instead of the configured directory.
    pub fn find_in(&self, dir: &Path, namespace: &str) -> Result<Vec<(VersionId, HandlerRef)>> {
        if !dir.is_dir() {
            warn!("migrations directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut visited = HashSet::new();
        self.collect(dir, &mut visited, &mut files)?;
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut found = Vec::with_capacity(files.len());
        for (file_name, version, path) in files {
            let version = VersionId::for_unit(version)?;
            let name = file_name
                .rsplit_once('.')
                .map(|(stem, _)| stem.to_string())
                .unwrap_or(file_name);
            found.push((version, HandlerRef::file(namespace, name, path)));
        }

        debug!(
            "discovered {} {} migration file(s) in {}",
            found.len(),
            self.prefix,
            dir.display()
        );
        Ok(found)
    }

    fn collect(
        &self,
        dir: &Path,
        visited: &mut HashSet<PathBuf>,
        files: &mut Vec<(String, String, PathBuf)>,
    ) -> Result<()> {
        let canonical = dir.canonicalize()?;
        if !visited.insert(canonical) {
            return Ok(());
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            // `is_dir`/`is_file` follow symlinks.
            if path.is_dir() {
                self.collect(&path, visited, files)?;
                continue;
            }
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(caps) = self.pattern.captures(file_name) {
                let version = caps[1].to_string();
                files.push((file_name.to_string(), version, path));
            }
        }
        Ok(())
    }
}

impl MigrationFinder for FileFinder {
    fn find(&self, namespace: &str) -> Result<Vec<(VersionId, HandlerRef)>> {
        self.find_in(&self.directory, namespace)
    }
}

impl MigrationFinder for RegisteredHandlers {
    fn find(&self, namespace: &str) -> Result<Vec<(VersionId, HandlerRef)>> {
        self.versions()
            .map(|version| {
                let id = VersionId::for_unit(version)?;
                Ok((id, HandlerRef::named(namespace, self.unit_name(version))))
            })
            .collect()
    }
}
