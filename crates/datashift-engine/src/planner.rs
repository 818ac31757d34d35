use std::collections::BTreeSet;

use datashift_common::{Error, MigrationKind, Result, VersionId};

use crate::catalog::Catalog;

/// The ordered set of units a run will execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub kind: MigrationKind,
    pub target: VersionId,
    pub versions: Vec<VersionId>,
    /// Exactly the target, applied or not.
    pub forced: bool,
}

impl Plan {
    /// Every unapplied unit up to and including `target`.
    pub fn to_target(
        catalog: &Catalog,
        target: &VersionId,
        applied: &BTreeSet<VersionId>,
    ) -> Result<Self> {
        Ok(Self {
            kind: catalog.kind(),
            target: target.clone(),
            versions: pending_to_target(catalog, target, applied)?,
            forced: false,
        })
    }

    /// Only `target`, which must name an existing unit.
    pub fn forced(catalog: &Catalog, target: &VersionId) -> Result<Self> {
        if target.is_sentinel() || !catalog.contains(target)? {
            return Err(Error::UnknownVersion(target.to_string()));
        }
        Ok(Self {
            kind: catalog.kind(),
            target: target.clone(),
            versions: vec![target.clone()],
            forced: true,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }
}

/// Catalog versions not in `applied` and not above `target`, ascending.
pub fn pending_to_target(
    catalog: &Catalog,
    target: &VersionId,
    applied: &BTreeSet<VersionId>,
) -> Result<Vec<VersionId>> {
    if !target.is_sentinel() && !catalog.contains(target)? {
        return Err(Error::UnknownVersion(target.to_string()));
    }

    Ok(catalog
        .all_versions()?
        .into_iter()
        .filter(|v| v <= target && !applied.contains(v))
        .collect())
}

/// Applied versions that no longer have a unit in the catalog.
pub fn unavailable_versions(
    catalog: &Catalog,
    applied: &BTreeSet<VersionId>,
) -> Result<Vec<VersionId>> {
    let mut missing = Vec::new();
    for version in applied {
        if !catalog.contains(version)? {
            missing.push(version.clone());
        }
    }
    Ok(missing)
}
