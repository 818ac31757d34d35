use std::collections::BTreeMap;
use std::time::Duration;

use datashift_common::{Error, MigrationKind, Result, VersionId};
use tracing::{debug, info};

use crate::finder::MigrationFinder;
use crate::handler::{HandlerLoader, HandlerRef, LoaderChain, MigrationHandler};

/// A registered migration: its identity, where it came from and the
/// handler that runs it.
pub struct MigrationUnit {
    version: VersionId,
    handler_ref: HandlerRef,
    handler: Box<dyn MigrationHandler>,
    elapsed: Option<Duration>,
}

impl MigrationUnit {
    pub fn version(&self) -> &VersionId {
        &self.version
    }

    pub fn handler_ref(&self) -> &HandlerRef {
        &self.handler_ref
    }

    pub fn handler(&self) -> &dyn MigrationHandler {
        self.handler.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.handler.description()
    }

    /// Time the last execution took, once the unit has run.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub(crate) fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = Some(elapsed);
    }
}

impl std::fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("version", &self.version)
            .field("handler_ref", &self.handler_ref)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

enum CatalogState {
    Unloaded,
    Loaded(BTreeMap<VersionId, MigrationUnit>),
}

/// Ordered version → unit mapping for one migration kind.
///
/// Built from its finders on [`ensure_loaded`](Catalog::ensure_loaded);
/// loading either registers every discovered unit or leaves the catalog
/// unloaded. Read-only afterwards except for timing.
pub struct Catalog {
    kind: MigrationKind,
    namespace: String,
    finders: Vec<Box<dyn MigrationFinder>>,
    loaders: LoaderChain,
    state: CatalogState,
}

impl Catalog {
    pub fn new(kind: MigrationKind, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            finders: Vec::new(),
            loaders: LoaderChain::new(),
            state: CatalogState::Unloaded,
        }
    }

    pub fn kind(&self) -> MigrationKind {
        self.kind
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn add_finder(&mut self, finder: impl MigrationFinder + 'static) -> Result<()> {
        self.ensure_unloaded()?;
        self.finders.push(Box::new(finder));
        Ok(())
    }

    pub fn add_loader(&mut self, loader: impl HandlerLoader + 'static) -> Result<()> {
        self.ensure_unloaded()?;
        self.loaders.push(loader);
        Ok(())
    }

    fn ensure_unloaded(&self) -> Result<()> {
        match self.state {
            CatalogState::Unloaded => Ok(()),
            CatalogState::Loaded(_) => Err(Error::Other(format!(
                "{} catalog is already loaded",
                self.kind.label()
            ))),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, CatalogState::Loaded(_))
    }

    /// Run discovery and register every unit found. Does nothing when the
    /// catalog is already loaded.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }

        let mut units = BTreeMap::new();
        for finder in &self.finders {
            for (version, reference) in finder.find(&self.namespace)? {
                insert_unit(&mut units, &self.loaders, version, reference)?;
            }
        }

        info!(
            "loaded {} {} migration(s)",
            units.len(),
            self.kind.label()
        );
        self.state = CatalogState::Loaded(units);
        Ok(())
    }

    /// Register one more unit into a loaded catalog.
    pub fn register(&mut self, version: VersionId, reference: HandlerRef) -> Result<&MigrationUnit> {
        let CatalogState::Loaded(units) = &mut self.state else {
            return Err(Error::CatalogNotLoaded);
        };
        insert_unit(units, &self.loaders, version.clone(), reference)?;
        units
            .get(&version)
            .ok_or_else(|| Error::UnknownVersion(version.to_string()))
    }

    fn units_map(&self) -> Result<&BTreeMap<VersionId, MigrationUnit>> {
        match &self.state {
            CatalogState::Loaded(units) => Ok(units),
            CatalogState::Unloaded => Err(Error::CatalogNotLoaded),
        }
    }

    /// Every version id, ascending.
    pub fn all_versions(&self) -> Result<Vec<VersionId>> {
        Ok(self.units_map()?.keys().cloned().collect())
    }

    pub fn contains(&self, version: &VersionId) -> Result<bool> {
        Ok(self.units_map()?.contains_key(version))
    }

    pub fn get(&self, version: &VersionId) -> Result<&MigrationUnit> {
        self.units_map()?
            .get(version)
            .ok_or_else(|| Error::UnknownVersion(version.to_string()))
    }

    pub fn get_mut(&mut self, version: &VersionId) -> Result<&mut MigrationUnit> {
        match &mut self.state {
            CatalogState::Loaded(units) => units
                .get_mut(version)
                .ok_or_else(|| Error::UnknownVersion(version.to_string())),
            CatalogState::Unloaded => Err(Error::CatalogNotLoaded),
        }
    }

    /// Highest version id, or the sentinel when the catalog is empty.
    pub fn latest(&self) -> Result<VersionId> {
        Ok(self
            .units_map()?
            .keys()
            .next_back()
            .cloned()
            .unwrap_or_else(VersionId::sentinel))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.units_map()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Units in ascending version order.
    pub fn units(&self) -> Result<impl Iterator<Item = &MigrationUnit>> {
        Ok(self.units_map()?.values())
    }
}

fn insert_unit(
    units: &mut BTreeMap<VersionId, MigrationUnit>,
    loaders: &LoaderChain,
    version: VersionId,
    reference: HandlerRef,
) -> Result<()> {
    if version.is_sentinel() {
        return Err(Error::ReservedVersion(version.to_string()));
    }
    if units.contains_key(&version) {
        return Err(Error::DuplicateVersion(version.to_string()));
    }
    let handler = loaders
        .load(&reference)?
        .ok_or_else(|| Error::HandlerNotFound(reference.to_string()))?;

    debug!("registered {version} as {}", reference.qualified_name());
    units.insert(
        version.clone(),
        MigrationUnit {
            version,
            handler_ref: reference,
            handler,
            elapsed: None,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RegisteredHandlers;

    fn handlers(versions: &[&str]) -> RegisteredHandlers {
        let mut handlers = RegisteredHandlers::new("Data");
        for v in versions {
            handlers.register_fn(v, |_| Ok(()));
        }
        handlers
    }

    fn catalog(versions: &[&str]) -> Catalog {
        let handlers = handlers(versions);
        let mut catalog = Catalog::new(MigrationKind::Data, "MigrationsData");
        catalog.add_finder(handlers.clone()).unwrap();
        catalog.add_loader(handlers).unwrap();
        catalog.ensure_loaded().unwrap();
        catalog
    }

    #[test]
    fn unloaded_catalog_refuses_queries() {
        let catalog = Catalog::new(MigrationKind::Data, "MigrationsData");
        assert!(!catalog.is_loaded());
        assert!(matches!(catalog.all_versions(), Err(Error::CatalogNotLoaded)));
        assert!(matches!(catalog.latest(), Err(Error::CatalogNotLoaded)));
    }

    #[test]
    fn versions_are_ascending() {
        let catalog = catalog(&["20230301000000", "20230101000000", "20230201000000"]);
        let versions: Vec<String> = catalog
            .all_versions()
            .unwrap()
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(
            versions,
            vec!["20230101000000", "20230201000000", "20230301000000"]
        );
        assert_eq!(catalog.latest().unwrap(), VersionId::from("20230301000000"));
        assert_eq!(catalog.len().unwrap(), 3);
    }

    #[test]
    fn empty_catalog_latest_is_the_sentinel() {
        let catalog = catalog(&[]);
        assert!(catalog.latest().unwrap().is_sentinel());
        assert!(catalog.is_empty().unwrap());
    }

    #[test]
    fn duplicate_registration_fails() {
        let handlers = handlers(&["20230101000000"]);
        let mut catalog = Catalog::new(MigrationKind::Data, "MigrationsData");
        catalog.add_loader(handlers).unwrap();
        catalog.ensure_loaded().unwrap();

        let reference = HandlerRef::named("MigrationsData", "Data20230101000000");
        catalog
            .register(VersionId::from("20230101000000"), reference.clone())
            .unwrap();
        let err = catalog
            .register(VersionId::from("20230101000000"), reference)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateVersion(v) if v == "20230101000000"));
    }

    #[test]
    fn duplicate_discovery_leaves_catalog_unloaded() {
        let handlers = handlers(&["20230101000000"]);
        let mut catalog = Catalog::new(MigrationKind::Data, "MigrationsData");
        catalog.add_finder(handlers.clone()).unwrap();
        catalog.add_finder(handlers.clone()).unwrap();
        catalog.add_loader(handlers).unwrap();

        assert!(matches!(
            catalog.ensure_loaded(),
            Err(Error::DuplicateVersion(_))
        ));
        assert!(!catalog.is_loaded());
    }

    #[test]
    fn unresolvable_reference_is_handler_not_found() {
        let mut catalog = catalog(&[]);
        let err = catalog
            .register(
                VersionId::from("20230101000000"),
                HandlerRef::named("MigrationsData", "Data20230101000000"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::HandlerNotFound(_)));
    }

    #[test]
    fn get_unknown_version() {
        let catalog = catalog(&["20230101000000"]);
        assert!(catalog.get(&VersionId::from("20230101000000")).is_ok());
        assert!(matches!(
            catalog.get(&VersionId::from("20990101000000")),
            Err(Error::UnknownVersion(_))
        ));
    }

    #[test]
    fn sources_cannot_change_after_loading() {
        let mut catalog = catalog(&[]);
        assert!(catalog.add_finder(handlers(&[])).is_err());
        assert!(catalog.add_loader(handlers(&[])).is_err());
    }
}
