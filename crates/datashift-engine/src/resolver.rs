use std::collections::BTreeSet;

use datashift_common::{Error, Result, VersionId};
use datashift_db::TrackingStore;

use crate::catalog::Catalog;

/// A symbolic version reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionAlias {
    First,
    Latest,
    Current,
    Prev,
    Next,
    /// `current+N` or `current-N`.
    Delta(i64),
    /// Anything else; only valid when it names an existing version.
    Literal(String),
}

impl VersionAlias {
    /// Parse a token. A malformed `current…` delta is rejected here; every
    /// other unrecognised token becomes a [`VersionAlias::Literal`].
    pub fn parse(token: &str) -> Result<Self> {
        let alias = match token {
            "first" => VersionAlias::First,
            "latest" => VersionAlias::Latest,
            "current" => VersionAlias::Current,
            "prev" => VersionAlias::Prev,
            "next" => VersionAlias::Next,
            _ => match token.strip_prefix("current") {
                Some(rest) => VersionAlias::Delta(parse_delta(rest).ok_or_else(|| {
                    Error::UnresolvableAlias(token.to_string())
                })?),
                None => VersionAlias::Literal(token.to_string()),
            },
        };
        Ok(alias)
    }
}

fn parse_delta(rest: &str) -> Option<i64> {
    let (sign, digits) = match rest.as_bytes().first()? {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return None,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Too large to fit is still a well-formed delta; it just cannot be reached.
    let n: i64 = digits.parse().unwrap_or(i64::MAX);
    (n > 0).then_some(sign * n)
}

/// Turns version tokens into concrete ids for one catalog's kind.
pub struct AliasResolver<'a> {
    catalog: &'a Catalog,
    store: &'a TrackingStore,
}

impl<'a> AliasResolver<'a> {
    pub fn new(catalog: &'a Catalog, store: &'a TrackingStore) -> Self {
        Self { catalog, store }
    }

    pub fn resolve(&self, token: &str) -> Result<VersionId> {
        let exact = VersionId::from(token);
        if !exact.is_sentinel() && self.catalog.contains(&exact)? {
            return Ok(exact);
        }

        match VersionAlias::parse(token)? {
            VersionAlias::First => Ok(VersionId::sentinel()),
            VersionAlias::Latest => self.latest(),
            VersionAlias::Current => self.current(),
            VersionAlias::Prev => self.prev(),
            VersionAlias::Next => self.next(),
            VersionAlias::Delta(delta) => self.relative(&self.current()?, delta),
            VersionAlias::Literal(token) => Err(Error::UnknownVersion(token)),
        }
    }

    pub fn latest(&self) -> Result<VersionId> {
        self.catalog.latest()
    }

    /// Greatest applied version that still has a unit, or the sentinel.
    pub fn current(&self) -> Result<VersionId> {
        let known: BTreeSet<VersionId> = self.catalog.all_versions()?.into_iter().collect();
        self.store
            .current_version(self.catalog.kind(), |v| known.contains(v))
    }

    pub fn prev(&self) -> Result<VersionId> {
        self.offset(&self.current()?, -1)?
            .ok_or(Error::AtFirstVersion)
    }

    pub fn next(&self) -> Result<VersionId> {
        self.offset(&self.current()?, 1)?
            .ok_or(Error::AtLatestVersion)
    }

    /// The id `delta` steps away from `version` in the sentinel-prefixed
    /// ordered list of ids.
    pub fn relative(&self, version: &VersionId, delta: i64) -> Result<VersionId> {
        self.offset(version, delta)?.ok_or_else(|| {
            Error::DeltaOutOfRange(format!("{version}{delta:+}"))
        })
    }

    fn offset(&self, version: &VersionId, delta: i64) -> Result<Option<VersionId>> {
        let mut ids = vec![VersionId::sentinel()];
        ids.extend(self.catalog.all_versions()?);

        let Some(position) = ids.iter().position(|id| id == version) else {
            return Ok(None);
        };
        let Some(target) = (position as i64).checked_add(delta) else {
            return Ok(None);
        };
        if target < 0 {
            return Ok(None);
        }
        Ok(usize::try_from(target).ok().and_then(|t| ids.get(t).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RegisteredHandlers;
    use datashift_common::MigrationKind;
    use datashift_db::TrackingTable;

    const V1: &str = "20230101000000";
    const V2: &str = "20230201000000";
    const V3: &str = "20230301000000";

    fn catalog(versions: &[&str]) -> Catalog {
        let mut handlers = RegisteredHandlers::new("Data");
        for v in versions {
            handlers.register_fn(v, |_| Ok(()));
        }
        let mut catalog = Catalog::new(MigrationKind::Data, "MigrationsData");
        catalog.add_finder(handlers.clone()).unwrap();
        catalog.add_loader(handlers).unwrap();
        catalog.ensure_loaded().unwrap();
        catalog
    }

    fn store(applied: &[&str]) -> TrackingStore {
        let store = TrackingStore::in_memory(TrackingTable::default()).unwrap();
        for v in applied {
            store.mark(&VersionId::from(*v), MigrationKind::Data, false).unwrap();
        }
        store
    }

    fn v(s: &str) -> VersionId {
        VersionId::from(s)
    }

    #[test]
    fn parses_aliases() {
        assert_eq!(VersionAlias::parse("first").unwrap(), VersionAlias::First);
        assert_eq!(VersionAlias::parse("current+2").unwrap(), VersionAlias::Delta(2));
        assert_eq!(VersionAlias::parse("current-1").unwrap(), VersionAlias::Delta(-1));
        assert_eq!(
            VersionAlias::parse("20230101000000").unwrap(),
            VersionAlias::Literal("20230101000000".into())
        );
        for bad in ["current+", "current+0", "current*2", "current+x", "currently"] {
            assert!(
                matches!(VersionAlias::parse(bad), Err(Error::UnresolvableAlias(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn resolves_fixed_aliases() {
        let catalog = catalog(&[V1, V2, V3]);
        let store = store(&[V1]);
        let resolver = AliasResolver::new(&catalog, &store);

        assert_eq!(resolver.resolve(V2).unwrap(), v(V2));
        assert!(resolver.resolve("first").unwrap().is_sentinel());
        assert_eq!(resolver.resolve("latest").unwrap(), v(V3));
        assert_eq!(resolver.resolve("current").unwrap(), v(V1));
        assert_eq!(resolver.resolve("next").unwrap(), v(V2));
        assert!(resolver.resolve("prev").unwrap().is_sentinel());
        assert_eq!(resolver.resolve("current+2").unwrap(), v(V3));
    }

    #[test]
    fn steps_back_several_versions() {
        let catalog = catalog(&[V1, V2, V3]);
        let store = store(&[V1, V2, V3]);
        let resolver = AliasResolver::new(&catalog, &store);

        assert_eq!(resolver.resolve("current-1").unwrap(), v(V2));
        assert_eq!(resolver.resolve("current-2").unwrap(), v(V1));
        assert!(resolver.resolve("current-3").unwrap().is_sentinel());
    }

    #[test]
    fn huge_deltas_are_out_of_range() {
        let catalog = catalog(&[V1, V2]);
        let store = store(&[V1]);
        let resolver = AliasResolver::new(&catalog, &store);

        for token in [
            "current+9223372036854775807",
            "current-9223372036854775807",
            "current+99999999999999999999",
            "current-99999999999999999999",
        ] {
            assert!(
                matches!(resolver.resolve(token), Err(Error::DeltaOutOfRange(_))),
                "{token}"
            );
        }
    }

    #[test]
    fn unknown_token_is_unknown_version() {
        let catalog = catalog(&[V1]);
        let store = store(&[]);
        let resolver = AliasResolver::new(&catalog, &store);
        assert!(matches!(
            resolver.resolve("20990101000000"),
            Err(Error::UnknownVersion(_))
        ));
        assert!(matches!(resolver.resolve("0"), Err(Error::UnknownVersion(_))));
    }

    #[test]
    fn boundaries_raise_specific_errors() {
        let catalog = catalog(&[V1, V2]);

        let empty = store(&[]);
        let resolver = AliasResolver::new(&catalog, &empty);
        assert!(matches!(resolver.resolve("prev"), Err(Error::AtFirstVersion)));
        assert!(matches!(
            resolver.resolve("current-1"),
            Err(Error::DeltaOutOfRange(_))
        ));

        let all = store(&[V1, V2]);
        let resolver = AliasResolver::new(&catalog, &all);
        assert!(matches!(resolver.resolve("next"), Err(Error::AtLatestVersion)));
    }

    #[test]
    fn delta_past_the_end_is_out_of_range() {
        let catalog = catalog(&[V1, V2]);
        let store = store(&[V1]);
        let resolver = AliasResolver::new(&catalog, &store);

        let err = resolver.resolve("current+2").unwrap_err();
        assert!(matches!(err, Error::DeltaOutOfRange(ref d) if d == "20230101000000+2"));
    }

    #[test]
    fn relative_steps_are_inverse() {
        let catalog = catalog(&[V1, V2, V3]);
        let store = store(&[]);
        let resolver = AliasResolver::new(&catalog, &store);

        let forward = resolver.relative(&v(V2), 1).unwrap();
        assert_eq!(forward, v(V3));
        assert_eq!(resolver.relative(&forward, -1).unwrap(), v(V2));
        assert!(resolver.relative(&VersionId::sentinel(), -1).is_err());
        assert!(resolver.relative(&v(V3), 1).is_err());
        assert!(resolver.relative(&v("20990101000000"), 0).is_err());
    }

    #[test]
    fn current_skips_versions_without_units() {
        let catalog = catalog(&[V1, V2]);
        let store = store(&[V1, "20990101000000"]);
        let resolver = AliasResolver::new(&catalog, &store);
        assert_eq!(resolver.current().unwrap(), v(V1));
    }
}
