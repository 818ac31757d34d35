use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Format of generated version ids.
pub const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// Identifier of a migration unit, normally a `YYYYMMDDHHMMSS` timestamp.
///
/// Ordering is plain string ordering, which is only meaningful because ids
/// share the same fixed width. `"0"` is the sentinel for "before every
/// version" and never names a real unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub const SENTINEL: &'static str = "0";

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn sentinel() -> Self {
        Self(Self::SENTINEL.to_string())
    }

    /// Build an id from the current UTC time.
    pub fn generate() -> Self {
        Self(Utc::now().format(VERSION_FORMAT).to_string())
    }

    /// Id usable by a registered unit: non-empty and not the sentinel.
    pub fn for_unit(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(Error::UnknownVersion("empty version id".into()));
        }
        if s == Self::SENTINEL {
            return Err(Error::ReservedVersion(s));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_sentinel(&self) -> bool {
        self.0 == Self::SENTINEL
    }

    /// The timestamp encoded in the id, if it has the standard format.
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.0, VERSION_FORMAT).ok()
    }

    /// `YYYY-MM-DD HH:MM:SS`, or an empty string for non-timestamp ids.
    pub fn display_datetime(&self) -> String {
        self.datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which migration stream a unit or tracking record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationKind {
    /// Structural changes. Stored as `scheme`, the column default.
    Scheme,
    /// Content transformations that run after the schema is in place.
    Data,
}

impl MigrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationKind::Scheme => "scheme",
            MigrationKind::Data => "data",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MigrationKind::Scheme => "schema",
            MigrationKind::Data => "data",
        }
    }
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheme" => Ok(MigrationKind::Scheme),
            "data" => Ok(MigrationKind::Data),
            other => Err(Error::Other(format!("unknown migration kind: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_string_comparison() {
        let a = VersionId::from("20230101000000");
        let b = VersionId::from("20230201000000");
        assert!(a < b);
        assert!(VersionId::sentinel() < a);
    }

    #[test]
    fn rejects_sentinel_for_units() {
        assert!(matches!(
            VersionId::for_unit("0"),
            Err(Error::ReservedVersion(_))
        ));
        assert!(VersionId::for_unit("").is_err());
        assert_eq!(
            VersionId::for_unit("20230101000000").unwrap().as_str(),
            "20230101000000"
        );
    }

    #[test]
    fn parses_encoded_datetime() {
        let v = VersionId::from("20230215093000");
        assert_eq!(v.display_datetime(), "2023-02-15 09:30:00");
        assert!(VersionId::from("not-a-date").datetime().is_none());
        assert_eq!(VersionId::from("abc").display_datetime(), "");
    }

    #[test]
    fn generated_ids_have_fixed_width() {
        let v = VersionId::generate();
        assert_eq!(v.as_str().len(), 14);
        assert!(v.datetime().is_some());
    }

    #[test]
    fn kind_round_trips_through_its_column_value() {
        assert_eq!("scheme".parse::<MigrationKind>().unwrap(), MigrationKind::Scheme);
        assert_eq!("data".parse::<MigrationKind>().unwrap(), MigrationKind::Data);
        assert!("schema".parse::<MigrationKind>().is_err());
        assert_eq!(MigrationKind::Data.to_string(), "data");
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&MigrationKind::Scheme).unwrap();
        assert_eq!(json, r#""scheme""#);
    }
}
