use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("duplicate migration version: {0}")]
    DuplicateVersion(String),

    #[error("unknown version: {0}")]
    UnknownVersion(String),

    #[error("migration handler not found: {0}")]
    HandlerNotFound(String),

    #[error("already at first version")]
    AtFirstVersion,

    #[error("already at latest version")]
    AtLatestVersion,

    #[error("the delta couldn't be reached: {0}")]
    DeltaOutOfRange(String),

    #[error("unresolvable version alias: {0}")]
    UnresolvableAlias(String),

    #[error("version '{0}' is reserved and cannot name a migration")]
    ReservedVersion(String),

    #[error("version {version} is already recorded as {kind}")]
    AlreadyRecorded { version: String, kind: String },

    #[error("migration catalog has not been loaded")]
    CatalogNotLoaded,

    #[error("migration {version} failed: {source}")]
    MigrationFailed {
        version: String,
        #[source]
        source: Box<Error>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors raised while turning a requested version into a target. These
    /// happen before any unit runs and leave no side effects behind.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Error::UnknownVersion(_)
                | Error::AtFirstVersion
                | Error::AtLatestVersion
                | Error::DeltaOutOfRange(_)
                | Error::UnresolvableAlias(_)
        )
    }

    /// Wrap a unit's own failure with the version that raised it.
    pub fn migration_failed(version: impl Into<String>, source: Error) -> Self {
        Error::MigrationFailed {
            version: version.into(),
            source: Box::new(source),
        }
    }
}
