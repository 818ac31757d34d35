use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use datashift_common::{Error, MigrationKind, Result, VersionId};
use datashift_db::MigrationSession;
use tracing::debug;

use crate::sql::split_statements;

/// A single migration unit. Implementations do their work through the
/// context's session so every statement is observed.
pub trait MigrationHandler {
    fn execute(&self, ctx: &mut MigrationContext<'_>) -> Result<()>;

    fn description(&self) -> Option<&str> {
        None
    }
}

/// Asks the operator a yes/no question on behalf of a unit.
pub trait Prompt {
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;
}

/// Output and prompt channels shared by every unit of a run.
pub struct MigrationIo {
    pub output: Box<dyn Write>,
    pub prompt: Option<Box<dyn Prompt>>,
}

impl MigrationIo {
    pub fn new(output: Box<dyn Write>) -> Self {
        Self {
            output,
            prompt: None,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Discards progress text and answers every prompt with its default.
    pub fn sink() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    pub fn with_prompt(mut self, prompt: impl Prompt + 'static) -> Self {
        self.prompt = Some(Box::new(prompt));
        self
    }

    pub fn writeln(&mut self, line: impl fmt::Display) -> Result<()> {
        writeln!(self.output, "{line}")?;
        Ok(())
    }
}

/// Everything a unit receives while it runs.
pub struct MigrationContext<'a> {
    version: &'a VersionId,
    kind: MigrationKind,
    session: MigrationSession<'a>,
    output: &'a mut dyn Write,
    prompt: Option<&'a dyn Prompt>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(
        version: &'a VersionId,
        kind: MigrationKind,
        session: MigrationSession<'a>,
        output: &'a mut dyn Write,
        prompt: Option<&'a dyn Prompt>,
    ) -> Self {
        Self {
            version,
            kind,
            session,
            output,
            prompt,
        }
    }

    pub fn version(&self) -> &VersionId {
        self.version
    }

    pub fn kind(&self) -> MigrationKind {
        self.kind
    }

    pub fn session(&self) -> &MigrationSession<'a> {
        &self.session
    }

    pub fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    pub fn writeln(&mut self, line: impl fmt::Display) -> Result<()> {
        writeln!(self.output, "{line}")?;
        Ok(())
    }

    pub fn is_interactive(&self) -> bool {
        self.prompt.is_some()
    }

    /// Ask the operator; without a prompt the default is the answer.
    pub fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        match self.prompt {
            Some(prompt) => prompt.confirm(question, default),
            None => Ok(default),
        }
    }
}

/// Opaque reference to a handler, as produced by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRef {
    pub namespace: String,
    /// Unit name, e.g. `Data20230101000000`.
    pub name: String,
    /// Source file, when the unit was discovered on disk.
    pub path: Option<PathBuf>,
}

impl HandlerRef {
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            path: None,
        }
    }

    pub fn file(namespace: impl Into<String>, name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            path: Some(path),
        }
    }

    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} ({})", self.qualified_name(), path.display()),
            None => f.write_str(&self.qualified_name()),
        }
    }
}

/// Turns a [`HandlerRef`] into a runnable handler.
pub trait HandlerLoader {
    /// `Ok(None)` when this loader does not know the reference.
    fn load(&self, reference: &HandlerRef) -> Result<Option<Box<dyn MigrationHandler>>>;
}

/// Tries each loader in turn.
#[derive(Default)]
pub struct LoaderChain {
    loaders: Vec<Box<dyn HandlerLoader>>,
}

impl LoaderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, loader: impl HandlerLoader + 'static) {
        self.loaders.push(Box::new(loader));
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl HandlerLoader for LoaderChain {
    fn load(&self, reference: &HandlerRef) -> Result<Option<Box<dyn MigrationHandler>>> {
        for loader in &self.loaders {
            if let Some(handler) = loader.load(reference)? {
                return Ok(Some(handler));
            }
        }
        Ok(None)
    }
}

/// A unit made of plain SQL statements.
pub struct SqlMigration {
    statements: Vec<String>,
}

impl SqlMigration {
    pub fn new(sql: &str) -> Self {
        Self {
            statements: split_statements(sql),
        }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

impl MigrationHandler for SqlMigration {
    fn execute(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        for statement in &self.statements {
            ctx.session().execute_batch(statement)?;
        }
        Ok(())
    }
}

/// Loads `.sql` files referenced by discovery.
pub struct SqlFileLoader {
    extension: String,
}

impl SqlFileLoader {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }
}

impl Default for SqlFileLoader {
    fn default() -> Self {
        Self::new("sql")
    }
}

impl HandlerLoader for SqlFileLoader {
    fn load(&self, reference: &HandlerRef) -> Result<Option<Box<dyn MigrationHandler>>> {
        let Some(path) = reference.path.as_deref() else {
            return Ok(None);
        };
        if !self.accepts(path) {
            return Ok(None);
        }

        let sql = match std::fs::read_to_string(path) {
            Ok(sql) => sql,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        let migration = SqlMigration::new(&sql);
        debug!(
            "loaded {} with {} statement(s)",
            path.display(),
            migration.statements().len()
        );
        Ok(Some(Box::new(migration)))
    }
}

/// Adapts a closure into a [`MigrationHandler`].
pub struct FnHandler<F>(Rc<F>);

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self(Rc::new(f))
    }
}

impl<F> Clone for FnHandler<F> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<F> MigrationHandler for FnHandler<F>
where
    F: Fn(&mut MigrationContext<'_>) -> Result<()>,
{
    fn execute(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

type HandlerFactory = Rc<dyn Fn() -> Box<dyn MigrationHandler>>;

/// Handlers compiled into the program, keyed by version.
///
/// Acts as a discovery source (see [`crate::finder::MigrationFinder`]) and
/// as a loader for the references it hands out. Cloning is cheap.
#[derive(Clone)]
pub struct RegisteredHandlers {
    prefix: String,
    factories: BTreeMap<String, HandlerFactory>,
}

impl RegisteredHandlers {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            factories: BTreeMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register a handler; the catalog gets a clone of it.
    pub fn register<H>(&mut self, version: &str, handler: H) -> &mut Self
    where
        H: MigrationHandler + Clone + 'static,
    {
        self.factories.insert(
            version.to_string(),
            Rc::new(move || Box::new(handler.clone()) as Box<dyn MigrationHandler>),
        );
        self
    }

    pub fn register_fn<F>(&mut self, version: &str, f: F) -> &mut Self
    where
        F: Fn(&mut MigrationContext<'_>) -> Result<()> + 'static,
    {
        self.register(version, FnHandler::new(f))
    }

    pub fn unit_name(&self, version: &str) -> String {
        format!("{}{version}", self.prefix)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl HandlerLoader for RegisteredHandlers {
    fn load(&self, reference: &HandlerRef) -> Result<Option<Box<dyn MigrationHandler>>> {
        if reference.path.is_some() {
            return Ok(None);
        }
        let Some(version) = reference.name.strip_prefix(&self.prefix) else {
            return Ok(None);
        };
        Ok(self.factories.get(version).map(|factory| factory()))
    }
}
