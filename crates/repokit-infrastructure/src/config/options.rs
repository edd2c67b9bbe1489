use std::path::Path;
use std::time::Duration;

use repokit_domain::DomainError;

pub const DATABASE_URL_ENV: &str = "REPOKIT_DATABASE_URL";
pub const MAX_CONNECTIONS_ENV: &str = "REPOKIT_MAX_CONNECTIONS";
pub const BUSY_TIMEOUT_ENV: &str = "REPOKIT_BUSY_TIMEOUT_MS";
pub const ENSURE_CREATED_ENV: &str = "REPOKIT_ENSURE_CREATED";

/// Connection settings for a mapping context's database
#[derive(Debug, Clone, PartialEq)]
pub struct ContextOptions {
    /// sqlx SQLite url, e.g. `sqlite::memory:` or `sqlite:/var/lib/app.db`
    pub database_url: String,

    /// Pool size; forced to 1 for in-memory databases
    pub max_connections: u32,

    /// How long SQLite waits on a locked database before failing
    pub busy_timeout: Duration,

    /// Create missing entity-set tables when a context is built
    pub ensure_created: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(10),
            ensure_created: true,
        }
    }
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Private in-memory database, alive as long as its pool
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn sqlite_file(path: impl AsRef<Path>) -> Self {
        Self {
            database_url: format!("sqlite:{}", path.as_ref().display()),
            ..Self::default()
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_ensure_created(mut self, ensure_created: bool) -> Self {
        self.ensure_created = ensure_created;
        self
    }

    /// Overlay `REPOKIT_*` environment variables on the defaults
    pub fn from_env() -> Result<Self, DomainError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DomainError> {
        let mut options = Self::default();

        if let Some(url) = lookup(DATABASE_URL_ENV) {
            options.database_url = url;
        }
        if let Some(raw) = lookup(MAX_CONNECTIONS_ENV) {
            options.max_connections = raw.parse().map_err(|_| {
                DomainError::InvalidInput(format!("{} must be a number: {}", MAX_CONNECTIONS_ENV, raw))
            })?;
        }
        if let Some(raw) = lookup(BUSY_TIMEOUT_ENV) {
            let millis: u64 = raw.parse().map_err(|_| {
                DomainError::InvalidInput(format!("{} must be a number: {}", BUSY_TIMEOUT_ENV, raw))
            })?;
            options.busy_timeout = Duration::from_millis(millis);
        }
        if let Some(raw) = lookup(ENSURE_CREATED_ENV) {
            options.ensure_created = matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(options)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Pool size actually used; an in-memory database lives in one connection
    pub fn effective_max_connections(&self) -> u32 {
        if self.is_in_memory() {
            1
        } else {
            self.max_connections.max(1)
        }
    }
}
