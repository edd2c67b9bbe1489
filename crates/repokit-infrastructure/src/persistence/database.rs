use repokit_domain::DomainError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;
use tracing::info;

use super::{sql, Model, ResultExt};
use crate::config::ContextOptions;

/// Owner of the SQLite pool shared by every context of a process
pub struct Database {
    pool: SqlitePool,
    url: String,
}

impl Database {
    /// Open a database file, creating it and its directory when missing
    pub async fn new(db_path: &str) -> Result<Self, DomainError> {
        Self::connect(&ContextOptions::sqlite_file(db_path)).await
    }

    pub async fn connect(options: &ContextOptions) -> Result<Self, DomainError> {
        if !options.is_in_memory() {
            if let Some(parent) = file_path(&options.database_url).and_then(Path::parent) {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DomainError::Infrastructure(format!("Failed to create DB directory: {}", e))
                    })?;
                }
            }
        }

        let connect_options = SqliteConnectOptions::from_str(&options.database_url)
            .map_err(|e| {
                DomainError::Infrastructure(format!(
                    "Invalid database url '{}': {}",
                    options.database_url, e
                ))
            })?
            .create_if_missing(true)
            .busy_timeout(options.busy_timeout);

        let mut pool_options =
            SqlitePoolOptions::new().max_connections(options.effective_max_connections());
        if options.is_in_memory() {
            // every new connection would open a fresh, empty database
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DomainError::Infrastructure(e.to_string()))?;

        info!(
            url = %options.database_url,
            max_connections = options.effective_max_connections(),
            "Database connected"
        );

        Ok(Self {
            pool,
            url: options.database_url.clone(),
        })
    }

    /// Create the table of every declared entity set that does not exist yet
    pub async fn ensure_created(&self, model: &Model) -> Result<(), DomainError> {
        let start = Instant::now();
        for set in model.sets() {
            sqlx::query(&sql::create_table(set.set_name()))
                .execute(&self.pool)
                .await
                .map_repo_error(&format!("Create table {}", set.set_name()))?;
        }
        info!(
            "🗄️  Ensured {} entity set table(s) in {:.2}ms",
            model.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn file_path(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        None
    } else {
        Some(Path::new(path))
    }
}
