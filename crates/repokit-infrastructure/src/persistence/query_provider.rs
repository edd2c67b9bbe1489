use async_trait::async_trait;
use repokit_domain::{entity_name, DomainError, Entity, Filter, QueryProvider, QuerySpec};
use sqlx::Sqlite;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::{document, sql, Database, ResultExt};

/// No-tracking reads over one entity set
pub struct SetQueryProvider<T: Entity> {
    database: Arc<Database>,
    set: &'static str,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SetQueryProvider<T> {
    pub fn new(database: Arc<Database>, set: &'static str) -> Self {
        Self {
            database,
            set,
            _entity: PhantomData,
        }
    }

    pub fn set_name(&self) -> &'static str {
        self.set
    }

    async fn scalar(&self, statement: sql::Statement, operation: &str) -> Result<i64, DomainError> {
        let arguments = statement.arguments()?;
        sqlx::query_scalar_with::<Sqlite, i64, _>(&statement.sql, arguments)
            .fetch_one(self.database.pool())
            .await
            .map_repo_error(operation)
    }
}

#[async_trait]
impl<T: Entity> QueryProvider<T> for SetQueryProvider<T> {
    async fn fetch(&self, spec: &QuerySpec<T>) -> Result<Vec<T>, DomainError> {
        let statement = sql::select(self.set, spec)?;
        let arguments = statement.arguments()?;

        let bodies = sqlx::query_scalar_with::<Sqlite, String, _>(&statement.sql, arguments)
            .fetch_all(self.database.pool())
            .await
            .map_repo_error(&format!("Query {}", self.set))?;

        debug!(
            entity = entity_name::<T>(),
            rows = bodies.len(),
            "Fetched documents"
        );

        let entities = bodies
            .iter()
            .map(|body| document::parse_document::<T>(body))
            .collect::<Result<Vec<_>, _>>()?;

        if spec.needs_in_memory_pass() {
            return Ok(spec.apply_in_memory(entities));
        }
        Ok(entities)
    }

    async fn count(&self, filter: &Filter) -> Result<u64, DomainError> {
        let count = self
            .scalar(sql::count(self.set, filter)?, &format!("Count {}", self.set))
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn exists(&self, filter: &Filter) -> Result<bool, DomainError> {
        let found = self
            .scalar(sql::exists(self.set, filter)?, &format!("Probe {}", self.set))
            .await?;
        Ok(found != 0)
    }
}
