use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::{Filter, OrderBy, QuerySpec};
use crate::entity::Entity;
use crate::shared::DomainError;

/// Executes query specifications against an entity set.
///
/// Implemented by storage adapters; reads never track the returned entities.
#[async_trait]
pub trait QueryProvider<T: Entity>: Send + Sync {
    /// Load every entity matching the spec, ordered and paged.
    async fn fetch(&self, spec: &QuerySpec<T>) -> Result<Vec<T>, DomainError>;

    /// Count entities matching the filter.
    async fn count(&self, filter: &Filter) -> Result<u64, DomainError>;

    /// Whether at least one entity matches the filter.
    async fn exists(&self, filter: &Filter) -> Result<bool, DomainError>;
}

/// Composable, lazily executed query over one entity set.
pub struct Queryable<T: Entity> {
    provider: Arc<dyn QueryProvider<T>>,
    spec: QuerySpec<T>,
}

impl<T: Entity> Queryable<T> {
    pub fn new(provider: Arc<dyn QueryProvider<T>>) -> Self {
        Self {
            provider,
            spec: QuerySpec::all(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.spec = self.spec.filter(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy<T>) -> Self {
        self.spec = self.spec.order_by(order);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.spec = self.spec.skip(skip);
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.spec = self.spec.take(take);
        self
    }

    pub fn spec(&self) -> &QuerySpec<T> {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec<T> {
        self.spec
    }

    pub async fn to_list(&self) -> Result<Vec<T>, DomainError> {
        self.provider.fetch(&self.spec).await
    }

    /// First entity of the query; an explicit `take(0)` yields `None`.
    pub async fn first(&self) -> Result<Option<T>, DomainError> {
        let take = self.spec.take_count().map_or(1, |take| take.min(1));
        let spec = self.spec.clone().take(take);
        Ok(self.provider.fetch(&spec).await?.into_iter().next())
    }

    /// Counts matches; paging, when set, is taken into account.
    pub async fn count(&self) -> Result<u64, DomainError> {
        if self.spec.is_paged() {
            return Ok(self.provider.fetch(&self.spec).await?.len() as u64);
        }
        self.provider.count(self.spec.filter_ref()).await
    }

    pub async fn any(&self) -> Result<bool, DomainError> {
        if self.spec.is_paged() {
            return Ok(self.count().await? > 0);
        }
        self.provider.exists(self.spec.filter_ref()).await
    }
}

impl<T: Entity> Clone for Queryable<T> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            spec: self.spec.clone(),
        }
    }
}

impl<T: Entity> fmt::Debug for Queryable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queryable").field("spec", &self.spec).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: i64,
        name: String,
    }

    impl Entity for Item {
        const SET_NAME: &'static str = "items";
    }

    // Mock provider that ignores filters and serves a fixed list

    struct MockProvider {
        items: Vec<Item>,
        count_calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryProvider<Item> for MockProvider {
        async fn fetch(&self, spec: &QuerySpec<Item>) -> Result<Vec<Item>, DomainError> {
            Ok(spec.apply_in_memory(self.items.clone()))
        }

        async fn count(&self, _filter: &Filter) -> Result<u64, DomainError> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.items.len() as u64)
        }

        async fn exists(&self, _filter: &Filter) -> Result<bool, DomainError> {
            Ok(!self.items.is_empty())
        }
    }

    fn queryable() -> (Arc<MockProvider>, Queryable<Item>) {
        let provider = Arc::new(MockProvider {
            items: (1..=5)
                .map(|id| Item {
                    id,
                    name: format!("item-{}", id),
                })
                .collect(),
            count_calls: AtomicUsize::new(0),
        });
        let query = Queryable::new(provider.clone() as Arc<dyn QueryProvider<Item>>);
        (provider, query)
    }

    #[tokio::test]
    async fn test_first_takes_one() {
        let (_, query) = queryable();
        let first = query
            .order_by(OrderBy::key(|i: &Item| i.id).descending())
            .first()
            .await
            .unwrap();
        assert_eq!(first.map(|i| i.id), Some(5));
    }

    #[tokio::test]
    async fn test_first_honours_take_zero() {
        let (_, query) = queryable();
        let empty = query.take(0);
        assert!(empty.to_list().await.unwrap().is_empty());
        assert_eq!(empty.count().await.unwrap(), 0);
        assert!(!empty.any().await.unwrap());
        assert_eq!(empty.first().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_count_uses_provider_count_when_unpaged() {
        let (provider, query) = queryable();
        assert_eq!(query.count().await.unwrap(), 5);
        assert_eq!(provider.count_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_count_respects_paging() {
        let (provider, query) = queryable();
        assert_eq!(query.skip(3).count().await.unwrap(), 2);
        assert_eq!(provider.count_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_builder_accumulates_spec() {
        let (_, query) = queryable();
        let query = query
            .filter(Filter::gt("id", 1))
            .filter(Filter::lt("id", 5))
            .take(2);
        assert_eq!(query.spec().take_count(), Some(2));
        assert_eq!(query.spec().filter_ref().fields(), vec!["id", "id"]);
    }
}
