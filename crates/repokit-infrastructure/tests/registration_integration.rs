use std::sync::Arc;

use repokit_domain::{Filter, Repository};
use repokit_infrastructure::persistence::{DbContext, MappingContext, ModelBuilder, RepositoryFactory};
use repokit_infrastructure::registration::ServiceCollection;
use serde::{Deserialize, Serialize};

mod test_helpers;

use test_helpers::{context_of, setup_services, Setting, TestContext, TestEntity};

#[tokio::test]
async fn add_repositories_binds_every_declared_set() {
    let mut services = ServiceCollection::new();
    services
        .add_repositories::<TestContext>()
        .expect("Register repositories");

    assert!(services.contains::<Arc<dyn Repository<TestEntity>>>());
    assert!(services.contains::<Arc<dyn Repository<Setting>>>());
    assert_eq!(services.len(), 2);
}

#[tokio::test]
async fn scoped_repositories_share_the_scope_context() {
    let provider = setup_services().await;

    let scope = provider.create_scope();
    let first = scope.get::<Arc<dyn Repository<TestEntity>>>().unwrap();
    let again = scope.get::<Arc<dyn Repository<TestEntity>>>().unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let other_scope = provider.create_scope();
    let other = other_scope
        .get::<Arc<dyn Repository<TestEntity>>>()
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &other));
    assert!(!Arc::ptr_eq(&context_of(&scope), &context_of(&other_scope)));

    // both scopes see the same database
    first.add(TestEntity::new("shared", 1)).await.unwrap();
    assert_eq!(other.count().await.unwrap(), 1);
}

#[tokio::test]
async fn repository_without_context_registration_fails_to_resolve() {
    let mut services = ServiceCollection::new();
    services.add_repositories::<TestContext>().unwrap();
    let scope = services.build().create_scope();

    let err = scope
        .get::<Arc<dyn Repository<TestEntity>>>()
        .err()
        .expect("Context is not registered");
    assert!(err.message().contains("TestContext"));
}

#[tokio::test]
async fn factory_returns_the_same_repository_per_type() {
    let provider = setup_services().await;
    let scope = provider.create_scope();
    let factory = RepositoryFactory::<TestContext>::new(scope.clone());

    let a = factory.get_repository::<TestEntity>().unwrap();
    let b = factory.get_repository::<TestEntity>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let settings = factory.get_repository::<Setting>().unwrap();
    settings.add(Setting::new("k", "v")).await.unwrap();
    assert_eq!(factory.len(), 2);

    a.add(TestEntity::new("via factory", 2)).await.unwrap();
    let via_scope = scope.get::<Arc<dyn Repository<TestEntity>>>().unwrap();
    assert_eq!(via_scope.count_where(&Filter::eq("name", "via factory")).await.unwrap(), 1);
}

#[tokio::test]
async fn factory_shared_across_tasks_hands_out_one_instance() {
    let provider = setup_services().await;
    let factory = Arc::new(RepositoryFactory::<TestContext>::new(provider.create_scope()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let factory = Arc::clone(&factory);
            tokio::spawn(async move { factory.get_repository::<TestEntity>().unwrap() })
        })
        .collect();

    let mut repositories = Vec::new();
    for handle in handles {
        repositories.push(handle.await.unwrap());
    }
    assert!(repositories.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stranger {
    id: i64,
}

impl repokit_domain::Entity for Stranger {
    const SET_NAME: &'static str = "strangers";
}

#[tokio::test]
async fn factory_rejects_undeclared_entity_types() {
    let provider = setup_services().await;
    let factory = RepositoryFactory::<TestContext>::new(provider.create_scope());

    let err = factory.get_repository::<Stranger>().err().unwrap();
    assert!(err.message().contains("Stranger"));
    assert!(factory.is_empty());
}

struct BrokenContext {
    db: DbContext,
}

impl MappingContext for BrokenContext {
    fn configure(model: &mut ModelBuilder<Self>) {
        model.entity::<TestEntity>().entity::<Stranger>();
        model.entity::<DuplicateSet>();
    }

    fn db(&self) -> &DbContext {
        &self.db
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DuplicateSet {
    id: i64,
}

impl repokit_domain::Entity for DuplicateSet {
    const SET_NAME: &'static str = "test_entities";
}

#[tokio::test]
async fn add_repositories_rejects_conflicting_declarations() {
    let mut services = ServiceCollection::new();
    let err = services.add_repositories::<BrokenContext>().unwrap_err();
    assert!(err.message().contains("test_entities"));
    assert!(services.is_empty());
}
