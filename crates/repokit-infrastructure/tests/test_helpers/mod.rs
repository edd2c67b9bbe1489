#![allow(dead_code)]

use std::sync::Arc;

use repokit_domain::{Entity, Repository};
use repokit_infrastructure::config::ContextOptions;
use repokit_infrastructure::logging::init_test_logger;
use repokit_infrastructure::persistence::{Database, DbContext, MappingContext, Model, ModelBuilder};
use repokit_infrastructure::registration::{ServiceCollection, ServiceProvider, ServiceScope};
use serde::{Deserialize, Serialize};

/// Entity with a store-generated integer key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEntity {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub score: i64,
    #[serde(default)]
    pub tag: Option<String>,
}

impl Entity for TestEntity {
    const SET_NAME: &'static str = "test_entities";
}

impl TestEntity {
    pub fn new(name: &str, score: i64) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            score,
            tag: None,
        }
    }

    pub fn tagged(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }
}

/// Entity keyed by a caller-chosen string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

impl Entity for Setting {
    const SET_NAME: &'static str = "settings";
    const KEY_FIELD: &'static str = "key";
}

impl Setting {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

pub struct TestContext {
    db: DbContext,
}

impl TestContext {
    pub fn new(db: DbContext) -> Self {
        Self { db }
    }
}

impl MappingContext for TestContext {
    fn configure(model: &mut ModelBuilder<Self>) {
        model.entity::<TestEntity>().entity::<Setting>();
    }

    fn db(&self) -> &DbContext {
        &self.db
    }
}

/// Fresh in-memory database with the tables of [`TestContext`]
pub async fn setup_in_memory_db() -> Arc<Database> {
    init_test_logger();
    let database = Database::connect(&ContextOptions::in_memory())
        .await
        .expect("Connect in-memory database");
    let model = Model::build::<TestContext>().expect("Build model");
    database.ensure_created(&model).await.expect("Create tables");
    Arc::new(database)
}

pub async fn setup_context() -> Arc<TestContext> {
    let database = setup_in_memory_db().await;
    Arc::new(TestContext::new(
        DbContext::new::<TestContext>(database).expect("Build context"),
    ))
}

/// Provider with the database, the scoped context and every repository
pub async fn setup_services() -> ServiceProvider {
    let database = setup_in_memory_db().await;
    let mut services = ServiceCollection::new();
    services
        .add_instance(Arc::clone(&database))
        .add_mapping_context(database, TestContext::new)
        .expect("Register context")
        .add_repositories::<TestContext>()
        .expect("Register repositories");
    services.build()
}

pub async fn setup_repository() -> (ServiceScope, Arc<dyn Repository<TestEntity>>) {
    let scope = setup_services().await.create_scope();
    let repository = scope
        .get::<Arc<dyn Repository<TestEntity>>>()
        .expect("Resolve repository");
    (scope, repository)
}

pub fn context_of(scope: &ServiceScope) -> Arc<TestContext> {
    scope.get::<Arc<TestContext>>().expect("Resolve context")
}
