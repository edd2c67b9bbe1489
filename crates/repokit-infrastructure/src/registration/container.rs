use repokit_domain::DomainError;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// How long a resolved service instance lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceLifetime {
    /// One instance per provider
    Singleton,
    /// One instance per scope
    Scoped,
    /// A new instance per request
    Transient,
}

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&ServiceScope) -> Result<Instance, DomainError> + Send + Sync>;

#[derive(Clone)]
struct ServiceDescriptor {
    lifetime: ServiceLifetime,
    type_name: &'static str,
    factory: Factory,
}

/// Service registrations, keyed by the resolved type.
///
/// Services are resolved by value, so register cheap-to-clone handles such as
/// `Arc<T>` or `Arc<dyn Trait>`. Registering a type again replaces the
/// earlier registration.
#[derive(Default)]
pub struct ServiceCollection {
    services: HashMap<TypeId, ServiceDescriptor>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn register<S, F>(&mut self, lifetime: ServiceLifetime, factory: F) -> &mut Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> Result<S, DomainError> + Send + Sync + 'static,
    {
        let factory: Factory =
            Arc::new(move |scope: &ServiceScope| Ok(Arc::new(factory(scope)?) as Instance));
        self.services.insert(
            TypeId::of::<S>(),
            ServiceDescriptor {
                lifetime,
                type_name: type_name::<S>(),
                factory,
            },
        );
        self
    }

    pub fn add_singleton<S, F>(&mut self, factory: F) -> &mut Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> Result<S, DomainError> + Send + Sync + 'static,
    {
        self.register(ServiceLifetime::Singleton, factory)
    }

    pub fn add_scoped<S, F>(&mut self, factory: F) -> &mut Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> Result<S, DomainError> + Send + Sync + 'static,
    {
        self.register(ServiceLifetime::Scoped, factory)
    }

    pub fn add_transient<S, F>(&mut self, factory: F) -> &mut Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> Result<S, DomainError> + Send + Sync + 'static,
    {
        self.register(ServiceLifetime::Transient, factory)
    }

    /// Register an existing value as a singleton
    pub fn add_instance<S: Clone + Send + Sync + 'static>(&mut self, instance: S) -> &mut Self {
        self.add_singleton(move |_| Ok(instance.clone()))
    }

    pub fn contains<S: 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<S>())
    }

    pub fn lifetime_of<S: 'static>(&self) -> Option<ServiceLifetime> {
        self.services
            .get(&TypeId::of::<S>())
            .map(|descriptor| descriptor.lifetime)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn build(self) -> ServiceProvider {
        ServiceProvider {
            inner: Arc::new(ProviderInner {
                services: self.services,
                singletons: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.services.values().map(|d| d.type_name).collect();
        names.sort_unstable();
        f.debug_struct("ServiceCollection")
            .field("services", &names)
            .finish()
    }
}

struct ProviderInner {
    services: HashMap<TypeId, ServiceDescriptor>,
    singletons: Mutex<HashMap<TypeId, Instance>>,
}

/// Root of resolution; cheap to clone
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    pub fn create_scope(&self) -> ServiceScope {
        self.scope(false)
    }

    /// Scope handed to singleton factories; it refuses scoped services so a
    /// singleton never captures one
    fn root_scope(&self) -> ServiceScope {
        self.scope(true)
    }

    fn scope(&self, root: bool) -> ServiceScope {
        ServiceScope {
            inner: Arc::new(ScopeInner {
                provider: self.clone(),
                scoped: Mutex::new(HashMap::new()),
                root,
            }),
        }
    }

    /// Resolve a singleton or transient service; scoped services need a scope
    pub fn get<S: Clone + Send + Sync + 'static>(&self) -> Result<S, DomainError> {
        if let Some(descriptor) = self.inner.services.get(&TypeId::of::<S>()) {
            if descriptor.lifetime == ServiceLifetime::Scoped {
                return Err(DomainError::Infrastructure(format!(
                    "{} is scoped and must be resolved from a scope",
                    descriptor.type_name
                )));
            }
        }
        self.root_scope().get::<S>()
    }

    fn descriptor(&self, type_id: TypeId, name: &str) -> Result<&ServiceDescriptor, DomainError> {
        self.inner.services.get(&type_id).ok_or_else(|| {
            DomainError::Infrastructure(format!("No service registered for {}", name))
        })
    }
}

struct ScopeInner {
    provider: ServiceProvider,
    scoped: Mutex<HashMap<TypeId, Instance>>,
    root: bool,
}

/// Resolution scope holding the scoped instances; cheap to clone, and the
/// scoped instances are dropped with the last clone
#[derive(Clone)]
pub struct ServiceScope {
    inner: Arc<ScopeInner>,
}

impl ServiceScope {
    pub fn provider(&self) -> &ServiceProvider {
        &self.inner.provider
    }

    pub fn get<S: Clone + Send + Sync + 'static>(&self) -> Result<S, DomainError> {
        let type_id = TypeId::of::<S>();
        let provider = &self.inner.provider;
        let descriptor = provider.descriptor(type_id, type_name::<S>())?;

        let instance = match descriptor.lifetime {
            ServiceLifetime::Transient => (descriptor.factory)(self)?,
            ServiceLifetime::Scoped if self.inner.root => {
                return Err(DomainError::Infrastructure(format!(
                    "{} is scoped and cannot be resolved by a singleton",
                    descriptor.type_name
                )));
            }
            ServiceLifetime::Scoped => self.cached(&self.inner.scoped, type_id, descriptor)?,
            ServiceLifetime::Singleton => {
                provider
                    .root_scope()
                    .cached(&provider.inner.singletons, type_id, descriptor)?
            }
        };

        instance.downcast_ref::<S>().cloned().ok_or_else(|| {
            DomainError::Infrastructure(format!(
                "Service registered for {} produced another type",
                type_name::<S>()
            ))
        })
    }

    /// Construction runs outside the lock; when two resolutions race, the
    /// first stored instance wins
    fn cached(
        &self,
        cache: &Mutex<HashMap<TypeId, Instance>>,
        type_id: TypeId,
        descriptor: &ServiceDescriptor,
    ) -> Result<Instance, DomainError> {
        if let Some(existing) = cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
        {
            return Ok(Arc::clone(existing));
        }

        let created = (descriptor.factory)(self)?;
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(type_id).or_insert(created)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Clock {
        id: usize,
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_scoped_instances_are_shared_within_a_scope() {
        let created = counter();
        let mut services = ServiceCollection::new();
        let c = Arc::clone(&created);
        services.add_scoped(move |_| {
            Ok(Arc::new(Clock {
                id: c.fetch_add(1, Ordering::SeqCst),
            }))
        });
        let provider = services.build();

        let first = provider.create_scope();
        let a = first.get::<Arc<Clock>>().unwrap();
        let b = first.get::<Arc<Clock>>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let second = provider.create_scope();
        let c = second.get::<Arc<Clock>>().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.id, 1);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_singletons_are_shared_across_scopes() {
        let mut services = ServiceCollection::new();
        services.add_singleton(|_| Ok(Arc::new(Clock { id: 7 })));
        let provider = services.build();

        let a = provider.create_scope().get::<Arc<Clock>>().unwrap();
        let b = provider.get::<Arc<Clock>>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_transients_are_built_per_request() {
        let created = counter();
        let mut services = ServiceCollection::new();
        let c = Arc::clone(&created);
        services.add_transient(move |_| Ok(c.fetch_add(1, Ordering::SeqCst)));
        let scope = services.build().create_scope();

        assert_eq!(scope.get::<usize>().unwrap(), 0);
        assert_eq!(scope.get::<usize>().unwrap(), 1);
    }

    #[test]
    fn test_factories_resolve_dependencies_from_the_scope() {
        let mut services = ServiceCollection::new();
        services
            .add_instance(String::from("primary"))
            .add_scoped(|scope| Ok(Arc::new(format!("{}-db", scope.get::<String>()?))));
        let scope = services.build().create_scope();

        assert_eq!(scope.get::<Arc<String>>().unwrap().as_str(), "primary-db");
    }

    #[test]
    fn test_missing_registration_names_the_type() {
        let scope = ServiceCollection::new().build().create_scope();
        let err = scope.get::<Arc<Clock>>().unwrap_err();
        assert!(matches!(err, DomainError::Infrastructure(_)));
        assert!(err.message().contains("Clock"));
    }

    #[test]
    fn test_scoped_services_are_not_resolved_from_the_root() {
        let mut services = ServiceCollection::new();
        services.add_scoped(|_| Ok(Arc::new(Clock { id: 0 })));
        assert_eq!(services.lifetime_of::<Arc<Clock>>(), Some(ServiceLifetime::Scoped));

        let err = services.build().get::<Arc<Clock>>().unwrap_err();
        assert!(err.message().contains("scoped"));
    }

    #[test]
    fn test_singleton_factories_cannot_capture_scoped_services() {
        let mut services = ServiceCollection::new();
        services
            .add_scoped(|_| Ok(Arc::new(Clock { id: 3 })))
            .add_singleton(|scope| Ok(scope.get::<Arc<Clock>>()?.id));
        let scope = services.build().create_scope();

        let err = scope.get::<usize>().unwrap_err();
        assert!(matches!(err, DomainError::Infrastructure(_)));
        assert!(err.message().contains("singleton"));
        // the scope itself still resolves the scoped service
        assert_eq!(scope.get::<Arc<Clock>>().unwrap().id, 3);
    }
}
