//! Lazy, memoized capability resolution

use dashmap::DashMap;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use super::resource::{location_for, parse_mappings};
use super::table::{AnyInstance, Capability, ExtensionTable};
use crate::{Result, RpcError};

type ClassTable = HashMap<String, String>;

/// ExtensionLoader hands out one shared instance per (capability, name).
///
/// Mapping resources for a capability are read on its first resolution.
/// Every cache slot is a `OnceLock` created on demand, so concurrent first
/// callers for one name wait on that slot only and unrelated resolutions
/// never contend. Implementation types are constructed at most once, even
/// when mapped under several names or capabilities.
pub struct ExtensionLoader {
    table: ExtensionTable,
    classes: DashMap<TypeId, Arc<OnceLock<Arc<ClassTable>>>>,
    instances: DashMap<(TypeId, String), Arc<OnceLock<AnyInstance>>>,
    type_instances: DashMap<String, Arc<OnceLock<AnyInstance>>>,
}

impl ExtensionLoader {
    /// Create a loader over a populated table
    pub fn new(table: ExtensionTable) -> Self {
        Self {
            table,
            classes: DashMap::new(),
            instances: DashMap::new(),
            type_instances: DashMap::new(),
        }
    }

    /// Resolve the implementation of `C` registered under `name`
    pub fn resolve<C: Capability + ?Sized>(&self, name: &str) -> Result<Arc<C>> {
        self.check_extensible::<C>()?;

        let name = name.trim();
        if name.is_empty() {
            return Err(RpcError::InvalidArgument(
                "Extension name should not be null or empty".to_string(),
            ));
        }

        let slot = self
            .instances
            .entry((TypeId::of::<C>(), name.to_string()))
            .or_default()
            .clone();
        if let Some(stored) = slot.get() {
            return Self::downcast::<C>(stored);
        }

        let classes = self.extension_classes::<C>();
        let type_name = match classes.get(name) {
            Some(type_name) => type_name,
            None if classes.is_empty() => {
                return Err(RpcError::Configuration(format!(
                    "No valid implementation declared for {}",
                    C::TYPE_NAME
                )));
            }
            None => {
                return Err(RpcError::ExtensionNotFound {
                    capability: C::TYPE_NAME.to_string(),
                    name: name.to_string(),
                });
            }
        };

        let binding = self.table.binding::<C>(type_name).ok_or_else(|| {
            RpcError::Configuration(format!("{} is not bound to {}", type_name, C::TYPE_NAME))
        })?;
        let raw = self.type_instance(type_name)?;
        let instance = (binding.upcast)(raw).ok_or_else(|| {
            RpcError::Configuration(format!(
                "Instance of {} cannot be used as {}",
                type_name,
                C::TYPE_NAME
            ))
        })?;

        let stored = slot.get_or_init(|| Arc::new(instance) as AnyInstance);
        Self::downcast::<C>(stored)
    }

    /// Names with a loadable implementation for `C`, sorted
    pub fn extension_names<C: Capability + ?Sized>(&self) -> Result<Vec<String>> {
        self.check_extensible::<C>()?;
        let mut names: Vec<String> = self.extension_classes::<C>().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn check_extensible<C: Capability + ?Sized>(&self) -> Result<()> {
        // A thin reference means C is a sized type rather than a trait object
        if std::mem::size_of::<&C>() == std::mem::size_of::<&()>() {
            return Err(RpcError::Configuration(format!(
                "Extension type must be an interface: {}",
                C::TYPE_NAME
            )));
        }
        if !self.table.is_declared(TypeId::of::<C>()) {
            return Err(RpcError::Configuration(format!(
                "Extension type must be declared extensible: {}",
                C::TYPE_NAME
            )));
        }
        Ok(())
    }

    fn downcast<C: Capability + ?Sized>(stored: &AnyInstance) -> Result<Arc<C>> {
        (**stored)
            .downcast_ref::<Arc<C>>()
            .cloned()
            .ok_or_else(|| {
                RpcError::Configuration(format!("Cached instance is not a {}", C::TYPE_NAME))
            })
    }

    fn extension_classes<C: Capability + ?Sized>(&self) -> Arc<ClassTable> {
        let slot = self
            .classes
            .entry(TypeId::of::<C>())
            .or_default()
            .clone();
        slot.get_or_init(|| Arc::new(self.load_classes::<C>()))
            .clone()
    }

    fn load_classes<C: Capability + ?Sized>(&self) -> ClassTable {
        let location = location_for(C::TYPE_NAME);
        let mut classes = ClassTable::new();

        for resource in self.table.resources().find(&location) {
            for (name, type_name) in parse_mappings(&resource) {
                if self.table.binding::<C>(&type_name).is_none() {
                    warn!(
                        "Cannot load extension type {} for {} declared in {}",
                        type_name,
                        C::TYPE_NAME,
                        resource.origin
                    );
                    continue;
                }
                if let Some(previous) = classes.insert(name.clone(), type_name.clone()) {
                    debug!(
                        "Extension {} of {} remapped from {} to {}",
                        name,
                        C::TYPE_NAME,
                        previous,
                        type_name
                    );
                }
            }
        }

        if classes.is_empty() {
            warn!("No extensions found for {} at {}", C::TYPE_NAME, location);
        } else {
            debug!("Loaded {} extensions for {}", classes.len(), C::TYPE_NAME);
        }
        classes
    }

    fn type_instance(&self, type_name: &str) -> Result<AnyInstance> {
        let constructor = self.table.constructor(type_name).ok_or_else(|| {
            RpcError::Configuration(format!("No factory registered for {}", type_name))
        })?;
        let slot = self
            .type_instances
            .entry(type_name.to_string())
            .or_default()
            .clone();

        Ok(slot
            .get_or_init(|| {
                debug!("Creating extension instance of {}", type_name);
                constructor()
            })
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    impl Capability for dyn Greeter {
        const TYPE_NAME: &'static str = "rpc.test.Greeter";
    }

    trait Undeclared: Send + Sync {}

    impl Capability for dyn Undeclared {
        const TYPE_NAME: &'static str = "rpc.test.Undeclared";
    }

    struct NotAnInterface;

    impl Capability for NotAnInterface {
        const TYPE_NAME: &'static str = "rpc.test.NotAnInterface";
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct Slow;

    impl Greeter for Slow {
        fn greet(&self) -> String {
            "...".to_string()
        }
    }

    fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
        Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
    }

    fn loader(mappings: &'static str) -> ExtensionLoader {
        let mut table = ExtensionTable::new();
        table
            .declare::<dyn Greeter>()
            .register::<English, dyn Greeter>("test.English", || English, |g| g)
            .embed::<dyn Greeter>(mappings);
        ExtensionLoader::new(table)
    }

    #[test]
    fn test_reused_type_name_keeps_first_registration() {
        let mut table = ExtensionTable::new();
        table
            .declare::<dyn Greeter>()
            .register::<English, dyn Greeter>("test.English", || English, |g| g)
            .register::<Slow, dyn Greeter>("test.English", || Slow, |g| g)
            .embed::<dyn Greeter>("english=test.English\n");
        let loader = ExtensionLoader::new(table);

        let greeter = loader.resolve::<dyn Greeter>("english").unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn test_resolve_returns_singleton() {
        let loader = loader("english=test.English\n");
        let a = loader.resolve::<dyn Greeter>("english").unwrap();
        let b = loader.resolve::<dyn Greeter>("english").unwrap();
        assert_eq!(a.greet(), "hello");
        assert!(same(&a, &b));
    }

    #[test]
    fn test_same_type_under_two_names_shares_instance() {
        let loader = loader("english=test.English\nen=test.English\n");
        let a = loader.resolve::<dyn Greeter>("english").unwrap();
        let b = loader.resolve::<dyn Greeter>("en").unwrap();
        assert!(same(&a, &b));
        assert_eq!(
            loader.extension_names::<dyn Greeter>().unwrap(),
            vec!["en".to_string(), "english".to_string()]
        );
    }

    #[test]
    fn test_unknown_name_is_extension_not_found() {
        let loader = loader("english=test.English\n");
        match loader.resolve::<dyn Greeter>("french") {
            Err(RpcError::ExtensionNotFound { capability, name }) => {
                assert_eq!(capability, "rpc.test.Greeter");
                assert_eq!(name, "french");
            }
            other => panic!("expected ExtensionNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_blank_name_is_invalid_argument() {
        let loader = loader("english=test.English\n");
        assert!(matches!(
            loader.resolve::<dyn Greeter>("  "),
            Err(RpcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_undeclared_and_sized_capabilities_are_rejected() {
        let loader = loader("english=test.English\n");
        assert!(matches!(
            loader.resolve::<dyn Undeclared>("any"),
            Err(RpcError::Configuration(_))
        ));
        assert!(matches!(
            loader.resolve::<NotAnInterface>("any"),
            Err(RpcError::Configuration(_))
        ));
    }

    #[test]
    fn test_unloadable_types_are_skipped() {
        let loader = loader("ghost=test.Missing\nenglish=test.English\n");
        assert!(loader.resolve::<dyn Greeter>("english").is_ok());
        assert!(matches!(
            loader.resolve::<dyn Greeter>("ghost"),
            Err(RpcError::ExtensionNotFound { .. })
        ));
    }

    #[test]
    fn test_no_valid_implementation_is_configuration_error() {
        let loader = loader("ghost=test.Missing\n# nothing else\n");
        assert!(matches!(
            loader.resolve::<dyn Greeter>("ghost"),
            Err(RpcError::Configuration(_))
        ));
    }

    #[test]
    fn test_directory_resource_overrides_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(location_for("rpc.test.Greeter"));
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "greeter=test.Slow\n").unwrap();

        let mut table = ExtensionTable::new();
        table
            .declare::<dyn Greeter>()
            .register::<English, dyn Greeter>("test.English", || English, |g| g)
            .register::<Slow, dyn Greeter>("test.Slow", || Slow, |g| g)
            .embed::<dyn Greeter>("greeter=test.English\n")
            .add_search_directory(dir.path());
        let loader = ExtensionLoader::new(table);

        assert_eq!(loader.resolve::<dyn Greeter>("greeter").unwrap().greet(), "...");
    }

    #[test]
    fn test_concurrent_first_resolution_constructs_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();

        let mut table = ExtensionTable::new();
        table
            .declare::<dyn Greeter>()
            .register::<Slow, dyn Greeter>(
                "test.Slow",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    Slow
                },
                |g| g,
            )
            .embed::<dyn Greeter>("slow=test.Slow\n");
        let loader = ExtensionLoader::new(table);

        let instances: Vec<Arc<dyn Greeter>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| loader.resolve::<dyn Greeter>("slow").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|i| same(i, &instances[0])));
    }
}
