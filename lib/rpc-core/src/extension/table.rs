//! Registration table of capabilities and implementation factories

use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::resource::{location_for, ResourceSearchPath};

/// A pluggable interface resolved by name.
///
/// Implemented for trait objects, e.g. `impl Capability for dyn LoadBalance`.
/// `TYPE_NAME` is the fully-qualified name used to locate mapping resources.
pub trait Capability: Send + Sync + 'static {
    const TYPE_NAME: &'static str;
}

pub(crate) type AnyInstance = Arc<dyn Any + Send + Sync>;
pub(crate) type Constructor = Arc<dyn Fn() -> AnyInstance + Send + Sync>;

/// Casts a type-erased implementation instance to a capability
pub(crate) struct Binding<C: ?Sized> {
    pub(crate) upcast: Arc<dyn Fn(AnyInstance) -> Option<Arc<C>> + Send + Sync>,
}

/// ExtensionTable maps implementation type names to factories.
///
/// A capability must be declared before it can be resolved; declaring it is
/// what marks it extensible.
#[derive(Default)]
pub struct ExtensionTable {
    declared: HashSet<TypeId>,
    constructors: HashMap<String, (TypeId, Constructor)>,
    bindings: HashMap<(TypeId, String), Box<dyn Any + Send + Sync>>,
    resources: ResourceSearchPath,
}

impl ExtensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a capability as extensible
    pub fn declare<C: Capability + ?Sized>(&mut self) -> &mut Self {
        self.declared.insert(TypeId::of::<C>());
        self
    }

    /// Register an implementation type under `type_name` for capability `C`.
    ///
    /// The same type name may be registered for several capabilities; it is
    /// still constructed only once per loader. A type name already taken by a
    /// different Rust type is rejected with a warning and the first
    /// registration stays in effect.
    pub fn register<T, C>(
        &mut self,
        type_name: &str,
        construct: impl Fn() -> T + Send + Sync + 'static,
        upcast: fn(Arc<T>) -> Arc<C>,
    ) -> &mut Self
    where
        T: Send + Sync + 'static,
        C: Capability + ?Sized,
    {
        match self.constructors.entry(type_name.to_string()) {
            Entry::Occupied(existing) if existing.get().0 != TypeId::of::<T>() => {
                warn!(
                    "Extension type name {} is already registered for another type, ignoring {} for {}",
                    type_name,
                    std::any::type_name::<T>(),
                    C::TYPE_NAME
                );
                return self;
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                let constructor: Constructor =
                    Arc::new(move || Arc::new(construct()) as AnyInstance);
                slot.insert((TypeId::of::<T>(), constructor));
            }
        }

        let binding = Binding::<C> {
            upcast: Arc::new(move |raw: AnyInstance| raw.downcast::<T>().ok().map(upcast)),
        };
        self.bindings
            .insert((TypeId::of::<C>(), type_name.to_string()), Box::new(binding));

        debug!("Registered extension type {} for {}", type_name, C::TYPE_NAME);
        self
    }

    /// Add a mapping resource for `C` compiled into the binary
    pub fn embed<C: Capability + ?Sized>(&mut self, contents: &str) -> &mut Self {
        self.resources.add_embedded(
            location_for(C::TYPE_NAME),
            format!("builtin:{}", C::TYPE_NAME),
            contents,
        );
        self
    }

    /// Add a directory to the resource search path
    pub fn add_search_directory(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.resources.add_directory(dir);
        self
    }

    pub fn resources(&self) -> &ResourceSearchPath {
        &self.resources
    }

    pub(crate) fn is_declared(&self, capability: TypeId) -> bool {
        self.declared.contains(&capability)
    }

    pub(crate) fn constructor(&self, type_name: &str) -> Option<Constructor> {
        self.constructors
            .get(type_name)
            .map(|(_, constructor)| Arc::clone(constructor))
    }

    pub(crate) fn binding<C: Capability + ?Sized>(&self, type_name: &str) -> Option<&Binding<C>> {
        self.bindings
            .get(&(TypeId::of::<C>(), type_name.to_string()))
            .and_then(|b| b.downcast_ref::<Binding<C>>())
    }
}
