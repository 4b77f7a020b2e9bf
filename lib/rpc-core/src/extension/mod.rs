//! Capability registry
//!
//! Capabilities are trait objects with several swappable implementations.
//! Implementation types are registered in an [`ExtensionTable`] with a
//! factory; which name maps to which type is read from
//! `META-INF/extensions/<capability>` resources on the search path, in
//! `name=implementation` form. The [`ExtensionLoader`] resolves a name to a
//! process-wide shared instance, creating it on first use.

pub mod loader;
pub mod resource;
pub mod table;

pub use loader::ExtensionLoader;
pub use resource::{location_for, parse_mappings, Resource, ResourceSearchPath, EXTENSION_DIRECTORY};
pub use table::{Capability, ExtensionTable};
