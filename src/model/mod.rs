//! Data records with invariants and lifecycle: entries and namespaces.

pub mod entry;
pub mod namespace;

pub use entry::Entry;
pub use namespace::{EvictionPolicy, Namespace, NamespacePolicy};
