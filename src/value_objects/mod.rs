//! Validated, immutable descriptors used throughout the cache engine.

pub mod key;
pub mod pattern;
pub mod priority;
pub mod size;
pub mod ttl;

pub use key::Key;
pub use pattern::{InvalidationPattern, PatternKind};
pub use priority::Priority;
pub use size::SizeBytes;
pub use ttl::Ttl;
