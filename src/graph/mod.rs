//! The build graph: derivation keys, the content-addressed dependency
//! store, variant records, the build-runner seam, and the platform matrix.

pub mod key;
pub mod matrix;
pub mod runner;
pub mod store;
pub mod variant;

pub use key::{DepInputs, DerivationKey};
pub use matrix::{run_matrix, target_platforms, BuiltArtifact, PlatformGraph, PlatformReport, VariantReport};
pub use runner::{BuildRunner, DriverRunner};
pub use store::{ArtifactSet, CacheEntry, CacheStore, EntryStatus};
pub use variant::Variant;
