//! Build orchestration and the external normalization boundary.

/// Version comparison and full-rebuild sequencing.
pub mod build;
/// The opaque normalization capability and its subprocess implementation.
pub mod normalize;

pub use build::{BuildOutcome, BuildPipeline, BuildReport};
pub use normalize::{CommandNormalizer, Normalizer};
