#![warn(clippy::all, missing_docs)]

//! Core build pipeline for the cheat database.
//!
//! This crate hosts version discovery across the release endpoint and the
//! remote sources, archive transport, the merge step that consolidates
//! per-title cheat documents into the canonical tree, packaging, and the
//! orchestrator sequencing a full rebuild.

pub mod config;
pub mod error;
pub mod merge;
pub mod package;
pub mod pipeline;
pub mod transport;
pub mod version;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use merge::CheatTotals;
pub use pipeline::{BuildOutcome, BuildPipeline, BuildReport, CommandNormalizer, Normalizer};
pub use transport::{ArchiveKind, ArchiveTransport};
pub use version::{DatabaseVersion, RemoteSource, VersionOracle};
