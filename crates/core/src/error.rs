//! Error types for `cheatdb-core`.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures surfaced by the build pipeline.
///
/// "Not a supported archive" is deliberately not an error; the extractor
/// reports it as a plain `false` so callers can tell it apart from a broken
/// container.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote host could not be reached or the transfer broke off.
    #[error("request to {url} failed")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The remote answered with a non-success status.
    #[error("{url} answered with HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Status code of the response.
        status: reqwest::StatusCode,
    },

    /// The release endpoint served something other than an 8-digit date.
    #[error("invalid database version token {token:?}")]
    VersionToken {
        /// The offending token, trimmed.
        token: String,
    },

    /// A remote timestamp was present but could not be parsed.
    #[error("unreadable timestamp {value:?} from {origin}")]
    Timestamp {
        /// Where the timestamp came from.
        origin: String,
        /// The raw timestamp text.
        value: String,
    },

    /// A recognized container failed to extract, or an archive failed to build.
    #[error("archive operation on {} failed: {detail}", .path.display())]
    Archive {
        /// The container or archive being processed.
        path: PathBuf,
        /// Backend error description.
        detail: String,
    },

    /// A cheat document did not match the expected shape.
    #[error("malformed cheat document {}: {detail}", .path.display())]
    Document {
        /// The offending document.
        path: PathBuf,
        /// What was wrong with it.
        detail: String,
    },

    /// A filesystem operation failed while building or packaging the tree.
    #[error("failed to {action} {}", .path.display())]
    Io {
        /// Short verb describing the attempted operation.
        action: &'static str,
        /// The path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Error::Io {
            action,
            path,
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
