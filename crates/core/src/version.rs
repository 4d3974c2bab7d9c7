//! Version discovery for the database and its remote sources.

use std::{
    env, fmt,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

static RELEASE_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8}$").expect("invalid release token regex"));

/// Calendar date identifying a published state of the cheat database.
///
/// All sources resolve to this one ordered type, so versions from the
/// release endpoint, `Last-Modified` headers, and commit timestamps compare
/// directly against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseVersion(NaiveDate);

impl DatabaseVersion {
    /// Wrap an explicit date, mainly for injecting a fixed "today" in tests.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parse the 8-digit `MMDDYYYY` token served by the release endpoint.
    pub fn from_release_token(token: &str) -> Result<Self> {
        let token = token.trim();
        if !RELEASE_TOKEN_RE.is_match(token) {
            return Err(Error::VersionToken {
                token: token.to_string(),
            });
        }
        NaiveDate::parse_from_str(token, "%m%d%Y")
            .map(Self)
            .map_err(|_| Error::VersionToken {
                token: token.to_string(),
            })
    }

    /// The current local date, used both as the timestamp fallback and for
    /// the emitted version marker.
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    /// The underlying calendar date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Strictly newer than the baseline; an equal date is not an update.
    pub fn is_newer_than(&self, baseline: Self) -> bool {
        self.0 > baseline.0
    }
}

impl fmt::Display for DatabaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Resolves the currently published database version.
pub struct VersionOracle {
    client: Client,
    version_url: String,
}

impl VersionOracle {
    /// Create an oracle reading from the given release endpoint.
    pub fn new(client: Client, version_url: impl Into<String>) -> Self {
        Self {
            client,
            version_url: version_url.into(),
        }
    }

    /// Fetch and parse the authoritative release token.
    pub fn current(&self) -> Result<DatabaseVersion> {
        let response = self
            .client
            .get(&self.version_url)
            .send()
            .map_err(|source| Error::Network {
                url: self.version_url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: self.version_url.clone(),
                status,
            });
        }
        let body = response.text().map_err(|source| Error::Network {
            url: self.version_url.clone(),
            source,
        })?;
        DatabaseVersion::from_release_token(&body)
    }
}

/// A remote provider of cheat content, with its own freshness signal.
#[derive(Debug, Clone)]
pub enum RemoteSource {
    /// Version advertised through the archive's `Last-Modified` header.
    Archive {
        /// Short name used for directories and artifact paths.
        name: String,
        /// Download URL, also the `Last-Modified` probe target.
        archive_url: String,
        /// Per-title directory inside the extracted archive.
        titles_subdir: PathBuf,
    },
    /// Version taken from a repository branch's latest commit timestamp.
    Repo {
        /// Short name used for directories and artifact paths.
        name: String,
        /// Download URL for the branch archive.
        archive_url: String,
        /// Branch metadata endpoint.
        api_url: String,
        /// Environment variable holding an optional bearer token.
        token_env: String,
        /// Per-title directory inside the extracted archive.
        titles_subdir: PathBuf,
    },
}

impl RemoteSource {
    /// Short name of the source.
    pub fn name(&self) -> &str {
        match self {
            RemoteSource::Archive { name, .. } | RemoteSource::Repo { name, .. } => name,
        }
    }

    /// URL the source's archive is downloaded from.
    pub fn archive_url(&self) -> &str {
        match self {
            RemoteSource::Archive { archive_url, .. } | RemoteSource::Repo { archive_url, .. } => {
                archive_url
            }
        }
    }

    /// Where the per-title content sits inside the extracted archive.
    pub fn titles_subdir(&self) -> &Path {
        match self {
            RemoteSource::Archive { titles_subdir, .. }
            | RemoteSource::Repo { titles_subdir, .. } => titles_subdir,
        }
    }

    /// Latest content version advertised by this source.
    ///
    /// A source that exposes no timestamp resolves to `today`, which always
    /// compares as new against any recorded baseline. The build leans toward
    /// rebuilding when a source goes quiet.
    pub fn latest_version(
        &self,
        client: &Client,
        today: DatabaseVersion,
    ) -> Result<DatabaseVersion> {
        match self {
            RemoteSource::Archive { archive_url, .. } => {
                let response =
                    client
                        .head(archive_url)
                        .send()
                        .map_err(|source| Error::Network {
                            url: archive_url.clone(),
                            source,
                        })?;
                let header = response
                    .headers()
                    .get(LAST_MODIFIED)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                match header {
                    Some(value) => version_from_last_modified(&value, archive_url),
                    None => Ok(today),
                }
            }
            RemoteSource::Repo {
                api_url, token_env, ..
            } => {
                let mut request = client.get(api_url);
                if let Ok(token) = env::var(token_env) {
                    request = request.header(AUTHORIZATION, format!("token {token}"));
                }
                let payload: Value = request
                    .send()
                    .map_err(|source| Error::Network {
                        url: api_url.clone(),
                        source,
                    })?
                    .json()
                    .map_err(|source| Error::Network {
                        url: api_url.clone(),
                        source,
                    })?;
                Ok(version_from_commit_payload(&payload, api_url)?.unwrap_or(today))
            }
        }
    }
}

/// Version carried by an RFC-1123 `Last-Modified` header.
fn version_from_last_modified(value: &str, origin: &str) -> Result<DatabaseVersion> {
    DateTime::parse_from_rfc2822(value)
        .map(|stamp| DatabaseVersion(stamp.date_naive()))
        .map_err(|_| Error::Timestamp {
            origin: origin.to_string(),
            value: value.to_string(),
        })
}

/// Commit timestamp buried in a branch metadata payload, if any.
fn version_from_commit_payload(payload: &Value, origin: &str) -> Result<Option<DatabaseVersion>> {
    match payload
        .pointer("/commit/commit/author/date")
        .and_then(Value::as_str)
    {
        Some(stamp) => DateTime::parse_from_rfc3339(stamp)
            .map(|stamp| Some(DatabaseVersion(stamp.date_naive())))
            .map_err(|_| Error::Timestamp {
                origin: origin.to_string(),
                value: stamp.to_string(),
            }),
        None => Ok(None),
    }
}
