//! Application configuration.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::version::RemoteSource;

const CONFIG_DIR: &str = "cheatdb";
const CONFIG_FILE: &str = "config.toml";

const DEFAULT_CONFIG: &str = r#"# cheatdb configuration.
#
# Values here override the built-in defaults; CHEATDB_* environment
# variables (CHEATDB_REPO_SOURCE__API_URL and friends) override both.

version_url = "https://github.com/HamletDuFromage/switch-cheats-db/releases/latest/download/VERSION"
work_root = "work"
out_root = "out"
normalizer_command = "process-cheats"

[archive_source]
name = "vampitech"
archive_url = "https://vampitech.net/switch/cheats/titles.rar"
titles_subdir = "gbatemp/titles"

[repo_source]
name = "highfps"
archive_url = "https://github.com/ChanseyIsTheBest/NX-60FPS-RES-GFX-Cheats/archive/refs/heads/main.zip"
api_url = "https://api.github.com/repos/ChanseyIsTheBest/NX-60FPS-RES-GFX-Cheats/branches/main"
token_env = "GITHUB_TOKEN"
titles_subdir = "NX-60FPS-RES-GFX-Cheats-main/titles"
"#;

/// Remote endpoints and local roots for a build run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Endpoint serving the authoritative release token.
    pub version_url: String,
    /// Scratch area for downloads and extraction.
    pub work_root: PathBuf,
    /// Root receiving the published artifacts.
    pub out_root: PathBuf,
    /// Program invoked as the external cheat normalizer.
    pub normalizer_command: String,
    /// Source advertising freshness through `Last-Modified`.
    pub archive_source: ArchiveSourceConfig,
    /// Source advertising freshness through a branch metadata API.
    pub repo_source: RepoSourceConfig,
}

/// Configuration of a source probed via its archive's `Last-Modified`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSourceConfig {
    /// Short name used for directories and artifact paths.
    pub name: String,
    /// Archive download URL, also the `Last-Modified` probe target.
    pub archive_url: String,
    /// Per-title directory inside the extracted archive.
    pub titles_subdir: PathBuf,
}

/// Configuration of a source probed via a repository branch API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSourceConfig {
    /// Short name used for directories and artifact paths.
    pub name: String,
    /// Download URL for the branch archive.
    pub archive_url: String,
    /// Branch metadata endpoint consulted for the latest commit timestamp.
    pub api_url: String,
    /// Environment variable holding an optional bearer token.
    pub token_env: String,
    /// Per-title directory inside the extracted archive.
    pub titles_subdir: PathBuf,
}

impl AppConfig {
    /// Load configuration from defaults, the user config file, and
    /// `CHEATDB_*` environment overrides, in increasing precedence.
    pub fn load() -> Result<Self> {
        let config = builder_with_defaults()?
            .add_source(File::from(config_path()).required(false))
            .add_source(Environment::with_prefix("CHEATDB").separator("__"))
            .build()
            .context("failed to load configuration")?;
        config
            .try_deserialize()
            .context("failed to parse configuration")
    }

    /// The remote sources in fixed processing order.
    pub fn sources(&self) -> Vec<RemoteSource> {
        vec![
            RemoteSource::Archive {
                name: self.archive_source.name.clone(),
                archive_url: self.archive_source.archive_url.clone(),
                titles_subdir: self.archive_source.titles_subdir.clone(),
            },
            RemoteSource::Repo {
                name: self.repo_source.name.clone(),
                archive_url: self.repo_source.archive_url.clone(),
                api_url: self.repo_source.api_url.clone(),
                token_env: self.repo_source.token_env.clone(),
                titles_subdir: self.repo_source.titles_subdir.clone(),
            },
        ]
    }
}

/// Write a starter config file if none exists yet.
pub fn ensure_default_config() -> Result<()> {
    let path = config_path();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, DEFAULT_CONFIG).with_context(|| format!("failed to write {}", path.display()))
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>> {
    let mut builder = Config::builder();
    for (key, value) in [
        (
            "version_url",
            "https://github.com/HamletDuFromage/switch-cheats-db/releases/latest/download/VERSION",
        ),
        ("work_root", "work"),
        ("out_root", "out"),
        ("normalizer_command", "process-cheats"),
        ("archive_source.name", "vampitech"),
        (
            "archive_source.archive_url",
            "https://vampitech.net/switch/cheats/titles.rar",
        ),
        ("archive_source.titles_subdir", "gbatemp/titles"),
        ("repo_source.name", "highfps"),
        (
            "repo_source.archive_url",
            "https://github.com/ChanseyIsTheBest/NX-60FPS-RES-GFX-Cheats/archive/refs/heads/main.zip",
        ),
        (
            "repo_source.api_url",
            "https://api.github.com/repos/ChanseyIsTheBest/NX-60FPS-RES-GFX-Cheats/branches/main",
        ),
        ("repo_source.token_env", "GITHUB_TOKEN"),
        (
            "repo_source.titles_subdir",
            "NX-60FPS-RES-GFX-Cheats-main/titles",
        ),
    ] {
        builder = builder
            .set_default(key, value)
            .context("invalid configuration default")?;
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_a_complete_config() -> Result<()> {
        let config: AppConfig = builder_with_defaults()?.build()?.try_deserialize()?;

        assert_eq!(config.repo_source.token_env, "GITHUB_TOKEN");
        assert!(config.version_url.ends_with("VERSION"));
        assert!(config.archive_source.titles_subdir.ends_with("titles"));
        assert_eq!(config.sources().len(), 2);
        Ok(())
    }

    #[test]
    fn sources_keep_processing_order() -> Result<()> {
        let config: AppConfig = builder_with_defaults()?.build()?.try_deserialize()?;
        let sources = config.sources();

        assert_eq!(sources[0].name(), "vampitech");
        assert_eq!(sources[1].name(), "highfps");
        Ok(())
    }
}
