//! Sequencing of a full database rebuild.

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::info;

use crate::{
    config::AppConfig,
    merge::{self, CheatTotals},
    package,
    transport::{self, ArchiveTransport},
    version::{DatabaseVersion, RemoteSource, VersionOracle},
};

use super::normalize::Normalizer;

/// Result of a pipeline invocation.
#[derive(Debug)]
pub enum BuildOutcome {
    /// Every source is at or behind the recorded baseline.
    UpToDate,
    /// A full rebuild ran to completion.
    Built(BuildReport),
}

/// Summary of a completed rebuild.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Version recorded in the new marker.
    pub version: DatabaseVersion,
    /// Totals across the merged cheat documents.
    pub totals: CheatTotals,
}

/// Drives a rebuild end to end: version comparison, transport, the external
/// normalizer, the merge step, and packaging, strictly in that order.
///
/// Any failure aborts the run before the version marker is written, so the
/// previous marker stays authoritative and the run can simply be repeated.
pub struct BuildPipeline {
    config: AppConfig,
    client: Client,
    today: DatabaseVersion,
}

impl BuildPipeline {
    /// Create a pipeline for the given configuration and injected date.
    pub fn new(config: AppConfig, today: DatabaseVersion) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to construct the HTTP client")?;
        Ok(Self {
            config,
            client,
            today,
        })
    }

    /// Compare versions and, when any source is newer, run the full build.
    pub fn run(&self, normalizer: &dyn Normalizer) -> Result<BuildOutcome> {
        let oracle = VersionOracle::new(self.client.clone(), self.config.version_url.clone());
        let baseline = oracle
            .current()
            .context("failed to resolve the published database version")?;
        info!("published database version: {baseline}");

        let sources = self.config.sources();
        if !self.any_source_newer(&sources, baseline)? {
            info!("cheat database is already up to date");
            return Ok(BuildOutcome::UpToDate);
        }

        let report = self.rebuild(&sources, normalizer)?;
        Ok(BuildOutcome::Built(report))
    }

    fn any_source_newer(
        &self,
        sources: &[RemoteSource],
        baseline: DatabaseVersion,
    ) -> Result<bool> {
        let mut stale = false;
        for source in sources {
            let latest = source
                .latest_version(&self.client, self.today)
                .with_context(|| {
                    format!("failed to resolve the latest version for {}", source.name())
                })?;
            info!("source {} advertises {latest}", source.name());
            stale |= latest.is_newer_than(baseline);
        }
        Ok(stale)
    }

    fn rebuild(&self, sources: &[RemoteSource], normalizer: &dyn Normalizer) -> Result<BuildReport> {
        let stamp = SystemTime::now();
        fs::create_dir_all(&self.config.work_root).with_context(|| {
            format!("failed to create {}", self.config.work_root.display())
        })?;
        fs::create_dir_all(&self.config.out_root)
            .with_context(|| format!("failed to create {}", self.config.out_root.display()))?;

        // Scratch is removed when this guard drops, on success and on every
        // error path out of this function.
        let scratch = tempfile::Builder::new()
            .prefix("cheatdb-")
            .tempdir_in(&self.config.work_root)
            .context("failed to create the scratch directory")?;

        let transport = ArchiveTransport::new(self.client.clone());
        let merged_json = scratch.path().join("cheats");
        fs::create_dir_all(&merged_json)
            .with_context(|| format!("failed to create {}", merged_json.display()))?;

        let mut source_trees: Vec<(String, PathBuf)> = Vec::new();
        for source in sources {
            let raw_titles = self.fetch_source(&transport, source, scratch.path())?;
            let package_base = raw_titles
                .parent()
                .map(Path::to_path_buf)
                .with_context(|| format!("no parent directory for {}", raw_titles.display()))?;

            let own_json = scratch.path().join(format!("cheats_{}", source.name()));
            fs::create_dir_all(&own_json)
                .with_context(|| format!("failed to create {}", own_json.display()))?;

            info!("normalizing {} content", source.name());
            normalizer
                .normalize(&raw_titles, &own_json)
                .with_context(|| format!("normalizer failed for {}", source.name()))?;
            normalizer
                .normalize(&raw_titles, &merged_json)
                .with_context(|| format!("normalizer failed for {}", source.name()))?;

            source_trees.push((source.name().to_string(), package_base));
        }

        info!("building the canonical title tree");
        merge::build_cheat_files(&merged_json, &self.config.out_root)
            .context("failed to build the canonical title tree")?;

        info!("packaging archives");
        package::publish_archives(&self.config.out_root, stamp)
            .context("failed to package the merged tree")?;
        for (name, base) in &source_trees {
            package::publish_archives(base, stamp)
                .with_context(|| format!("failed to package the {name} tree"))?;
            self.collect_source_artifacts(name, base)?;
        }

        package::write_version_marker(&self.config.out_root, self.today)
            .context("failed to write the version marker")?;

        let totals =
            merge::count_cheats(&merged_json).context("failed to count the merged cheats")?;
        info!(
            "{} cheats in {} titles/{} updates",
            totals.entries, totals.titles, totals.builds
        );

        Ok(BuildReport {
            version: self.today,
            totals,
        })
    }

    fn fetch_source(
        &self,
        transport: &ArchiveTransport,
        source: &RemoteSource,
        scratch: &Path,
    ) -> Result<PathBuf> {
        let archive_path = scratch.join(format!("{}.archive", source.name()));
        info!(
            "downloading {} from {}",
            source.name(),
            source.archive_url()
        );
        transport
            .download(source.archive_url(), &archive_path)
            .with_context(|| format!("failed to download {}", source.name()))?;

        let extract_root = scratch.join(source.name());
        let recognized = transport::extract_archive(&archive_path, &extract_root)
            .with_context(|| format!("failed to extract the {} archive", source.name()))?;
        if !recognized {
            anyhow::bail!(
                "{} served a payload that is not a supported archive",
                source.name()
            );
        }
        Ok(extract_root.join(source.titles_subdir()))
    }

    fn collect_source_artifacts(&self, name: &str, base: &Path) -> Result<()> {
        let dest_dir = self.config.out_root.join(name);
        fs::create_dir_all(&dest_dir)
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;
        for artifact in [
            format!("{}.zip", package::TITLES_DIR),
            format!("{}.zip", package::CONTENTS_DIR),
        ] {
            let from = base.join(&artifact);
            let to = dest_dir.join(&artifact);
            fs::copy(&from, &to)
                .with_context(|| format!("failed to publish {}", to.display()))?;
        }
        Ok(())
    }
}
