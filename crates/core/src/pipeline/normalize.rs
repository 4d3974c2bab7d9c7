//! The external cheat-normalization step, modelled as a capability.

use std::{
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{Context, Result};
use tracing::debug;

/// Opaque transform turning a raw per-title directory into one JSON cheat
/// document per title under the destination directory.
///
/// The pipeline owns no knowledge of how normalization works; whatever the
/// implementation raises is propagated as-is. Tests substitute mocks to
/// exercise the merge and packaging stages in isolation.
pub trait Normalizer {
    /// Populate `dest` with cheat documents derived from `source`.
    fn normalize(&self, source: &Path, dest: &Path) -> Result<()>;
}

/// Runs a configured external program as the normalizer, passing the
/// source and destination directories as its two arguments.
pub struct CommandNormalizer {
    program: String,
}

impl CommandNormalizer {
    /// Wrap the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Normalizer for CommandNormalizer {
    fn normalize(&self, source: &Path, dest: &Path) -> Result<()> {
        debug!(
            "running {} {} {}",
            self.program,
            source.display(),
            dest.display()
        );
        let status = Command::new(&self.program)
            .arg(source)
            .arg(dest)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("failed to execute {}", self.program))?;

        if !status.success() {
            anyhow::bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}
