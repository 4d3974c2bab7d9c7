//! Archive download and extraction.

use std::{
    fs::{self, File},
    io::Read,
    path::Path,
};

use reqwest::blocking::Client;
use unrar::Archive as RarArchive;
use zip::ZipArchive;

use crate::error::{Error, Result};

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const RAR_MAGIC: [u8; 6] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07];

/// Container formats the pipeline can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// PKZIP container.
    Zip,
    /// RAR container, v4 or v5.
    Rar,
}

impl ArchiveKind {
    /// Detect a container format from leading magic bytes.
    ///
    /// Probes are tried in order and the first match wins. Returns `None`
    /// when no known signature matches or the input is too short.
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&ZIP_MAGIC) {
            return Some(ArchiveKind::Zip);
        }
        if bytes.starts_with(&RAR_MAGIC) {
            return Some(ArchiveKind::Rar);
        }
        None
    }

    fn sniff(path: &Path) -> Result<Option<Self>> {
        let mut file = File::open(path).map_err(Error::io("open", path))?;
        let mut head = [0u8; 8];
        let read = file.read(&mut head).map_err(Error::io("read", path))?;
        Ok(Self::from_magic_bytes(&head[..read]))
    }
}

/// Downloads remote archives over blocking HTTP.
pub struct ArchiveTransport {
    client: Client,
}

impl ArchiveTransport {
    /// Create a transport on top of an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Stream `url` into `dest`, overwriting any previous download.
    ///
    /// The body is written as served, with no integrity checking; a
    /// mislabelled non-archive payload only surfaces when extraction
    /// refuses it.
    pub fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|source| Error::Network {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status,
            });
        }
        let mut file = File::create(dest).map_err(Error::io("create", dest))?;
        response
            .copy_to(&mut file)
            .map_err(|source| Error::Network {
                url: url.to_string(),
                source,
            })?;
        Ok(())
    }
}

/// Fully extract `path` into `dest` when it is a recognized container.
///
/// `Ok(false)` means "not an archive we support" and leaves `dest`
/// untouched; failures while unpacking a recognized container are errors.
pub fn extract_archive(path: &Path, dest: &Path) -> Result<bool> {
    let kind = match ArchiveKind::sniff(path)? {
        Some(kind) => kind,
        None => return Ok(false),
    };
    fs::create_dir_all(dest).map_err(Error::io("create", dest))?;
    match kind {
        ArchiveKind::Zip => extract_zip(path, dest)?,
        ArchiveKind::Rar => extract_rar(path, dest)?,
    }
    Ok(true)
}

fn extract_zip(path: &Path, dest: &Path) -> Result<()> {
    let archive_err = |detail: String| Error::Archive {
        path: path.to_path_buf(),
        detail,
    };
    let file = File::open(path).map_err(Error::io("open", path))?;
    let mut archive = ZipArchive::new(file).map_err(|err| archive_err(err.to_string()))?;
    archive
        .extract(dest)
        .map_err(|err| archive_err(err.to_string()))
}

fn extract_rar(path: &Path, dest: &Path) -> Result<()> {
    let archive_err = |err: unrar::error::UnrarError| Error::Archive {
        path: path.to_path_buf(),
        detail: err.to_string(),
    };
    let mut archive = RarArchive::new(path)
        .open_for_processing()
        .map_err(archive_err)?;
    while let Some(header) = archive.read_header().map_err(archive_err)? {
        archive = if header.entry().is_file() {
            header.extract_with_base(dest).map_err(archive_err)?
        } else {
            header.skip().map_err(archive_err)?
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[test]
    fn detects_container_formats() {
        assert_eq!(
            ArchiveKind::from_magic_bytes(&[0x50, 0x4B, 0x03, 0x04, 0x14, 0x00]),
            Some(ArchiveKind::Zip)
        );
        assert_eq!(
            ArchiveKind::from_magic_bytes(b"Rar!\x1A\x07\x00"),
            Some(ArchiveKind::Rar)
        );
        assert_eq!(
            ArchiveKind::from_magic_bytes(b"Rar!\x1A\x07\x01\x00"),
            Some(ArchiveKind::Rar)
        );
        assert_eq!(ArchiveKind::from_magic_bytes(b"<!DOCTYPE html>"), None);
        assert_eq!(ArchiveKind::from_magic_bytes(b"PK"), None);
        assert_eq!(ArchiveKind::from_magic_bytes(&[]), None);
    }

    #[test]
    fn unrecognized_input_is_not_extracted() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let payload = dir.path().join("payload.bin");
        fs::write(&payload, "<html>definitely not an archive</html>")?;

        let dest = dir.path().join("extracted");
        assert!(!extract_archive(&payload, &dest)?);
        assert!(!dest.exists(), "destination must be left untouched");
        Ok(())
    }

    #[test]
    fn extracts_zip_containers() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("titles.zip");

        let file = File::create(&archive_path)?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        writer.add_directory("titles", options)?;
        writer.start_file("titles/0100000000000000.json", options)?;
        writer.write_all(b"{\"attribution\":{}}")?;
        writer.finish()?;

        let dest = dir.path().join("extracted");
        assert!(extract_archive(&archive_path, &dest)?);
        let extracted = fs::read_to_string(dest.join("titles/0100000000000000.json"))?;
        assert_eq!(extracted, "{\"attribution\":{}}");
        Ok(())
    }
}
