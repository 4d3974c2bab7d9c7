//! Packaging of finished trees into reproducible archives.

use std::{
    fs::{self, File, FileTimes, OpenOptions},
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Datelike, Timelike, Utc};
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::{
    error::{Error, Result},
    version::DatabaseVersion,
};

/// Folder name the merged tree is built under.
pub const TITLES_DIR: &str = "titles";
/// Alias the same files are republished as.
pub const CONTENTS_DIR: &str = "contents";
/// Name of the version marker file.
pub const VERSION_FILE: &str = "VERSION";

/// Set every regular file's modification time under `root` to `stamp`.
///
/// Archive entries embed per-file timestamps, so repeated runs over
/// identical content only produce identical archives after this pass.
pub fn normalize_timestamps(root: &Path, stamp: SystemTime) -> Result<()> {
    let times = FileTimes::new().set_modified(stamp);
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(walk_err(root))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file = OpenOptions::new()
            .write(true)
            .open(entry.path())
            .map_err(Error::io("open", entry.path()))?;
        file.set_times(times)
            .map_err(Error::io("touch", entry.path()))?;
    }
    Ok(())
}

/// Normalize timestamps beneath `base/folder`, then archive the folder as
/// `base/folder.zip` with the folder itself as the sole top-level entry.
///
/// Entries are written in sorted path order and stamped with the build
/// time, so the archive bytes depend only on the content and the stamp.
pub fn package_folder(base: &Path, folder: &str, stamp: SystemTime) -> Result<PathBuf> {
    let tree = base.join(folder);
    normalize_timestamps(&tree, stamp)?;

    let zip_path = base.join(format!("{folder}.zip"));
    let file = File::create(&zip_path).map_err(Error::io("create", &zip_path))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip_datetime(stamp));
    let archive_err = |err: zip::result::ZipError| Error::Archive {
        path: zip_path.clone(),
        detail: err.to_string(),
    };

    for entry in WalkDir::new(&tree).sort_by_file_name() {
        let entry = entry.map_err(walk_err(&tree))?;
        let name = archive_entry_name(base, entry.path())?;
        if entry.file_type().is_dir() {
            writer.add_directory(name, options).map_err(archive_err)?;
        } else {
            writer.start_file(name, options).map_err(archive_err)?;
            let mut source = File::open(entry.path()).map_err(Error::io("open", entry.path()))?;
            io::copy(&mut source, &mut writer).map_err(Error::io("archive", entry.path()))?;
        }
    }
    writer.finish().map_err(archive_err)?;
    Ok(zip_path)
}

/// Package the `titles` tree, republish it under the `contents` alias, and
/// archive that view as well.
///
/// Consumers expect the same files under both top-level names. The renamed
/// `contents` directory and both archives are left in `base`; a `contents`
/// directory lingering from an earlier run is replaced.
pub fn publish_archives(base: &Path, stamp: SystemTime) -> Result<()> {
    package_folder(base, TITLES_DIR, stamp)?;

    let titles = base.join(TITLES_DIR);
    let contents = base.join(CONTENTS_DIR);
    if contents.exists() {
        fs::remove_dir_all(&contents).map_err(Error::io("remove", &contents))?;
    }
    fs::rename(&titles, &contents).map_err(Error::io("rename", &titles))?;

    package_folder(base, CONTENTS_DIR, stamp)?;
    Ok(())
}

/// Overwrite the version marker in `out_dir` with the given date.
pub fn write_version_marker(out_dir: &Path, today: DatabaseVersion) -> Result<PathBuf> {
    let path = out_dir.join(VERSION_FILE);
    fs::write(&path, today.to_string()).map_err(Error::io("write", &path))?;
    Ok(path)
}

fn zip_datetime(stamp: SystemTime) -> zip::DateTime {
    let stamp: DateTime<Utc> = stamp.into();
    // A clock outside the zip datetime range (1980..=2107) falls back to
    // the format's epoch rather than failing the build.
    zip::DateTime::from_date_and_time(
        stamp.year() as u16,
        stamp.month() as u8,
        stamp.day() as u8,
        stamp.hour() as u8,
        stamp.minute() as u8,
        stamp.second() as u8,
    )
    .unwrap_or_default()
}

fn archive_entry_name(base: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).map_err(|_| Error::Archive {
        path: path.to_path_buf(),
        detail: "entry escapes the archive root".to_string(),
    })?;
    Ok(relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/"))
}

fn walk_err(root: &Path) -> impl FnOnce(walkdir::Error) -> Error {
    let root = root.to_path_buf();
    move |err| Error::Io {
        action: "walk",
        path: root,
        source: err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::NaiveDate;
    use std::time::Duration;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn fixed_stamp() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn sample_tree(base: &Path) -> Result<()> {
        let cheats = base.join("titles/0100ABCD/cheats");
        fs::create_dir_all(&cheats)?;
        fs::write(base.join("titles/0100ABCD/alice"), "A")?;
        fs::write(cheats.join("010.txt"), "c1c2")?;
        Ok(())
    }

    #[test]
    fn normalizes_file_mtimes() -> Result<()> {
        let temp = tempdir()?;
        sample_tree(temp.path())?;
        let stamp = fixed_stamp();

        normalize_timestamps(&temp.path().join("titles"), stamp)?;

        let modified = fs::metadata(temp.path().join("titles/0100ABCD/alice"))?.modified()?;
        assert_eq!(modified, stamp);
        Ok(())
    }

    #[test]
    fn archives_the_folder_as_sole_top_level_entry() -> Result<()> {
        let temp = tempdir()?;
        sample_tree(temp.path())?;

        let zip_path = package_folder(temp.path(), TITLES_DIR, fixed_stamp())?;

        let mut archive = ZipArchive::new(File::open(&zip_path)?)?;
        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            assert!(
                entry.name().starts_with("titles"),
                "unexpected entry {}",
                entry.name()
            );
        }
        Ok(())
    }

    #[test]
    fn packaging_is_reproducible() -> Result<()> {
        let temp = tempdir()?;
        sample_tree(temp.path())?;
        let stamp = fixed_stamp();

        let first = fs::read(package_folder(temp.path(), TITLES_DIR, stamp)?)?;
        let second = fs::read(package_folder(temp.path(), TITLES_DIR, stamp)?)?;
        assert_eq!(first, second, "identical content and stamp, identical bytes");

        // A later stamp changes metadata but never the extracted content.
        let later = stamp + Duration::from_secs(86_400);
        let third_path = package_folder(temp.path(), TITLES_DIR, later)?;
        let mut archive = ZipArchive::new(File::open(&third_path)?)?;
        let extract_dir = temp.path().join("check");
        archive.extract(&extract_dir)?;
        assert_eq!(
            fs::read_to_string(extract_dir.join("titles/0100ABCD/cheats/010.txt"))?,
            "c1c2"
        );
        Ok(())
    }

    #[test]
    fn publishes_both_views() -> Result<()> {
        let temp = tempdir()?;
        sample_tree(temp.path())?;

        publish_archives(temp.path(), fixed_stamp())?;

        assert!(temp.path().join("titles.zip").is_file());
        assert!(temp.path().join("contents.zip").is_file());
        assert!(!temp.path().join("titles").exists());
        assert!(temp.path().join("contents/0100ABCD/alice").is_file());

        // A rerun starts from a freshly merged titles tree and replaces the
        // leftover contents directory.
        sample_tree(temp.path())?;
        publish_archives(temp.path(), fixed_stamp())?;
        assert!(temp.path().join("contents/0100ABCD/alice").is_file());
        Ok(())
    }

    #[test]
    fn writes_the_version_marker() -> Result<()> {
        let temp = tempdir()?;
        let today =
            DatabaseVersion::from_date(NaiveDate::from_ymd_opt(2024, 7, 15).expect("valid date"));

        let path = write_version_marker(temp.path(), today)?;

        assert_eq!(fs::read_to_string(path)?, "2024-07-15");
        Ok(())
    }
}
