//! Consolidation of per-title cheat documents into the canonical tree.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};

use crate::error::{Error, Result};

const ATTRIBUTION_KEY: &str = "attribution";

/// Aggregate totals across a directory of cheat documents.
///
/// Reported for logging only, never for control flow. The attribution key
/// counts as a build, matching the statistics the database has always
/// published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheatTotals {
    /// Number of title documents.
    pub titles: usize,
    /// Top-level keys across all documents, attribution included.
    pub builds: usize,
    /// Contributor entries across all keys.
    pub entries: usize,
}

/// Merge every document under `cheats_dir` into `out_dir/titles/...`.
///
/// Each document becomes `titles/<stem>/`: attribution entries turn into
/// one verbatim file per contributor, every other top-level key becomes
/// `cheats/<key>.txt` holding the contributor texts concatenated in
/// document order. A build whose concatenation is empty produces no file,
/// though the `cheats/` folder itself is still created. Existing files are
/// overwritten, so reruns over identical input reproduce the same tree.
pub fn build_cheat_files(cheats_dir: &Path, out_dir: &Path) -> Result<()> {
    let titles_root = out_dir.join("titles");
    fs::create_dir_all(&titles_root).map_err(Error::io("create", &titles_root))?;

    for path in document_paths(cheats_dir)? {
        let title_id = match path.file_stem() {
            Some(stem) => stem.to_string_lossy().to_string(),
            None => continue,
        };
        let title_dir = titles_root.join(&title_id);
        fs::create_dir_all(&title_dir).map_err(Error::io("create", &title_dir))?;
        let document = load_document(&path)?;
        merge_document(&path, &document, &title_dir)?;
    }
    Ok(())
}

fn merge_document(
    doc_path: &Path,
    document: &Map<String, Value>,
    title_dir: &Path,
) -> Result<()> {
    for (key, value) in document {
        let entries = value.as_object().ok_or_else(|| Error::Document {
            path: doc_path.to_path_buf(),
            detail: format!("entry {key:?} is not an object"),
        })?;
        if key == ATTRIBUTION_KEY {
            for (contributor, text) in entries {
                let text = text.as_str().ok_or_else(|| Error::Document {
                    path: doc_path.to_path_buf(),
                    detail: format!("attribution for {contributor:?} is not a string"),
                })?;
                let dest = title_dir.join(contributor);
                fs::write(&dest, text).map_err(Error::io("write", &dest))?;
            }
        } else {
            let cheats_dir = title_dir.join("cheats");
            fs::create_dir_all(&cheats_dir).map_err(Error::io("create", &cheats_dir))?;
            let mut combined = String::new();
            for (contributor, text) in entries {
                combined.push_str(text.as_str().ok_or_else(|| Error::Document {
                    path: doc_path.to_path_buf(),
                    detail: format!("cheat text for {contributor:?} under {key:?} is not a string"),
                })?);
            }
            if !combined.is_empty() {
                let dest = cheats_dir.join(format!("{key}.txt"));
                fs::write(&dest, combined).map_err(Error::io("write", &dest))?;
            }
        }
    }
    Ok(())
}

/// Count titles, build keys, and contributor entries across the documents.
pub fn count_cheats(cheats_dir: &Path) -> Result<CheatTotals> {
    let mut totals = CheatTotals::default();
    for path in document_paths(cheats_dir)? {
        let document = load_document(&path)?;
        for (key, value) in &document {
            let entries = value.as_object().ok_or_else(|| Error::Document {
                path: path.clone(),
                detail: format!("entry {key:?} is not an object"),
            })?;
            totals.builds += 1;
            totals.entries += entries.len();
        }
        totals.titles += 1;
    }
    Ok(totals)
}

fn document_paths(cheats_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(cheats_dir).map_err(Error::io("read", cheats_dir))? {
        let entry = entry.map_err(Error::io("read", cheats_dir))?;
        let file_type = entry.file_type().map_err(Error::io("inspect", &entry.path()))?;
        if !file_type.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}

fn load_document(path: &Path) -> Result<Map<String, Value>> {
    let raw = fs::read_to_string(path).map_err(Error::io("read", path))?;
    serde_json::from_str(&raw).map_err(|err| Error::Document {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn write_doc(dir: &Path, name: &str, body: &str) -> Result<()> {
        fs::write(dir.join(name), body)?;
        Ok(())
    }

    #[test]
    fn splits_attribution_and_builds() -> Result<()> {
        let temp = tempdir()?;
        let cheats = temp.path().join("cheats");
        let out = temp.path().join("out");
        fs::create_dir_all(&cheats)?;
        write_doc(
            &cheats,
            "0100ABCD.json",
            r#"{"attribution":{"alice":"A"},"010":{"x":"c1","y":"c2"}}"#,
        )?;

        build_cheat_files(&cheats, &out)?;

        let title = out.join("titles/0100ABCD");
        assert_eq!(fs::read_to_string(title.join("alice"))?, "A");
        assert_eq!(fs::read_to_string(title.join("cheats/010.txt"))?, "c1c2");
        Ok(())
    }

    #[test]
    fn empty_concatenation_writes_no_build_file() -> Result<()> {
        let temp = tempdir()?;
        let cheats = temp.path().join("cheats");
        let out = temp.path().join("out");
        fs::create_dir_all(&cheats)?;
        write_doc(&cheats, "0200EF01.json", r#"{"020":{"x":""}}"#)?;

        build_cheat_files(&cheats, &out)?;

        let title = out.join("titles/0200EF01");
        assert!(title.join("cheats").is_dir(), "cheats folder still exists");
        assert!(!title.join("cheats/020.txt").exists());
        Ok(())
    }

    #[test]
    fn reruns_are_idempotent_and_restore_deleted_files() -> Result<()> {
        let temp = tempdir()?;
        let cheats = temp.path().join("cheats");
        let out = temp.path().join("out");
        fs::create_dir_all(&cheats)?;
        write_doc(
            &cheats,
            "0300AA00.json",
            r#"{"attribution":{"bob":"credits"},"030":{"x":"body"}}"#,
        )?;

        build_cheat_files(&cheats, &out)?;
        let build_file = out.join("titles/0300AA00/cheats/030.txt");
        let attribution = out.join("titles/0300AA00/bob");
        let first_build = fs::read(&build_file)?;
        let first_attribution = fs::read(&attribution)?;

        build_cheat_files(&cheats, &out)?;
        assert_eq!(fs::read(&build_file)?, first_build);
        assert_eq!(fs::read(&attribution)?, first_attribution);

        fs::remove_file(&build_file)?;
        build_cheat_files(&cheats, &out)?;
        assert_eq!(fs::read(&build_file)?, first_build);
        Ok(())
    }

    #[test]
    fn titles_do_not_leak_into_each_other() -> Result<()> {
        let temp = tempdir()?;
        let cheats = temp.path().join("cheats");
        let out = temp.path().join("out");
        fs::create_dir_all(&cheats)?;
        write_doc(&cheats, "AAAA.json", r#"{"001":{"x":"first"}}"#)?;
        write_doc(&cheats, "BBBB.json", r#"{"002":{"y":"second"}}"#)?;

        build_cheat_files(&cheats, &out)?;

        assert_eq!(
            fs::read_to_string(out.join("titles/AAAA/cheats/001.txt"))?,
            "first"
        );
        assert_eq!(
            fs::read_to_string(out.join("titles/BBBB/cheats/002.txt"))?,
            "second"
        );
        assert!(!out.join("titles/AAAA/cheats/002.txt").exists());
        Ok(())
    }

    #[test]
    fn counts_titles_builds_and_entries() -> Result<()> {
        let temp = tempdir()?;
        let cheats = temp.path().join("cheats");
        fs::create_dir_all(&cheats)?;
        write_doc(
            &cheats,
            "one.json",
            r#"{"attribution":{"alice":"A"},"010":{"x":"c1","y":"c2"},"020":{"z":"c3"}}"#,
        )?;
        write_doc(&cheats, "two.json", r#"{"030":{"x":"c4"}}"#)?;

        let totals = count_cheats(&cheats)?;
        assert_eq!(totals.titles, 2);
        assert_eq!(totals.builds, 4);
        assert_eq!(totals.entries, 5);
        Ok(())
    }

    #[test]
    fn non_object_builds_are_rejected() -> Result<()> {
        let temp = tempdir()?;
        let cheats = temp.path().join("cheats");
        let out = temp.path().join("out");
        fs::create_dir_all(&cheats)?;
        write_doc(&cheats, "bad.json", r#"{"010":"not a mapping"}"#)?;

        let err = build_cheat_files(&cheats, &out).unwrap_err();
        assert!(matches!(err, Error::Document { .. }));
        Ok(())
    }
}
