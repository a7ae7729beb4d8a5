//! Third-party attribution records.
//!
//! Each entry points at a text file (a license, a credit notice) that is
//! inlined into the generated `attributions.html`. Entries are grouped by
//! category for display, in the order categories are first seen.

use crate::config::ConfigError;
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Conventional directory, inside the source tree, holding attribution texts.
pub const ATTRIBUTIONS_DIR: &str = "attributions";

/// One attribution, with its source file already resolved and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionEntry {
    pub category: String,
    pub title: String,
    pub link: String,
    pub source_file: PathBuf,
}

/// Template-facing form of an entry, with the file content loaded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionRecord {
    pub category: String,
    pub title: String,
    pub link: String,
    /// Slash-separated path relative to the source root.
    pub source_file: String,
    pub content: String,
}

impl AttributionEntry {
    /// Resolve `file` and check it exists.
    ///
    /// - absolute paths are used as-is
    /// - a bare name (`inter.txt`) is looked up in `<source>/attributions/`
    /// - any other relative path is resolved against the source root
    pub fn new(
        category: &str,
        title: &str,
        link: &str,
        file: &Path,
        source_root: &Path,
    ) -> Result<Self, ConfigError> {
        let source_file = resolve_source_file(file, source_root);
        if !source_file.is_file() {
            return Err(ConfigError::MissingAttributionFile {
                title: title.to_string(),
                path: source_file,
            });
        }
        Ok(Self {
            category: category.to_string(),
            title: title.to_string(),
            link: link.to_string(),
            source_file,
        })
    }

    /// Read the source file and produce the record handed to templates.
    pub fn load(&self, source_root: &Path) -> std::io::Result<AttributionRecord> {
        let content = fs::read_to_string(&self.source_file)?;
        let source_file = match self.source_file.strip_prefix(source_root) {
            Ok(rel) => slash_path(rel),
            Err(_) => self.source_file.to_string_lossy().into_owned(),
        };
        Ok(AttributionRecord {
            category: self.category.clone(),
            title: self.title.clone(),
            link: self.link.clone(),
            source_file,
            content,
        })
    }
}

fn resolve_source_file(file: &Path, source_root: &Path) -> PathBuf {
    if file.is_absolute() {
        return file.to_path_buf();
    }
    let is_bare = matches!(
        file.components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    );
    if is_bare {
        source_root.join(ATTRIBUTIONS_DIR).join(file)
    } else {
        source_root.join(file)
    }
}

/// Join path components with `/`, whatever the platform separator.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Group entries by category.
///
/// Categories appear in first-seen order; entries keep their relative order
/// inside each category.
pub fn group_by_category(entries: &[AttributionEntry]) -> Vec<(&str, Vec<&AttributionEntry>)> {
    let mut groups: Vec<(&str, Vec<&AttributionEntry>)> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|(cat, _)| *cat == entry.category) {
            Some((_, members)) => members.push(entry),
            None => groups.push((entry.category.as_str(), vec![entry])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(category: &str, title: &str) -> AttributionEntry {
        AttributionEntry {
            category: category.to_string(),
            title: title.to_string(),
            link: format!("https://example.com/{title}"),
            source_file: PathBuf::from(format!("{title}.txt")),
        }
    }

    #[test]
    fn grouping_preserves_category_and_entry_order() {
        let entries = vec![entry("A", "one"), entry("B", "two"), entry("A", "three")];
        let groups = group_by_category(&entries);

        let categories: Vec<&str> = groups.iter().map(|(c, _)| *c).collect();
        assert_eq!(categories, vec!["A", "B"]);

        let a_titles: Vec<&str> = groups[0].1.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(a_titles, vec!["one", "three"]);
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn grouping_empty() {
        assert!(group_by_category(&[]).is_empty());
    }

    #[test]
    fn bare_name_resolves_into_attributions_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(ATTRIBUTIONS_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("inter.txt"), "OFL").unwrap();

        let e = AttributionEntry::new(
            "Fonts",
            "Inter",
            "https://rsms.me/inter/",
            Path::new("inter.txt"),
            tmp.path(),
        )
        .unwrap();
        assert_eq!(e.source_file, dir.join("inter.txt"));
    }

    #[test]
    fn nested_relative_path_resolves_against_source_root() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("legal")).unwrap();
        fs::write(tmp.path().join("legal/mit.txt"), "MIT").unwrap();

        let e = AttributionEntry::new(
            "Code",
            "lib",
            "https://example.com",
            Path::new("legal/mit.txt"),
            tmp.path(),
        )
        .unwrap();
        assert_eq!(e.source_file, tmp.path().join("legal/mit.txt"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let result = AttributionEntry::new(
            "Fonts",
            "Ghost",
            "https://example.com",
            Path::new("ghost.txt"),
            tmp.path(),
        );
        match result {
            Err(ConfigError::MissingAttributionFile { title, path }) => {
                assert_eq!(title, "Ghost");
                assert!(path.ends_with("attributions/ghost.txt"));
            }
            other => panic!("expected MissingAttributionFile, got {other:?}"),
        }
    }

    #[test]
    fn load_reads_content_and_relativizes_path() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(ATTRIBUTIONS_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("inter.txt"), "SIL Open Font License").unwrap();

        let e = AttributionEntry::new(
            "Fonts",
            "Inter",
            "https://rsms.me/inter/",
            Path::new("inter.txt"),
            tmp.path(),
        )
        .unwrap();
        let record = e.load(tmp.path()).unwrap();
        assert_eq!(record.source_file, "attributions/inter.txt");
        assert_eq!(record.content, "SIL Open Font License");
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = AttributionRecord {
            category: "Fonts".to_string(),
            title: "Inter".to_string(),
            link: "https://rsms.me/inter/".to_string(),
            source_file: "attributions/inter.txt".to_string(),
            content: "OFL".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sourceFile"], "attributions/inter.txt");
    }
}
