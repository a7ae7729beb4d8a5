//! Source tree traversal and per-entry dispatch.
//!
//! Every entry below the source root is mirrored into the output root:
//!
//! ```text
//! output path = output_root + (entry path relative to source_root)
//! ```
//!
//! The sync watcher relies on this relation holding for every entry to find
//! a changed output file's source pair.
//!
//! ## Dispatch
//!
//! Entries are classified in precedence order:
//!
//! | Entry | Action |
//! |-------|--------|
//! | name in blacklist | skipped, directories are not descended |
//! | directory | mirrored directory created, then descended |
//! | `*.html` (any case) | rendered as a template, minified, written |
//! | other regular file | copied byte for byte, mtime preserved |
//! | anything else | reported as unsupported and skipped |
//!
//! Traversal is iterative ([walkdir](https://docs.rs/walkdir)) and visits
//! siblings in file-name order, so deep trees never exhaust the call stack
//! and every run visits entries in the same order.

use crate::attribution::slash_path;
use crate::context::ContextDefaults;
use crate::render::{OutputKind, PageRenderer, RenderError};
use std::ffi::OsStr;
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Extension of files rendered as templates (compared case-insensitively).
pub const PAGE_EXTENSION: &str = "html";

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Failed to read source tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Failed to render {path}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: RenderError,
    },
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Path is not inside the source root: {0}")]
    OutsideSource(PathBuf),
}

/// Filesystem type of an entry, as far as dispatch cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Dir,
    File,
    Other,
}

impl From<fs::FileType> for EntryType {
    fn from(ft: fs::FileType) -> Self {
        if ft.is_dir() {
            EntryType::Dir
        } else if ft.is_file() {
            EntryType::File
        } else {
            EntryType::Other
        }
    }
}

/// What the walker does with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blacklisted,
    Directory,
    Page,
    Asset,
    Unsupported,
}

/// Progress notification for one visited entry. Paths are slash-separated
/// and relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    Rendered { path: String },
    Copied { path: String },
    Blacklisted { path: String },
    Unsupported { path: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub directories: usize,
    pub rendered: usize,
    pub copied: usize,
    pub blacklisted: usize,
    pub unsupported: usize,
}

/// Classify an entry by name and type. Blacklisting wins over everything.
pub fn classify(name: &OsStr, entry_type: EntryType, blacklist: &[String]) -> EntryKind {
    if blacklist.iter().any(|b| OsStr::new(b) == name) {
        return EntryKind::Blacklisted;
    }
    match entry_type {
        EntryType::Dir => EntryKind::Directory,
        EntryType::File if is_page(Path::new(name)) => EntryKind::Page,
        EntryType::File => EntryKind::Asset,
        EntryType::Other => EntryKind::Unsupported,
    }
}

/// True for files carrying the page extension, in any letter case.
pub fn is_page(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(PAGE_EXTENSION))
        .unwrap_or(false)
}

/// Walks a source tree, rendering pages and copying everything else.
pub struct TreeWalker<'a> {
    pub source_root: &'a Path,
    pub output_root: &'a Path,
    pub blacklist: &'a [String],
    pub renderer: &'a PageRenderer,
    pub context: &'a ContextDefaults,
}

impl TreeWalker<'_> {
    /// Mirror of `path` under the output root.
    pub fn mirror(&self, path: &Path) -> Result<PathBuf, WalkError> {
        path.strip_prefix(self.source_root)
            .map(|rel| self.output_root.join(rel))
            .map_err(|_| WalkError::OutsideSource(path.to_path_buf()))
    }

    /// Visit every entry below `root` (normally the source root).
    ///
    /// Stops at the first render or copy failure. Unsupported entries are
    /// reported through `on_event` and skipped.
    pub fn process_tree(
        &self,
        root: &Path,
        on_event: &mut dyn FnMut(WalkEvent),
    ) -> Result<WalkSummary, WalkError> {
        let mut summary = WalkSummary::default();
        let mut entries = WalkDir::new(root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        while let Some(next) = entries.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(err) => match unsupported_reason(&err) {
                    Some((path, reason)) => {
                        summary.unsupported += 1;
                        on_event(WalkEvent::Unsupported {
                            path: self.display_path(&path),
                            reason,
                        });
                        continue;
                    }
                    None => return Err(WalkError::Walk(err)),
                },
            };

            let path = entry.path();
            let entry_type = EntryType::from(entry.file_type());

            // The output tree may live inside the source tree.
            if path.starts_with(self.output_root) {
                if entry_type == EntryType::Dir {
                    entries.skip_current_dir();
                }
                continue;
            }

            match classify(entry.file_name(), entry_type, self.blacklist) {
                EntryKind::Blacklisted => {
                    if entry_type == EntryType::Dir {
                        entries.skip_current_dir();
                    }
                    summary.blacklisted += 1;
                    on_event(WalkEvent::Blacklisted {
                        path: self.display_path(path),
                    });
                }
                EntryKind::Directory => {
                    let target = self.mirror(path)?;
                    fs::create_dir_all(&target).map_err(|source| WalkError::Io {
                        path: target.clone(),
                        source,
                    })?;
                    summary.directories += 1;
                }
                EntryKind::Page => {
                    self.render_entry(path)?;
                    summary.rendered += 1;
                    on_event(WalkEvent::Rendered {
                        path: self.display_path(path),
                    });
                }
                EntryKind::Asset => {
                    let target = self.mirror(path)?;
                    copy_preserving(path, &target).map_err(|source| WalkError::Io {
                        path: target.clone(),
                        source,
                    })?;
                    summary.copied += 1;
                    on_event(WalkEvent::Copied {
                        path: self.display_path(path),
                    });
                }
                EntryKind::Unsupported => {
                    summary.unsupported += 1;
                    on_event(WalkEvent::Unsupported {
                        path: self.display_path(path),
                        reason: "not a regular file or directory".to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }

    fn render_entry(&self, path: &Path) -> Result<(), WalkError> {
        let rel = path
            .strip_prefix(self.source_root)
            .map_err(|_| WalkError::OutsideSource(path.to_path_buf()))?;
        let page_path = slash_path(rel);
        let context = self.context.for_page(&page_path);

        let html = self
            .renderer
            .render_page(&page_path, context, OutputKind::Html)
            .map_err(|source| WalkError::Render {
                path: path.to_path_buf(),
                source,
            })?;

        write_file(&self.mirror(path)?, html.as_bytes())
    }

    fn display_path(&self, path: &Path) -> String {
        match path.strip_prefix(self.source_root) {
            Ok(rel) => slash_path(rel),
            Err(_) => path.display().to_string(),
        }
    }
}

/// Recognize walk errors that only concern one odd entry (broken or looping
/// symlinks) rather than the traversal as a whole.
fn unsupported_reason(err: &walkdir::Error) -> Option<(PathBuf, String)> {
    let path = err.path()?.to_path_buf();
    if err.loop_ancestor().is_some() {
        return Some((path, "symbolic link loop".to_string()));
    }
    let is_symlink = fs::symlink_metadata(&path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    let not_found = err
        .io_error()
        .map(|e| e.kind() == io::ErrorKind::NotFound)
        .unwrap_or(false);
    if is_symlink && not_found {
        return Some((path, "broken symbolic link".to_string()));
    }
    None
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<(), WalkError> {
    let io_err = |source: io::Error| WalkError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}

/// Copy `src` onto `dst`, creating parents and carrying over modification
/// and access times.
pub fn copy_preserving(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::metadata(src)?;
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;

    let mut times = FileTimes::new().set_modified(meta.modified()?);
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    // fs::copy carries permissions over, so a read-only source gives a
    // read-only copy that cannot be opened for writing.
    let file = match File::options().write(true).open(dst) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => File::open(dst)?,
        Err(e) => return Err(e),
    };
    file.set_times(times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn blacklist() -> Vec<String> {
        vec![".DS_Store".to_string(), "drafts".to_string()]
    }

    #[test]
    fn classify_blacklist_wins_over_type() {
        let bl = blacklist();
        assert_eq!(classify(OsStr::new("drafts"), EntryType::Dir, &bl), EntryKind::Blacklisted);
        assert_eq!(
            classify(OsStr::new(".DS_Store"), EntryType::File, &bl),
            EntryKind::Blacklisted
        );
    }

    #[test]
    fn classify_blacklist_is_exact_name() {
        let bl = blacklist();
        assert_eq!(classify(OsStr::new("drafts2"), EntryType::Dir, &bl), EntryKind::Directory);
        assert_eq!(classify(OsStr::new("Drafts"), EntryType::Dir, &bl), EntryKind::Directory);
    }

    #[test]
    fn classify_pages_case_insensitive() {
        let bl = blacklist();
        assert_eq!(classify(OsStr::new("index.html"), EntryType::File, &bl), EntryKind::Page);
        assert_eq!(classify(OsStr::new("INDEX.HTML"), EntryType::File, &bl), EntryKind::Page);
        assert_eq!(classify(OsStr::new("index.htm"), EntryType::File, &bl), EntryKind::Asset);
    }

    #[test]
    fn classify_directory_named_like_page() {
        assert_eq!(
            classify(OsStr::new("archive.html"), EntryType::Dir, &[]),
            EntryKind::Directory
        );
    }

    #[test]
    fn classify_other_is_unsupported() {
        assert_eq!(classify(OsStr::new("sock"), EntryType::Other, &[]), EntryKind::Unsupported);
    }

    #[test]
    fn copy_preserving_keeps_bytes_and_mtime() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.bin");
        let dst = tmp.path().join("out/nested/a.bin");
        fs::write(&src, [0u8, 1, 2, 255]).unwrap();

        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(old)
            .unwrap();

        copy_preserving(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), vec![0u8, 1, 2, 255]);
        assert_eq!(fs::metadata(&dst).unwrap().modified().unwrap(), old);
    }

    #[test]
    fn write_file_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a/b/c.html");
        write_file(&target, b"<p>x</p>").unwrap();
        assert_eq!(fs::read_to_string(target).unwrap(), "<p>x</p>");
    }

    struct Tree {
        _tmp: TempDir,
        src: PathBuf,
        out: PathBuf,
        renderer: PageRenderer,
        context: ContextDefaults,
    }

    fn tree(out_rel: &str) -> Tree {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let out = tmp.path().join(out_rel);
        let templates = tmp.path().join("templates");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&templates).unwrap();
        let renderer = PageRenderer::new(&templates, &src);
        Tree {
            _tmp: tmp,
            src,
            out,
            renderer,
            context: ContextDefaults::default(),
        }
    }

    fn walk(t: &Tree, blacklist: &[String]) -> (WalkSummary, Vec<WalkEvent>) {
        let walker = TreeWalker {
            source_root: &t.src,
            output_root: &t.out,
            blacklist,
            renderer: &t.renderer,
            context: &t.context,
        };
        let mut events = Vec::new();
        let summary = walker
            .process_tree(&t.src, &mut |e| events.push(e))
            .unwrap();
        (summary, events)
    }

    #[test]
    fn mirror_reroots_at_output_and_rejects_strays() {
        let t = tree("build");
        let walker = TreeWalker {
            source_root: &t.src,
            output_root: &t.out,
            blacklist: &[],
            renderer: &t.renderer,
            context: &t.context,
        };
        assert_eq!(
            walker.mirror(&t.src.join("blog/post.html")).unwrap(),
            t.out.join("blog/post.html")
        );
        assert!(matches!(
            walker.mirror(&t.out.join("index.html")),
            Err(WalkError::OutsideSource(_))
        ));
    }

    #[test]
    fn process_tree_renders_copies_and_mirrors_empty_dirs() {
        let t = tree("build");
        fs::create_dir_all(t.src.join("empty")).unwrap();
        fs::write(t.src.join("index.html"), "<p>{{ pagePath }}</p>").unwrap();
        fs::write(t.src.join("robots.txt"), "User-agent: *").unwrap();

        let (summary, events) = walk(&t, &[]);
        assert_eq!(summary.rendered, 1);
        assert_eq!(summary.copied, 1);
        assert!(t.out.join("empty").is_dir());
        assert_eq!(fs::read_to_string(t.out.join("index.html")).unwrap(), "<p>index.html</p>");
        assert_eq!(
            events,
            vec![
                WalkEvent::Rendered { path: "index.html".into() },
                WalkEvent::Copied { path: "robots.txt".into() },
            ]
        );
    }

    #[test]
    fn process_tree_skips_output_nested_in_source() {
        let t = tree("src/_site");
        fs::create_dir_all(t.out.join("old")).unwrap();
        fs::write(t.out.join("old/stale.txt"), "x").unwrap();
        fs::write(t.src.join("a.txt"), "a").unwrap();

        let (summary, _) = walk(&t, &[]);
        assert_eq!(summary.copied, 1);
        assert!(!t.out.join("_site").exists());
    }

    #[test]
    fn process_tree_stops_on_render_failure() {
        let t = tree("build");
        fs::write(t.src.join("bad.html"), "{% extends \"missing.html\" %}").unwrap();
        let walker = TreeWalker {
            source_root: &t.src,
            output_root: &t.out,
            blacklist: &[],
            renderer: &t.renderer,
            context: &t.context,
        };
        let err = walker.process_tree(&t.src, &mut |_| {}).unwrap_err();
        assert!(matches!(err, WalkError::Render { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn broken_symlink_is_reported_and_skipped() {
        let t = tree("build");
        std::os::unix::fs::symlink(t.src.join("nowhere"), t.src.join("dangling")).unwrap();
        fs::write(t.src.join("z.txt"), "z").unwrap();

        let (summary, events) = walk(&t, &[]);
        assert_eq!(summary.unsupported, 1);
        assert_eq!(summary.copied, 1);
        assert!(matches!(
            &events[0],
            WalkEvent::Unsupported { path, .. } if path == "dangling"
        ));
        assert!(!t.out.join("dangling").exists());
    }
}
