//! # sitepress
//!
//! A template-driven static site builder. The source tree is the site:
//! every `*.html` file is a template rendered to the same relative path in
//! the output tree, and every other file is copied verbatim.
//!
//! # Architecture: Clean, Walk, Finalize
//!
//! ```text
//! 1. Clean      build/ is deleted and recreated
//! 2. Walk       src/        →  build/         (render *.html, copy the rest)
//! 3. Finalize   build/      →  build/         (manifest, attributions, sitemap)
//! ```
//!
//! A separate long-running command, `sync`, watches the output tree and
//! copies in-place edits of static files back to their source:
//!
//! ```text
//! build/css/site.css  (edited in place)  ──▶  src/css/site.css
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `sitepress.toml` loading, merging over stock defaults, validation |
//! | [`attribution`] | Third-party credits listed on the generated attributions page |
//! | [`context`] | Layered per-page template context and the cache-busting version |
//! | [`render`] | minijinja environment over two template roots, HTML minification |
//! | [`walk`] | Source tree traversal: classify, render, copy with preserved mtime |
//! | [`finalize`] | Post-walk steps: web manifest patch, attributions page, sitemap |
//! | [`pipeline`] | Orchestrates clean → walk → finalize and emits progress events |
//! | [`sync`] | Debounced output → source file sync on top of `notify` |
//! | [`output`] | CLI output formatting and progress spinners |
//!
//! # Design Decisions
//!
//! ## Templates Are Files
//!
//! Pages and layouts are plain minijinja templates on disk. A content page
//! extends a layout from the template directory by name; the template
//! directory is searched first, so it can shadow a content file.
//!
//! ## Output Is Disposable
//!
//! Every build starts from an empty output directory. There is no
//! incremental mode, so a build never mixes fresh and stale files.
//!
//! ## Sync Never Creates Files
//!
//! The watcher only overwrites existing source files. New files, renames
//! and anything the build generates must be handled in the source tree and
//! rebuilt.

pub mod attribution;
pub mod config;
pub mod context;
pub mod finalize;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod sync;
pub mod walk;
