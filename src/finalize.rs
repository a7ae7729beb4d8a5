//! Post-walk site finalizers.
//!
//! Once the output tree is fully populated, three independent steps run in
//! a fixed order:
//!
//! 1. **Manifest**: patch `name`/`short_name` in
//!    `images/favicon/site.webmanifest`, if the build produced one.
//! 2. **Attributions**: render `attributions.html` from the configured
//!    attribution entries, grouped by category.
//! 3. **Sitemap**: render `sitemap.xml` listing every HTML file in the
//!    output tree, `attributions.html` included.
//!
//! A failing step does not stop the others. Each step's result is collected
//! into a [`StepOutcome`] for the caller to report.

use crate::attribution::{AttributionEntry, group_by_category, slash_path};
use crate::context::ContextDefaults;
use crate::render::{OutputKind, PageRenderer, RenderError};
use crate::walk::is_page;
use chrono::{DateTime, Utc};
use minijinja::Value;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Web manifest location, relative to the output root.
pub const MANIFEST_PATH: &str = "images/favicon/site.webmanifest";
pub const ATTRIBUTIONS_PAGE: &str = "attributions.html";
pub const SITEMAP_FILE: &str = "sitemap.xml";

#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Web manifest is not a JSON object: {0}")]
    InvalidManifest(PathBuf),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Failed to scan output tree: {0}")]
    Walk(#[from] walkdir::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FinalizeError + '_ {
    move |source| FinalizeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalizer {
    Manifest,
    Attributions,
    Sitemap,
}

impl fmt::Display for Finalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Finalizer::Manifest => "Manifest",
            Finalizer::Attributions => "Attributions",
            Finalizer::Sitemap => "Sitemap",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// `items` counts manifest fields, attribution entries or sitemap URLs.
    Written { path: PathBuf, items: usize },
    Skipped { reason: String },
}

#[derive(Debug)]
pub struct StepOutcome {
    pub step: Finalizer,
    pub result: Result<StepStatus, FinalizeError>,
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// One `<url>` of the sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: String,
}

pub struct Finalizers<'a> {
    pub source_root: &'a Path,
    pub output_root: &'a Path,
    pub renderer: &'a PageRenderer,
    pub context: &'a ContextDefaults,
    pub site_name: &'a str,
    pub site_name_short: &'a str,
    pub attributions: &'a [AttributionEntry],
}

impl Finalizers<'_> {
    /// Run every step in order, invoking `on_step` as each one finishes.
    pub fn run(&self, on_step: &mut dyn FnMut(&StepOutcome)) -> Vec<StepOutcome> {
        let steps = [
            Finalizer::Manifest,
            Finalizer::Attributions,
            Finalizer::Sitemap,
        ];
        steps
            .into_iter()
            .map(|step| {
                let result = match step {
                    Finalizer::Manifest => patch_manifest(
                        &self.output_root.join(MANIFEST_PATH),
                        self.site_name,
                        self.site_name_short,
                    ),
                    Finalizer::Attributions => self.build_attributions(),
                    Finalizer::Sitemap => self.build_sitemap(),
                };
                let outcome = StepOutcome { step, result };
                on_step(&outcome);
                outcome
            })
            .collect()
    }

    /// Render `attributions.html`. With no entries configured the page is
    /// still written, with an empty `attributions` map.
    pub fn build_attributions(&self) -> Result<StepStatus, FinalizeError> {
        let mut grouped = Vec::new();
        for (category, entries) in group_by_category(self.attributions) {
            let records = entries
                .into_iter()
                .map(|e| e.load(self.source_root).map_err(io_error(&e.source_file)))
                .collect::<Result<Vec<_>, _>>()?;
            grouped.push((category.to_string(), Value::from_serialize(&records)));
        }

        let mut context = self.context.for_page(ATTRIBUTIONS_PAGE);
        context.insert("attributions", Value::from_iter(grouped));

        let html = self
            .renderer
            .render_page(ATTRIBUTIONS_PAGE, context, OutputKind::Html)?;
        let path = self.output_root.join(ATTRIBUTIONS_PAGE);
        fs::write(&path, html).map_err(io_error(&path))?;

        Ok(StepStatus::Written {
            path,
            items: self.attributions.len(),
        })
    }

    pub fn build_sitemap(&self) -> Result<StepStatus, FinalizeError> {
        let entries = collect_sitemap_entries(self.output_root, &self.context.root_url)?;

        let mut context = self.context.for_page(SITEMAP_FILE);
        context.insert("entries", Value::from_serialize(&entries));

        let xml = self
            .renderer
            .render_page(SITEMAP_FILE, context, OutputKind::Xml)?;
        let path = self.output_root.join(SITEMAP_FILE);
        fs::write(&path, xml).map_err(io_error(&path))?;

        Ok(StepStatus::Written {
            path,
            items: entries.len(),
        })
    }
}

/// Overwrite `name` and `short_name` in the manifest at `path`.
///
/// Every other field keeps its value and position. A missing manifest is
/// reported as skipped, not as an error.
pub fn patch_manifest(path: &Path, name: &str, short_name: &str) -> Result<StepStatus, FinalizeError> {
    if !path.is_file() {
        return Ok(StepStatus::Skipped {
            reason: format!("no {} in output", MANIFEST_PATH),
        });
    }

    let content = fs::read_to_string(path).map_err(io_error(path))?;
    let mut manifest: serde_json::Value =
        serde_json::from_str(&content).map_err(|source| FinalizeError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let fields = manifest
        .as_object_mut()
        .ok_or_else(|| FinalizeError::InvalidManifest(path.to_path_buf()))?;
    fields.insert("name".to_string(), name.into());
    fields.insert("short_name".to_string(), short_name.into());

    let json = serde_json::to_string_pretty(&manifest).map_err(|source| FinalizeError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(io_error(path))?;

    Ok(StepStatus::Written {
        path: path.to_path_buf(),
        items: 2,
    })
}

/// List every HTML file under `output_root` in file-name order.
///
/// `loc` is `root_url + "/" + relative path`; `lastmod` is the file's
/// modification date in UTC.
pub fn collect_sitemap_entries(
    output_root: &Path,
    root_url: &str,
) -> Result<Vec<SitemapEntry>, FinalizeError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(output_root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_page(entry.path()) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(output_root)
            .unwrap_or(entry.path());
        let modified = entry
            .metadata()?
            .modified()
            .map_err(io_error(entry.path()))?;

        entries.push(SitemapEntry {
            loc: format!("{}/{}", root_url, slash_path(rel)),
            lastmod: DateTime::<Utc>::from(modified).format("%Y-%m-%d").to_string(),
        });
    }
    Ok(entries)
}
