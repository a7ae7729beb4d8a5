//! Site configuration module.
//!
//! Handles loading, validating, and resolving `sitepress.toml`. User values
//! are merged on top of stock defaults, so a config file only needs the keys
//! it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! [site]
//! name = "My Site"                # Full site name (web manifest `name`)
//! name_short = "Site"             # Short name (web manifest `short_name`)
//! root_url = "https://example.com"
//!
//! [build]
//! source_directory = "src"        # Content tree, mirrored into the output
//! template_directory = "templates"
//! output_directory = "build"
//! blacklist = [".DS_Store", "attributions"]
//!
//! [sync]
//! delay = 1.0                     # Debounce window in seconds
//!
//! [social_media]                  # Lowest-precedence template values
//! github = "https://github.com/example"
//!
//! [overrides]                     # Highest-precedence template values
//! analytics = "UA-1"
//!
//! [[attributions]]
//! category = "Fonts"
//! title = "Inter"
//! link = "https://rsms.me/inter/"
//! file = "inter.txt"              # Bare names live in <source>/attributions/
//! ```
//!
//! Directory paths are relative to the directory containing the config file.
//! Unknown keys are rejected to catch typos early.

use crate::attribution::AttributionEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "sitepress.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Could not serialize stock defaults: {0}")]
    Defaults(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Attribution file for '{title}' does not exist: {path}")]
    MissingAttributionFile { title: String, path: PathBuf },
}

/// Configuration loaded from `sitepress.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Site identity used by the manifest patcher and every rendered page.
    pub site: SiteSection,
    /// Source, template and output locations plus the copy blacklist.
    pub build: BuildSection,
    /// Static file sync settings.
    pub sync: SyncSection,
    /// Social links, exposed to templates under their own keys.
    pub social_media: BTreeMap<String, String>,
    /// Extra template values that shadow everything else.
    pub overrides: BTreeMap<String, serde_json::Value>,
    /// Third-party attributions rendered into `attributions.html`.
    pub attributions: Vec<AttributionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSection {
    pub name: String,
    pub name_short: String,
    pub root_url: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            name: "My Site".to_string(),
            name_short: "Site".to_string(),
            root_url: "https://example.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    pub source_directory: PathBuf,
    pub template_directory: PathBuf,
    pub output_directory: PathBuf,
    /// Exact file or directory names that are never copied or rendered.
    pub blacklist: Vec<String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            source_directory: PathBuf::from("src"),
            template_directory: PathBuf::from("templates"),
            output_directory: PathBuf::from("build"),
            blacklist: vec![".DS_Store".to_string(), "attributions".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    /// Seconds during which repeated notifications for one file are dropped.
    pub delay: f64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self { delay: 1.0 }
    }
}

/// One `[[attributions]]` table, before its file has been resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributionConfig {
    pub category: String,
    pub title: String,
    pub link: String,
    pub file: PathBuf,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.name.trim().is_empty() {
            return Err(ConfigError::Validation("site.name must not be empty".into()));
        }
        if self.site.name_short.trim().is_empty() {
            return Err(ConfigError::Validation(
                "site.name_short must not be empty".into(),
            ));
        }
        let url = &self.site.root_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "site.root_url must start with http:// or https://, got '{url}'"
            )));
        }
        if !self.sync.delay.is_finite() || self.sync.delay <= 0.0 {
            return Err(ConfigError::Validation(
                "sync.delay must be a positive number of seconds".into(),
            ));
        }
        if self.build.blacklist.iter().any(|name| name.is_empty()) {
            return Err(ConfigError::Validation(
                "build.blacklist entries must not be empty".into(),
            ));
        }
        for (i, attr) in self.attributions.iter().enumerate() {
            if attr.category.trim().is_empty()
                || attr.title.trim().is_empty()
                || attr.link.trim().is_empty()
                || attr.file.as_os_str().is_empty()
            {
                return Err(ConfigError::Validation(format!(
                    "attributions[{i}] needs a category, title, link and file"
                )));
            }
        }
        Ok(())
    }

    /// Root URL with trailing slashes removed. Pages join paths with `/`.
    pub fn root_url(&self) -> &str {
        self.site.root_url.trim_end_matches('/')
    }

    /// Make every directory absolute, anchored at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for dir in [
            &mut self.build.source_directory,
            &mut self.build.template_directory,
            &mut self.build.output_directory,
        ] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    /// Construct the attribution entries, checking that every file exists.
    pub fn attribution_entries(&self) -> Result<Vec<AttributionEntry>, ConfigError> {
        self.attributions
            .iter()
            .map(|a| {
                AttributionEntry::new(
                    &a.category,
                    &a.title,
                    &a.link,
                    &a.file,
                    &self.build.source_directory,
                )
            })
            .collect()
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Stock defaults as a TOML table, the base every config file overlays.
fn default_table() -> Result<toml::Table, ConfigError> {
    match toml::Value::try_from(SiteConfig::default())? {
        toml::Value::Table(table) => Ok(table),
        other => Err(ConfigError::Validation(format!(
            "stock defaults serialized to a {}",
            other.type_str()
        ))),
    }
}

/// Lay `overlay` over `base` key by key. A table meeting a table descends;
/// any other value, arrays included, takes the key over.
fn overlay_table(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let value = match (value, base.get_mut(&key)) {
            (toml::Value::Table(nested), Some(toml::Value::Table(inner))) => {
                overlay_table(inner, nested);
                continue;
            }
            (value, _) => value,
        };
        base.insert(key, value);
    }
}

/// Parse config text, overlay it on the stock defaults and validate the
/// result.
pub fn parse_config(content: &str) -> Result<SiteConfig, ConfigError> {
    let overlay: toml::Table = toml::from_str(content)?;
    let mut table = default_table()?;
    overlay_table(&mut table, overlay);
    let config: SiteConfig = toml::Value::Table(table).try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path`.
///
/// A missing file yields the stock defaults. Relative directories in the
/// result are resolved against the file's parent directory.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let mut config = if path.exists() {
        parse_config(&fs::read_to_string(path)?)?
    } else {
        SiteConfig::default()
    };
    let base = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::path::absolute(parent)?,
        _ => std::env::current_dir()?,
    };
    config.resolve_paths(&base);
    Ok(config)
}

/// Returns a fully-commented stock `sitepress.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# sitepress configuration
# =======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Site identity
# ---------------------------------------------------------------------------
[site]
# Written into images/favicon/site.webmanifest as `name`.
name = "My Site"
# Written into images/favicon/site.webmanifest as `short_name`.
name_short = "Site"
# Absolute URL the site is served from. Trailing slashes are ignored.
# Available to templates as `rootUrl`; used for every sitemap <loc>.
root_url = "https://example.com"

# ---------------------------------------------------------------------------
# Build
# ---------------------------------------------------------------------------
[build]
# Content tree. Every entry is mirrored into the output directory:
# *.html files are rendered as templates, everything else is copied.
source_directory = "src"
# Layouts and partials. Searched before the source directory.
template_directory = "templates"
# Deleted and recreated on every build.
output_directory = "build"
# Exact names (not globs) that are never copied or rendered.
blacklist = [".DS_Store", "attributions"]

# ---------------------------------------------------------------------------
# Static file sync (`sitepress sync`)
# ---------------------------------------------------------------------------
[sync]
# Seconds during which repeated change notifications for one file are dropped.
delay = 1.0

# ---------------------------------------------------------------------------
# Template values
# ---------------------------------------------------------------------------
# Social links are the lowest-precedence template values.
[social_media]
# github = "https://github.com/example"

# Overrides shadow every other template value, including rootUrl.
[overrides]
# analytics = "UA-000000-1"

# ---------------------------------------------------------------------------
# Attributions (rendered with templates/attributions.html)
# ---------------------------------------------------------------------------
# A bare file name is looked up in <source_directory>/attributions/.
# [[attributions]]
# category = "Fonts"
# title = "Inter"
# link = "https://rsms.me/inter/"
# file = "inter.txt"
"##
}
