//! Per-page template context.
//!
//! A context is assembled from three layers, lowest precedence first:
//!
//! ```text
//! 1. social links       github, mastodon, ...
//! 2. fixed fields       rootUrl, pagePath, cacheVersion
//! 3. user overrides     anything from [overrides]
//! ```
//!
//! A later layer silently shadows an earlier one on key collision, so an
//! override can replace `rootUrl` and a social link named `pagePath` never
//! wins over the real page path.

use chrono::{DateTime, Datelike, Timelike, Utc};
use minijinja::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub const ROOT_URL: &str = "rootUrl";
pub const PAGE_PATH: &str = "pagePath";
pub const CACHE_VERSION: &str = "cacheVersion";

/// Ordered key → value mapping handed to the template engine.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    values: BTreeMap<String, Value>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a layer on top of the current values; colliding keys are replaced.
    pub fn layer<K, V, I>(mut self, layer: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in layer {
            self.values.insert(key.into(), value.into());
        }
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::from_iter(self.values)
    }
}

/// Everything a page context needs apart from the page itself.
#[derive(Debug, Clone, Default)]
pub struct ContextDefaults {
    pub root_url: String,
    pub social_links: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, serde_json::Value>,
}

impl ContextDefaults {
    pub fn for_page(&self, page_path: &str) -> RenderContext {
        build_context(
            page_path,
            &self.root_url,
            &self.social_links,
            &self.overrides,
        )
    }
}

/// Build the context for one page.
///
/// `page_path` is the slash-separated path of the content file relative to
/// the source root, used verbatim.
pub fn build_context(
    page_path: &str,
    root_url: &str,
    social_links: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, serde_json::Value>,
) -> RenderContext {
    let fixed = [
        (ROOT_URL, Value::from(root_url)),
        (PAGE_PATH, Value::from(page_path)),
        (CACHE_VERSION, Value::from(cache_version())),
    ];

    RenderContext::new()
        .layer(
            social_links
                .iter()
                .map(|(k, v)| (k.as_str(), Value::from(v.as_str()))),
        )
        .layer(fixed)
        .layer(
            overrides
                .iter()
                .map(|(k, v)| (k.as_str(), Value::from_serialize(v))),
        )
}

// =============================================================================
// Cache-busting version
// =============================================================================

static LAST_VERSION: AtomicU64 = AtomicU64::new(0);

/// Current UTC time as a 12-digit `yymmddHHMMSS` string.
///
/// Never goes backwards within a process, even if the wall clock does.
pub fn cache_version() -> String {
    cache_version_at(Utc::now())
}

fn cache_version_at(now: DateTime<Utc>) -> String {
    let stamp = timestamp_digits(now);
    let previous = LAST_VERSION.fetch_max(stamp, Ordering::SeqCst);
    format!("{:012}", previous.max(stamp))
}

fn timestamp_digits(t: DateTime<Utc>) -> u64 {
    let year = (t.year().rem_euclid(100)) as u64;
    year * 10_000_000_000
        + t.month() as u64 * 100_000_000
        + t.day() as u64 * 1_000_000
        + t.hour() as u64 * 10_000
        + t.minute() as u64 * 100
        + t.second() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn social() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("github".to_string(), "https://github.com/me".to_string()),
            ("pagePath".to_string(), "shadowed".to_string()),
        ])
    }

    #[test]
    fn fixed_fields_present() {
        let ctx = build_context("blog/post.html", "https://example.com", &BTreeMap::new(), &BTreeMap::new());
        assert_eq!(ctx.get(ROOT_URL).unwrap().as_str(), Some("https://example.com"));
        assert_eq!(ctx.get(PAGE_PATH).unwrap().as_str(), Some("blog/post.html"));
        assert!(ctx.contains_key(CACHE_VERSION));
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn fixed_fields_shadow_social_links() {
        let ctx = build_context("index.html", "https://example.com", &social(), &BTreeMap::new());
        assert_eq!(ctx.get(PAGE_PATH).unwrap().as_str(), Some("index.html"));
        assert_eq!(ctx.get("github").unwrap().as_str(), Some("https://github.com/me"));
    }

    #[test]
    fn overrides_shadow_everything() {
        let overrides = BTreeMap::from([
            ("rootUrl".to_string(), serde_json::json!("https://staging.example.com")),
            ("github".to_string(), serde_json::json!("https://github.com/other")),
            ("year".to_string(), serde_json::json!(2024)),
        ]);
        let ctx = build_context("index.html", "https://example.com", &social(), &overrides);
        assert_eq!(
            ctx.get(ROOT_URL).unwrap().as_str(),
            Some("https://staging.example.com")
        );
        assert_eq!(ctx.get("github").unwrap().as_str(), Some("https://github.com/other"));
        assert_eq!(ctx.get("year").unwrap().as_i64(), Some(2024));
    }

    #[test]
    fn defaults_for_page_matches_build_context() {
        let defaults = ContextDefaults {
            root_url: "https://example.com".to_string(),
            social_links: social(),
            overrides: BTreeMap::new(),
        };
        let ctx = defaults.for_page("about.html");
        assert_eq!(ctx.get(PAGE_PATH).unwrap().as_str(), Some("about.html"));
        assert!(ctx.contains_key("github"));
    }

    #[test]
    fn timestamp_digits_layout() {
        let t = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(timestamp_digits(t), 240_307_090_502);
    }

    #[test]
    fn cache_version_is_twelve_digits() {
        let v = cache_version();
        assert_eq!(v.len(), 12);
        assert!(v.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn cache_version_never_decreases() {
        let later = Utc.with_ymd_and_hms(2099, 12, 31, 23, 59, 59).unwrap();
        let earlier = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let first = cache_version_at(later);
        let second = cache_version_at(earlier);
        assert!(second.parse::<u64>().unwrap() >= first.parse::<u64>().unwrap());
    }
}
