//! Template rendering and HTML minification.
//!
//! Pages are rendered with [minijinja](https://docs.rs/minijinja). Template
//! names are slash-separated paths looked up in two roots, first match wins:
//!
//! ```text
//! templates/        # layouts, partials, attributions.html, sitemap.xml
//! src/              # content pages themselves
//! ```
//!
//! so a content page can `{% extends "base.html" %}` a layout from the
//! template root, and a template-root file shadows a content file with the
//! same name.
//!
//! HTML output goes through [minify-html](https://docs.rs/minify-html) with
//! closing tags kept and embedded CSS/JS minified. XML output (the sitemap)
//! is written as rendered.

use crate::context::RenderContext;
use minijinja::{AutoEscape, Environment, ErrorKind};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Template not found in any search root: {0}")]
    TemplateNotFound(String),
    #[error("Failed to render template {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: minijinja::Error,
    },
    #[error("Minified output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// What the rendered text is; decides whether it gets minified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Html,
    Xml,
}

pub struct PageRenderer {
    env: Environment<'static>,
    minify: minify_html::Cfg,
}

impl std::fmt::Debug for PageRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRenderer").finish_non_exhaustive()
    }
}

impl PageRenderer {
    /// Create a renderer searching `template_root`, then `source_root`.
    pub fn new(template_root: &Path, source_root: &Path) -> Self {
        let roots = vec![template_root.to_path_buf(), source_root.to_path_buf()];

        let mut env = Environment::new();
        env.set_loader(move |name| load_from_roots(&roots, name));
        // Pages are trusted site content; nothing is escaped implicitly.
        env.set_auto_escape_callback(|_| AutoEscape::None);

        Self {
            env,
            minify: minify_config(),
        }
    }

    /// Render `template_id` with `context`, minifying HTML output.
    pub fn render_page(
        &self,
        template_id: &str,
        context: RenderContext,
        kind: OutputKind,
    ) -> Result<String, RenderError> {
        let template = self.env.get_template(template_id).map_err(|e| {
            if e.kind() == ErrorKind::TemplateNotFound {
                RenderError::TemplateNotFound(template_id.to_string())
            } else {
                RenderError::Template {
                    name: template_id.to_string(),
                    source: e,
                }
            }
        })?;

        let text = template
            .render(context.into_value())
            .map_err(|source| RenderError::Template {
                name: template_id.to_string(),
                source,
            })?;

        match kind {
            OutputKind::Html => self.minify_html(&text),
            OutputKind::Xml => Ok(text),
        }
    }

    pub fn minify_html(&self, html: &str) -> Result<String, RenderError> {
        let bytes = minify_html::minify(html.as_bytes(), &self.minify);
        Ok(String::from_utf8(bytes)?)
    }
}

fn minify_config() -> minify_html::Cfg {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.minify_css = true;
    cfg.minify_js = true;
    cfg.remove_processing_instructions = true;
    cfg
}

fn load_from_roots(roots: &[PathBuf], name: &str) -> Result<Option<String>, minijinja::Error> {
    for root in roots {
        let Some(path) = safe_join(root, name) else {
            return Ok(None);
        };
        if !path.is_file() {
            continue;
        }
        return fs::read_to_string(&path).map(Some).map_err(|e| {
            minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("could not read template {}", path.display()),
            )
            .with_source(e)
        });
    }
    Ok(None)
}

/// Join a slash-separated template name onto `root`.
///
/// Returns `None` for names that would escape the root (`..`, absolute).
fn safe_join(root: &Path, name: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in name.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => path.push(part),
            _ => return None,
        }
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RenderContext;
    use tempfile::TempDir;

    fn roots() -> (TempDir, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("templates");
        let source = tmp.path().join("src");
        fs::create_dir_all(&templates).unwrap();
        fs::create_dir_all(&source).unwrap();
        (tmp, templates, source)
    }

    fn ctx(pairs: &[(&str, &str)]) -> RenderContext {
        RenderContext::new().layer(pairs.iter().copied())
    }

    #[test]
    fn renders_content_page_with_layout() {
        let (_tmp, templates, source) = roots();
        fs::write(
            templates.join("base.html"),
            "<html><body>{% block body %}{% endblock %}</body></html>",
        )
        .unwrap();
        fs::write(
            source.join("index.html"),
            "{% extends \"base.html\" %}{% block body %}<p>{{ rootUrl }}</p>{% endblock %}",
        )
        .unwrap();

        let renderer = PageRenderer::new(&templates, &source);
        let out = renderer
            .render_page("index.html", ctx(&[("rootUrl", "https://example.com")]), OutputKind::Html)
            .unwrap();
        assert!(out.contains("<p>https://example.com</p>"));
    }

    #[test]
    fn template_root_takes_precedence() {
        let (_tmp, templates, source) = roots();
        fs::write(templates.join("page.html"), "from templates").unwrap();
        fs::write(source.join("page.html"), "from source").unwrap();

        let renderer = PageRenderer::new(&templates, &source);
        let out = renderer
            .render_page("page.html", RenderContext::new(), OutputKind::Xml)
            .unwrap();
        assert_eq!(out, "from templates");
    }

    #[test]
    fn nested_template_ids_resolve() {
        let (_tmp, templates, source) = roots();
        fs::create_dir_all(source.join("blog")).unwrap();
        fs::write(source.join("blog/post.html"), "{{ pagePath }}").unwrap();

        let renderer = PageRenderer::new(&templates, &source);
        let out = renderer
            .render_page("blog/post.html", ctx(&[("pagePath", "blog/post.html")]), OutputKind::Xml)
            .unwrap();
        assert_eq!(out, "blog/post.html");
    }

    #[test]
    fn missing_template_is_not_found() {
        let (_tmp, templates, source) = roots();
        let renderer = PageRenderer::new(&templates, &source);
        let err = renderer
            .render_page("nope.html", RenderContext::new(), OutputKind::Html)
            .unwrap_err();
        assert!(matches!(err, RenderError::TemplateNotFound(name) if name == "nope.html"));
    }

    #[test]
    fn parent_traversal_never_resolves() {
        let (tmp, templates, source) = roots();
        fs::write(tmp.path().join("secret.html"), "secret").unwrap();
        let renderer = PageRenderer::new(&templates, &source);
        let err = renderer
            .render_page("../secret.html", RenderContext::new(), OutputKind::Xml)
            .unwrap_err();
        assert!(matches!(err, RenderError::TemplateNotFound(_)));
    }

    #[test]
    fn html_is_not_escaped() {
        let (_tmp, templates, source) = roots();
        fs::write(source.join("raw.html"), "{{ snippet }}").unwrap();
        let renderer = PageRenderer::new(&templates, &source);
        let out = renderer
            .render_page("raw.html", ctx(&[("snippet", "<b>bold</b>")]), OutputKind::Xml)
            .unwrap();
        assert_eq!(out, "<b>bold</b>");
    }

    #[test]
    fn html_output_is_minified_and_keeps_closing_tags() {
        let (_tmp, templates, source) = roots();
        fs::write(
            source.join("page.html"),
            "<!DOCTYPE html>\n<html>\n  <body>\n    <!-- note -->\n    <p>  hello  </p>\n  </body>\n</html>\n",
        )
        .unwrap();
        let renderer = PageRenderer::new(&templates, &source);
        let out = renderer
            .render_page("page.html", RenderContext::new(), OutputKind::Html)
            .unwrap();
        assert!(!out.contains("<!-- note -->"));
        assert!(out.contains("</p>"));
        assert!(!out.contains("\n    "));
    }

    #[test]
    fn xml_output_is_untouched() {
        let (_tmp, templates, source) = roots();
        let xml = "<?xml version=\"1.0\"?>\n<urlset>\n  <url/>\n</urlset>";
        fs::write(templates.join("sitemap.xml"), xml).unwrap();
        let renderer = PageRenderer::new(&templates, &source);
        let out = renderer
            .render_page("sitemap.xml", RenderContext::new(), OutputKind::Xml)
            .unwrap();
        assert_eq!(out, xml);
    }

    #[test]
    fn same_inputs_render_identically() {
        let (_tmp, templates, source) = roots();
        fs::write(source.join("a.html"), "<p>{{ x }}</p>").unwrap();
        let renderer = PageRenderer::new(&templates, &source);
        let a = renderer
            .render_page("a.html", ctx(&[("x", "1")]), OutputKind::Html)
            .unwrap();
        let b = renderer
            .render_page("a.html", ctx(&[("x", "1")]), OutputKind::Html)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn safe_join_skips_empty_and_dot_segments() {
        let root = Path::new("/root");
        assert_eq!(safe_join(root, "a//./b.html"), Some(PathBuf::from("/root/a/b.html")));
        assert_eq!(safe_join(root, "a/../b.html"), None);
    }
}
