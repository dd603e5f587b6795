//! Template engine and content-type template registry.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use minijinja::{AutoEscape, Environment, ErrorKind, Value};
use serde::{Deserialize, Serialize};

use crate::markdown::render_markdown;

/// Errors raised while resolving or rendering templates.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("No template for content type '{content_type}' (expected {expected})")]
    NotFound {
        content_type: String,
        expected: PathBuf,
    },

    #[error("Failed to scan templates in {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to render {template}: {source}")]
    Render {
        template: String,
        #[source]
        source: minijinja::Error,
    },
}

/// What to do when a content type has no template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingTemplate {
    /// Abort the build
    #[default]
    Fail,
    /// Log a warning and render nothing for that type
    Skip,
}

/// Template engine using minijinja, loading templates from disk.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create an engine that resolves template names relative to `templates_dir`.
    pub fn new(templates_dir: &Path) -> Self {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(templates_dir));
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.add_filter("date", date_filter);
        env.add_filter("markdown", markdown_filter);

        Self { env }
    }

    /// Render a template with `data` bound as the `data` variable.
    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<String, TemplateError> {
        let render_error = |source| TemplateError::Render {
            template: template.to_string(),
            source,
        };

        let tmpl = self.env.get_template(template).map_err(render_error)?;
        tmpl.render(minijinja::context! { data => data })
            .map_err(render_error)
    }
}

/// Content-type identifier to template name, built from the files directly
/// under the templates directory.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates_dir: PathBuf,
    extension: String,
    templates: HashMap<String, String>,
}

impl TemplateRegistry {
    /// Scan `templates_dir` for `<content-type>.<extension>` files.
    ///
    /// A missing directory yields an empty registry.
    pub fn scan(templates_dir: &Path, extension: &str) -> Result<Self, TemplateError> {
        let mut templates = HashMap::new();
        let suffix = format!(".{extension}");

        let scan_error = |source| TemplateError::Scan {
            path: templates_dir.to_path_buf(),
            source,
        };

        match fs::read_dir(templates_dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry.map_err(scan_error)?;
                    if !entry.file_type().map_err(scan_error)?.is_file() {
                        continue;
                    }
                    let file_name = entry.file_name();
                    let Some(name) = file_name.to_str() else {
                        continue;
                    };
                    if let Some(content_type) = name.strip_suffix(&suffix) {
                        templates.insert(content_type.to_string(), name.to_string());
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Templates directory {} not found", templates_dir.display());
            }
            Err(e) => return Err(scan_error(e)),
        }

        Ok(Self {
            templates_dir: templates_dir.to_path_buf(),
            extension: extension.to_string(),
            templates,
        })
    }

    /// Template name for a content type.
    pub fn resolve(&self, content_type: &str) -> Result<&str, TemplateError> {
        self.templates
            .get(content_type)
            .map(String::as_str)
            .ok_or_else(|| TemplateError::NotFound {
                content_type: content_type.to_string(),
                expected: self
                    .templates_dir
                    .join(format!("{content_type}.{}", self.extension)),
            })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// `{{ entry.fields.publishDate | date("%d %B %Y") }}`
fn date_filter(value: &str, format: Option<&str>) -> Result<String, minijinja::Error> {
    let format = format.unwrap_or("%Y-%m-%d");
    let parsed = parse_date(value).ok_or_else(|| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot parse '{value}' as a date"),
        )
    })?;

    let mut out = String::new();
    write!(out, "{}", parsed.format(format)).map_err(|_| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid date format '{format}'"),
        )
    })?;
    Ok(out)
}

/// Accepts RFC 3339, the CMS's minute-precision datetimes, and plain dates.
fn parse_date(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn markdown_filter(value: &str) -> Value {
    Value::from_safe_string(render_markdown(value))
}
