//! Stylesheet compilation and static asset copying.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lightningcss::bundler::{Bundler, FileProvider};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions};
use lightningcss::targets::{Browsers, Targets};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::markdown::render_markdown;

/// Prefix marking files that are only meant to be included by others.
pub const PARTIAL_PREFIX: char = '_';

/// Minimum browser major versions to transpile modern CSS for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserTargets {
    pub chrome: Option<u32>,
    pub firefox: Option<u32>,
    pub safari: Option<u32>,
    pub edge: Option<u32>,
    pub ios_saf: Option<u32>,
}

impl Default for BrowserTargets {
    fn default() -> Self {
        Self {
            chrome: Some(90),
            firefox: Some(88),
            safari: Some(14),
            edge: Some(90),
            ios_saf: Some(14),
        }
    }
}

impl BrowserTargets {
    fn to_targets(&self) -> Targets {
        // lightningcss encodes versions as major << 16 | minor << 8 | patch
        let version = |major: Option<u32>| major.map(|v| v << 16);
        let browsers = Browsers {
            chrome: version(self.chrome),
            firefox: version(self.firefox),
            safari: version(self.safari),
            edge: version(self.edge),
            ios_saf: version(self.ios_saf),
            ..Browsers::default()
        };
        Targets::from(browsers)
    }
}

/// Stylesheet compile settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CssOptions {
    pub minify: bool,
    pub targets: BrowserTargets,
}

impl Default for CssOptions {
    fn default() -> Self {
        Self {
            minify: true,
            targets: BrowserTargets::default(),
        }
    }
}

/// A stylesheet that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Bundles `@import`s and transpiles stylesheets with lightningcss.
pub struct StylesheetCompiler {
    options: CssOptions,
}

impl StylesheetCompiler {
    pub fn new(options: CssOptions) -> Self {
        Self { options }
    }

    /// Entry stylesheets directly under `css_dir`, sorted by name.
    ///
    /// Partials (names starting with `_`) and subdirectories are skipped.
    pub fn discover(css_dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();

        let dir = match fs::read_dir(css_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e),
        };

        for entry in dir {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("css") {
                continue;
            }
            if is_partial(&path) {
                continue;
            }
            entries.push(path);
        }

        entries.sort();
        Ok(entries)
    }

    /// Compile one entry stylesheet, inlining its imports.
    pub fn compile(&self, entry: &Path) -> Result<String, String> {
        let provider = FileProvider::new();
        let mut bundler = Bundler::new(&provider, None, ParserOptions::default());

        let mut stylesheet = bundler
            .bundle(entry)
            .map_err(|e| format!("CSS bundle error: {}", e))?;

        stylesheet
            .minify(MinifyOptions {
                targets: self.options.targets.to_targets(),
                ..Default::default()
            })
            .map_err(|e| format!("CSS minify error: {}", e))?;

        let output = stylesheet
            .to_css(PrinterOptions {
                minify: self.options.minify,
                targets: self.options.targets.to_targets(),
                ..Default::default()
            })
            .map_err(|e| format!("CSS print error: {}", e))?;

        Ok(output.code)
    }

    /// Compile every entry in parallel.
    ///
    /// Returns `(entry, css)` pairs in input order, or every failure if any
    /// entry failed.
    pub fn compile_all(
        &self,
        entries: &[PathBuf],
    ) -> Result<Vec<(PathBuf, String)>, Vec<StylesheetFailure>> {
        let results: Vec<(PathBuf, Result<String, String>)> = entries
            .par_iter()
            .map(|entry| (entry.clone(), self.compile(entry)))
            .collect();

        let mut compiled = Vec::with_capacity(results.len());
        let mut failures = Vec::new();

        for (path, result) in results {
            match result {
                Ok(css) => compiled.push((path, css)),
                Err(message) => {
                    tracing::error!("Failed to compile {}: {}", path.display(), message);
                    failures.push(StylesheetFailure { path, message });
                }
            }
        }

        if failures.is_empty() {
            Ok(compiled)
        } else {
            Err(failures)
        }
    }
}

/// Whether a file is a partial by naming convention.
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PARTIAL_PREFIX))
}

/// Recursively copy `src` into `dst`, returning the number of files copied.
pub fn copy_dir(src: &Path, dst: &Path) -> io::Result<usize> {
    let mut copied = 0;

    for entry in WalkDir::new(src).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Render every non-partial `.md` file under `src` to an `.html` file at the
/// matching position under `dst`. Returns the number of files rendered.
pub fn render_markdown_tree(src: &Path, dst: &Path) -> io::Result<usize> {
    let mut rendered = 0;

    for entry in WalkDir::new(src).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();

        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some("md")
            || is_partial(path)
        {
            continue;
        }

        let relative = path.strip_prefix(src).unwrap_or(path);
        let target = dst.join(relative).with_extension("html");

        let source = fs::read_to_string(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, render_markdown(&source))?;
        rendered += 1;
    }

    Ok(rendered)
}
