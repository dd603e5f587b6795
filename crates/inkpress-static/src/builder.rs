//! Static site builder.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::Instrument;
use walkdir::WalkDir;

use inkpress_content::{fetch_all, ContentDocument, ContentError, ContentSource, FetchOptions};

use crate::assets::{copy_dir, render_markdown_tree, CssOptions, StylesheetCompiler, StylesheetFailure};
use crate::output::{entry_output_path, normalize_path, page_output_path, template_name};
use crate::stage::{BuildState, Stage};
use crate::templates::{MissingTemplate, TemplateEngine, TemplateError, TemplateRegistry};

/// Configuration for building a static site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Source tree (templates and static files)
    pub src_dir: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,

    /// Intermediate document file name, inside the output directory
    pub data_file: String,

    /// Files copied verbatim from the source root to the output root
    pub passthrough: Vec<String>,

    /// Template file extension, without the leading dot
    pub template_extension: String,

    /// Behaviour for content types without a template
    pub missing_template: MissingTemplate,

    /// Entry field holding the output URL
    pub url_field: String,

    /// Content fetch options
    pub fetch: FetchOptions,

    /// Stylesheet compile options
    pub css: CssOptions,

    /// Directories under `static/` copied byte-for-byte
    pub asset_dirs: Vec<String>,

    /// Directory under `static/` holding markdown to copy and render
    pub markdown_dir: Option<String>,

    /// Upper bound on the whole build
    pub deadline: Option<Duration>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::from("src"),
            output_dir: PathBuf::from("dist"),
            data_file: "data.json".to_string(),
            passthrough: vec!["CNAME".to_string()],
            template_extension: "jinja".to_string(),
            missing_template: MissingTemplate::Fail,
            url_field: "url".to_string(),
            fetch: FetchOptions::default(),
            css: CssOptions::default(),
            asset_dirs: vec!["img".to_string(), "js".to_string()],
            markdown_dir: Some("md".to_string()),
            deadline: Some(Duration::from_secs(600)),
        }
    }
}

impl BuildConfig {
    pub fn templates_dir(&self) -> PathBuf {
        self.src_dir.join("templates")
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.templates_dir().join("pages")
    }

    pub fn static_dir(&self) -> PathBuf {
        self.src_dir.join("static")
    }

    pub fn css_dir(&self) -> PathBuf {
        self.static_dir().join("css")
    }

    pub fn output_static_dir(&self) -> PathBuf {
        self.output_dir.join("static")
    }

    /// Location of the intermediate document.
    pub fn data_path(&self) -> PathBuf {
        self.output_dir.join(&self.data_file)
    }

    /// The output directory is deleted on every build, so it must not be the
    /// working directory, the source tree, or an ancestor of either.
    pub fn check_output_dir(&self) -> Result<(), BuildError> {
        let unsafe_dir = || BuildError::UnsafeOutputDir(self.output_dir.clone());
        if self.output_dir.as_os_str().is_empty() {
            return Err(unsafe_dir());
        }

        let output = normalize_path(&self.output_dir).map_err(io_error(&self.output_dir))?;
        let src = normalize_path(&self.src_dir).map_err(io_error(&self.src_dir))?;
        let cwd = normalize_path(Path::new(".")).map_err(io_error(Path::new(".")))?;

        if cwd.starts_with(&output) || src.starts_with(&output) {
            return Err(unsafe_dir());
        }
        Ok(())
    }
}

/// Result of a build operation.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Files rendered from content-type templates
    pub entries: usize,

    /// Files rendered from page templates
    pub pages: usize,

    /// Stylesheets compiled
    pub stylesheets: usize,

    /// Static files copied
    pub assets: usize,

    /// Markdown files rendered to HTML
    pub markdown: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// Errors that can occur during build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Entry {index} of '{content_type}' has no string field '{field}'")]
    MissingUrl {
        content_type: String,
        index: usize,
        field: String,
    },

    #[error("URL '{0}' resolves outside the output directory")]
    InvalidOutputPath(String),

    #[error("Failed to compile stylesheets: {}", describe_failures(.0))]
    Stylesheets(Vec<StylesheetFailure>),

    #[error("Build exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Refusing to use {} as output directory: it contains the project or source tree", .0.display())]
    UnsafeOutputDir(PathBuf),
}

fn describe_failures(failures: &[StylesheetFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.path.display(), f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> BuildError + '_ {
    move |source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Static site builder.
///
/// Runs [`Stage::ALL`] in order against one content source. A failing stage
/// stops the run; the intermediate document is removed either way.
pub struct StaticBuilder<S> {
    config: BuildConfig,
    source: S,
    state: BuildState,
}

impl<S: ContentSource> StaticBuilder<S> {
    /// Create a new static builder.
    pub fn new(config: BuildConfig, source: S) -> Self {
        Self {
            config,
            source,
            state: BuildState::Idle,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Build the static site.
    pub async fn build(&mut self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        let mut result = BuildResult {
            output_dir: self.config.output_dir.clone(),
            ..Default::default()
        };

        let outcome = match self.config.deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.run_stages(&mut result)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(BuildError::DeadlineExceeded(deadline)),
                }
            }
            None => self.run_stages(&mut result).await,
        };

        match outcome {
            Ok(()) => {
                self.state = BuildState::Done;
                result.duration_ms = start.elapsed().as_millis() as u64;
                Ok(result)
            }
            Err(e) => {
                let failed_at = match self.state {
                    BuildState::Running(stage) | BuildState::Failed(stage) => stage,
                    BuildState::Idle | BuildState::Done => Stage::Clean,
                };
                self.state = BuildState::Failed(failed_at);
                tracing::error!("Build failed during {}: {}", failed_at, e);
                self.discard_intermediate().await;
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self, result: &mut BuildResult) -> Result<(), BuildError> {
        for stage in Stage::ALL {
            self.state = BuildState::Running(stage);
            let started = Instant::now();

            self.run_stage(stage, result)
                .instrument(tracing::info_span!("stage", name = stage.name()))
                .await?;

            tracing::debug!(
                "Stage {} finished in {}ms",
                stage,
                started.elapsed().as_millis()
            );
        }
        Ok(())
    }

    async fn run_stage(&self, stage: Stage, result: &mut BuildResult) -> Result<(), BuildError> {
        match stage {
            Stage::Clean => self.clean().await,
            Stage::Scaffold => self.scaffold(),
            Stage::FetchContent => self.fetch_content().await,
            Stage::RenderContent => {
                let document = self.read_document().await?;
                result.entries = self.render_content(&document)?;
                Ok(())
            }
            Stage::RenderPages => {
                let document = self.read_document().await?;
                result.pages = self.render_pages(&document)?;
                Ok(())
            }
            Stage::CompileStyles => {
                result.stylesheets = self.compile_styles()?;
                Ok(())
            }
            Stage::CopyAssets => {
                let (assets, markdown) = self.copy_assets()?;
                result.assets = assets;
                result.markdown = markdown;
                Ok(())
            }
            Stage::Cleanup => {
                ContentDocument::remove(&self.config.data_path()).await?;
                Ok(())
            }
        }
    }

    /// Remove the output tree.
    async fn clean(&self) -> Result<(), BuildError> {
        self.config.check_output_dir()?;
        let output = &self.config.output_dir;
        match tokio::fs::remove_dir_all(output).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(output)(e)),
        }
    }

    /// Recreate the output tree skeleton and copy passthrough files.
    fn scaffold(&self) -> Result<(), BuildError> {
        let css_out = self.config.output_static_dir().join("css");
        fs::create_dir_all(&css_out).map_err(io_error(&css_out))?;

        for name in &self.config.passthrough {
            let source = self.config.src_dir.join(name);
            if !source.is_file() {
                tracing::debug!("Passthrough file {} not found, skipping", source.display());
                continue;
            }
            let target = self.config.output_dir.join(name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            fs::copy(&source, &target).map_err(io_error(&source))?;
        }

        Ok(())
    }

    async fn fetch_content(&self) -> Result<(), BuildError> {
        let document = fetch_all(&self.source, &self.config.fetch).await?;
        tracing::info!(
            "Fetched {} entries across {} content types",
            document.entry_count(),
            document.len()
        );
        document.write(&self.config.data_path()).await?;
        Ok(())
    }

    async fn read_document(&self) -> Result<ContentDocument, BuildError> {
        Ok(ContentDocument::read(&self.config.data_path()).await?)
    }

    /// Render one file per entry through its content-type template.
    fn render_content(&self, document: &ContentDocument) -> Result<usize, BuildError> {
        let templates_dir = self.config.templates_dir();
        let engine = TemplateEngine::new(&templates_dir);
        let registry = TemplateRegistry::scan(&templates_dir, &self.config.template_extension)?;
        let mut rendered = 0;

        for (content_type, entries) in document.iter() {
            let template = match registry.resolve(content_type) {
                Ok(template) => template,
                Err(e) => match self.config.missing_template {
                    MissingTemplate::Fail => return Err(e.into()),
                    MissingTemplate::Skip => {
                        tracing::warn!("{}, skipping {} entries", e, entries.len());
                        continue;
                    }
                },
            };

            for (index, entry) in entries.iter().enumerate() {
                let url = entry
                    .url(&self.config.url_field)
                    .ok_or_else(|| BuildError::MissingUrl {
                        content_type: content_type.to_string(),
                        index,
                        field: self.config.url_field.clone(),
                    })?;
                let output_path = entry_output_path(&self.config.output_dir, url)
                    .ok_or_else(|| BuildError::InvalidOutputPath(url.to_string()))?;

                let html = engine.render(template, entry)?;
                write_file(&output_path, &html)?;
                rendered += 1;
            }

            tracing::debug!("Rendered {} {} entries with {}", entries.len(), content_type, template);
        }

        tracing::info!("Rendered {} content pages", rendered);
        Ok(rendered)
    }

    /// Render every page template against the whole document.
    fn render_pages(&self, document: &ContentDocument) -> Result<usize, BuildError> {
        let templates_dir = self.config.templates_dir();
        let pages_dir = self.config.pages_dir();
        if !pages_dir.exists() {
            tracing::debug!("No pages directory at {}", pages_dir.display());
            return Ok(0);
        }

        let engine = TemplateEngine::new(&templates_dir);
        let suffix = format!(".{}", self.config.template_extension);
        let mut rendered = 0;

        for entry in WalkDir::new(&pages_dir).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();

            let is_template = entry.file_type().is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(&suffix));
            if !is_template {
                continue;
            }

            let name = template_name(path.strip_prefix(&templates_dir).unwrap_or(path));
            let relative = path.strip_prefix(&pages_dir).unwrap_or(path);
            let output_path =
                page_output_path(&self.config.output_dir, relative, &self.config.template_extension);

            let html = engine.render(&name, document)?;
            write_file(&output_path, &html)?;
            rendered += 1;
        }

        tracing::info!("Rendered {} pages", rendered);
        Ok(rendered)
    }

    /// Compile entry stylesheets into `static/css`.
    fn compile_styles(&self) -> Result<usize, BuildError> {
        let css_dir = self.config.css_dir();
        let entries = StylesheetCompiler::discover(&css_dir).map_err(io_error(&css_dir))?;
        let compiler = StylesheetCompiler::new(self.config.css.clone());

        let compiled = compiler
            .compile_all(&entries)
            .map_err(BuildError::Stylesheets)?;

        let css_out = self.config.output_static_dir().join("css");
        for (path, css) in &compiled {
            let relative = path.strip_prefix(&css_dir).unwrap_or(path);
            write_file(&css_out.join(relative), css)?;
        }

        tracing::info!("Compiled {} stylesheets", compiled.len());
        Ok(compiled.len())
    }

    /// Copy asset directories and the markdown tree, rendering markdown.
    fn copy_assets(&self) -> Result<(usize, usize), BuildError> {
        let static_dir = self.config.static_dir();
        let static_out = self.config.output_static_dir();
        let mut copied = 0;
        let mut rendered = 0;

        for dir in &self.config.asset_dirs {
            let source = static_dir.join(dir);
            if !source.is_dir() {
                tracing::debug!("Asset directory {} not found, skipping", source.display());
                continue;
            }
            copied += copy_dir(&source, &static_out.join(dir)).map_err(io_error(&source))?;
        }

        if let Some(dir) = &self.config.markdown_dir {
            let source = static_dir.join(dir);
            if source.is_dir() {
                let target = static_out.join(dir);
                copied += copy_dir(&source, &target).map_err(io_error(&source))?;
                rendered = render_markdown_tree(&source, &target).map_err(io_error(&source))?;
            }
        }

        tracing::info!("Copied {} static files, rendered {} markdown files", copied, rendered);
        Ok((copied, rendered))
    }

    /// Best-effort removal of the intermediate document after a failure.
    async fn discard_intermediate(&self) {
        let path = self.config.data_path();
        match ContentDocument::remove(&path).await {
            Ok(true) => tracing::debug!("Removed {}", path.display()),
            Ok(false) => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

/// Write `contents` to `path`, creating parent directories.
fn write_file(path: &Path, contents: &str) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(path, contents).map_err(io_error(path))
}
