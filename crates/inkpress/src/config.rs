//! Configuration: `inkpress.toml` plus environment.
//!
//! Everything is resolved once at startup into an immutable [`Settings`]
//! value that commands borrow.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use inkpress_content::{ContentfulConfig, FetchOptions};
use inkpress_publish::{PagesConfig, S3Config};
use inkpress_server::DevServerConfig;
use inkpress_static::{BuildConfig, CssOptions, MissingTemplate};

/// Configuration file structure (inkpress.toml).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    site: SiteSection,
    content: ContentSection,
    templates: TemplatesSection,
    css: CssOptions,
    assets: AssetsSection,
    build: BuildSection,
    dev: DevSection,
    pages: PagesSection,
    s3: S3Section,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SiteSection {
    src: PathBuf,
    output: PathBuf,
    passthrough: Vec<String>,
    data_file: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            src: PathBuf::from("src"),
            output: PathBuf::from("dist"),
            passthrough: vec!["CNAME".to_string()],
            data_file: "data.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ContentSection {
    order_by: Option<String>,
    url_field: String,
    environment: String,
    preview: bool,
    page_size: u32,
    timeout_secs: u64,
    include_depth: usize,
}

impl Default for ContentSection {
    fn default() -> Self {
        Self {
            order_by: None,
            url_field: "url".to_string(),
            environment: "master".to_string(),
            preview: false,
            page_size: 100,
            timeout_secs: 30,
            include_depth: 4,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TemplatesSection {
    extension: String,
    missing: MissingTemplate,
}

impl Default for TemplatesSection {
    fn default() -> Self {
        Self {
            extension: "jinja".to_string(),
            missing: MissingTemplate::Fail,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AssetsSection {
    dirs: Vec<String>,
    markdown_dir: Option<String>,
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            dirs: vec!["img".to_string(), "js".to_string()],
            markdown_dir: Some("md".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BuildSection {
    /// Zero disables the deadline
    timeout_secs: u64,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self { timeout_secs: 600 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DevSection {
    host: String,
    port: u16,
    debounce_ms: u64,
    open: bool,
}

impl Default for DevSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            debounce_ms: 200,
            open: false,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PagesSection {
    remote: Option<String>,
    branch: Option<String>,
    author_name: Option<String>,
    author_email: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct S3Section {
    concurrency: usize,
}

impl Default for S3Section {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

/// Environment variables consulted at startup.
#[derive(Debug, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    const KEYS: [&'static str; 7] = [
        "CONTENTFUL_SPACE",
        "CONTENTFUL_ACCESSTOKEN",
        "AWS_REGION",
        "AWS_BUCKET",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "GIT_TOKEN",
    ];

    pub fn from_process() -> Self {
        let vars = Self::KEYS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        Self { vars }
    }

    /// Non-empty value of `key`.
    fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Env {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Load `.env` from the working directory, if present.
pub fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!("Loaded environment from {}", path.display());
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).context("Failed to load .env"),
    }
}

/// Load configuration from the config file if it exists.
/// Returns an error if the config file exists but is malformed.
fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        tracing::debug!("No {} found, using defaults", path.display());
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Fully resolved settings for every command.
#[derive(Debug, Clone)]
pub struct Settings {
    pub build: BuildConfig,
    pub contentful: ContentfulConfig,
    pub dev: DevServerConfig,
    /// Quiet window used to coalesce file changes in dev mode
    pub debounce: Duration,
    pub pages: PagesConfig,
    pub s3: S3Config,
    pub s3_concurrency: usize,
}

impl Settings {
    /// Read the config file and the process environment.
    pub fn load(config_path: &Path) -> Result<Self> {
        let file = load_config(config_path)?;
        Self::resolve(file, &Env::from_process())
    }

    pub fn resolve(file: ConfigFile, env: &Env) -> Result<Self> {
        let content = file.content;
        if content.page_size == 0 || content.page_size > ContentfulConfig::MAX_PAGE_SIZE {
            bail!(
                "content.page_size must be between 1 and {}, got {}",
                ContentfulConfig::MAX_PAGE_SIZE,
                content.page_size
            );
        }
        if file.templates.extension.is_empty() {
            bail!("templates.extension must not be empty");
        }

        let build = BuildConfig {
            src_dir: file.site.src,
            output_dir: file.site.output.clone(),
            data_file: file.site.data_file,
            passthrough: file.site.passthrough,
            template_extension: file.templates.extension.trim_start_matches('.').to_string(),
            missing_template: file.templates.missing,
            url_field: content.url_field,
            fetch: FetchOptions {
                order_by: content.order_by,
            },
            css: file.css,
            asset_dirs: file.assets.dirs,
            markdown_dir: file.assets.markdown_dir,
            deadline: (file.build.timeout_secs > 0)
                .then(|| Duration::from_secs(file.build.timeout_secs)),
        };
        build.check_output_dir().context("Invalid site.output")?;

        let contentful = ContentfulConfig {
            space: env.string("CONTENTFUL_SPACE"),
            access_token: env.string("CONTENTFUL_ACCESSTOKEN"),
            environment: content.environment,
            host: if content.preview {
                ContentfulConfig::PREVIEW_HOST.to_string()
            } else {
                ContentfulConfig::DELIVERY_HOST.to_string()
            },
            page_size: content.page_size,
            timeout: Duration::from_secs(content.timeout_secs),
            include_depth: content.include_depth,
        };

        let dev = DevServerConfig {
            root: file.site.output,
            host: file.dev.host,
            port: file.dev.port,
            open: file.dev.open,
        };

        let defaults = PagesConfig::default();
        let pages = PagesConfig {
            remote: file.pages.remote.unwrap_or_default(),
            branch: file.pages.branch.unwrap_or(defaults.branch),
            author_name: file.pages.author_name.unwrap_or(defaults.author_name),
            author_email: file.pages.author_email.unwrap_or(defaults.author_email),
            message: file.pages.message.unwrap_or(defaults.message),
            workdir: defaults.workdir,
            token: env.optional("GIT_TOKEN"),
        };

        let s3 = S3Config {
            region: env.string("AWS_REGION"),
            bucket: env.string("AWS_BUCKET"),
            access_key_id: env.optional("AWS_ACCESS_KEY_ID"),
            secret_access_key: env.optional("AWS_SECRET_ACCESS_KEY"),
        };

        Ok(Self {
            build,
            contentful,
            dev,
            debounce: Duration::from_millis(file.dev.debounce_ms),
            pages,
            s3,
            s3_concurrency: file.s3.concurrency.max(1),
        })
    }

    /// Override the output directory for both the build and the dev server.
    pub fn set_output_dir(&mut self, output: PathBuf) {
        self.dev.root = output.clone();
        self.build.output_dir = output;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(toml: &str) -> ConfigFile {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn defaults_without_config_file() {
        let settings = Settings::resolve(ConfigFile::default(), &Env::default()).unwrap();

        assert_eq!(settings.build.src_dir, PathBuf::from("src"));
        assert_eq!(settings.build.output_dir, PathBuf::from("dist"));
        assert_eq!(settings.build.template_extension, "jinja");
        assert_eq!(settings.build.missing_template, MissingTemplate::Fail);
        assert_eq!(settings.build.deadline, Some(Duration::from_secs(600)));
        assert_eq!(settings.contentful.host, ContentfulConfig::DELIVERY_HOST);
        assert_eq!(settings.contentful.page_size, 100);
        assert_eq!(settings.dev.port, 8080);
        assert_eq!(settings.debounce, Duration::from_millis(200));
        assert_eq!(settings.pages.branch, "gh-pages");
        assert_eq!(settings.s3_concurrency, 8);
    }

    #[test]
    fn reads_every_section() {
        let file = parse(
            r#"
            [site]
            src = "site"
            output = "public"
            passthrough = ["CNAME", "robots.txt"]

            [content]
            order_by = "date"
            url_field = "slug"
            preview = true
            page_size = 500

            [templates]
            extension = ".html"
            missing = "skip"

            [css]
            minify = false
            targets = { chrome = 100 }

            [assets]
            dirs = ["img"]

            [build]
            timeout_secs = 0

            [dev]
            port = 3000
            debounce_ms = 50

            [pages]
            remote = "git@github.com:me/site.git"
            branch = "pages"

            [s3]
            concurrency = 2
            "#,
        );

        let settings = Settings::resolve(file, &Env::default()).unwrap();

        assert_eq!(settings.build.src_dir, PathBuf::from("site"));
        assert_eq!(settings.build.output_dir, PathBuf::from("public"));
        assert_eq!(settings.dev.root, PathBuf::from("public"));
        assert_eq!(settings.build.passthrough, vec!["CNAME", "robots.txt"]);
        assert_eq!(settings.build.fetch.order_by.as_deref(), Some("date"));
        assert_eq!(settings.build.url_field, "slug");
        assert_eq!(settings.build.template_extension, "html");
        assert_eq!(settings.build.missing_template, MissingTemplate::Skip);
        assert!(!settings.build.css.minify);
        assert_eq!(settings.build.css.targets.chrome, Some(100));
        assert_eq!(settings.build.css.targets.firefox, Some(88));
        assert_eq!(settings.build.asset_dirs, vec!["img"]);
        assert_eq!(settings.build.markdown_dir.as_deref(), Some("md"));
        assert_eq!(settings.build.deadline, None);
        assert_eq!(settings.contentful.host, ContentfulConfig::PREVIEW_HOST);
        assert_eq!(settings.contentful.page_size, 500);
        assert_eq!(settings.dev.port, 3000);
        assert_eq!(settings.debounce, Duration::from_millis(50));
        assert_eq!(settings.pages.remote, "git@github.com:me/site.git");
        assert_eq!(settings.pages.branch, "pages");
        assert_eq!(settings.pages.message, "Updates");
        assert_eq!(settings.s3_concurrency, 2);
    }

    #[test]
    fn takes_secrets_from_environment() {
        let env: Env = [
            ("CONTENTFUL_SPACE", "space-1"),
            ("CONTENTFUL_ACCESSTOKEN", "token-1"),
            ("AWS_REGION", "eu-west-1"),
            ("AWS_BUCKET", "site-bucket"),
            ("AWS_ACCESS_KEY_ID", ""),
            ("GIT_TOKEN", "ghp_x"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::resolve(ConfigFile::default(), &env).unwrap();

        assert_eq!(settings.contentful.space, "space-1");
        assert_eq!(settings.contentful.access_token, "token-1");
        assert_eq!(settings.s3.region, "eu-west-1");
        assert_eq!(settings.s3.bucket, "site-bucket");
        assert_eq!(settings.s3.access_key_id, None);
        assert_eq!(settings.pages.token.as_deref(), Some("ghp_x"));
    }

    #[test]
    fn rejects_out_of_range_page_size() {
        let file = parse("[content]\npage_size = 5000\n");
        assert!(Settings::resolve(file, &Env::default()).is_err());

        let file = parse("[content]\npage_size = 0\n");
        assert!(Settings::resolve(file, &Env::default()).is_err());
    }

    #[test]
    fn rejects_output_containing_the_project() {
        for output in [".", "src", "src/.."] {
            let file = parse(&format!("[site]\noutput = \"{output}\"\n"));
            assert!(
                Settings::resolve(file, &Env::default()).is_err(),
                "{output:?} should be rejected"
            );
        }

        let file = parse("[site]\noutput = \"public\"\n");
        assert!(Settings::resolve(file, &Env::default()).is_ok());
    }

    #[test]
    fn rejects_unknown_missing_template_policy() {
        let result: Result<ConfigFile, _> = toml::from_str("[templates]\nmissing = \"ignore\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = load_config(&temp.path().join("inkpress.toml")).unwrap();

        assert_eq!(config.site.output, PathBuf::from("dist"));
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("inkpress.toml");
        fs::write(&path, "[site\nsrc = ").unwrap();

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn output_override_moves_dev_root() {
        let mut settings = Settings::resolve(ConfigFile::default(), &Env::default()).unwrap();
        settings.set_output_dir(PathBuf::from("out"));

        assert_eq!(settings.build.output_dir, PathBuf::from("out"));
        assert_eq!(settings.dev.root, PathBuf::from("out"));
    }
}
