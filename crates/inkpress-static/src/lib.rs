//! Static site build pipeline for inkpress.
//!
//! Turns CMS content, templates, stylesheets and static assets into a
//! deployable output tree by running a fixed sequence of stages.

pub mod assets;
pub mod builder;
pub mod markdown;
pub mod output;
pub mod stage;
pub mod templates;

pub use assets::{BrowserTargets, CssOptions, StylesheetCompiler, StylesheetFailure};
pub use builder::{BuildConfig, BuildError, BuildResult, StaticBuilder};
pub use stage::{BuildState, Stage};
pub use templates::{MissingTemplate, TemplateEngine, TemplateError, TemplateRegistry};
