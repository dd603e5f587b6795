//! Build stages and the driver state.

use std::fmt;

/// One step of the build, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Remove the output tree
    Clean,
    /// Recreate output directories and copy passthrough files
    Scaffold,
    /// Download all entries into the intermediate document
    FetchContent,
    /// Render one file per entry through its content-type template
    RenderContent,
    /// Render every page template against the whole document
    RenderPages,
    /// Bundle and transpile entry stylesheets
    CompileStyles,
    /// Copy images, scripts and markdown
    CopyAssets,
    /// Delete the intermediate document
    Cleanup,
}

impl Stage {
    /// Every stage in the order the builder runs them.
    pub const ALL: [Stage; 8] = [
        Stage::Clean,
        Stage::Scaffold,
        Stage::FetchContent,
        Stage::RenderContent,
        Stage::RenderPages,
        Stage::CompileStyles,
        Stage::CopyAssets,
        Stage::Cleanup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Clean => "clean",
            Stage::Scaffold => "scaffold",
            Stage::FetchContent => "fetch-content",
            Stage::RenderContent => "render-content",
            Stage::RenderPages => "render-pages",
            Stage::CompileStyles => "compile-styles",
            Stage::CopyAssets => "copy-assets",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a builder is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildState {
    #[default]
    Idle,
    Running(Stage),
    Done,
    Failed(Stage),
}
