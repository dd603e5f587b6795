//! CLI subcommands.

pub mod build;
pub mod clean;
pub mod deploy;
pub mod dev;
pub mod release;
