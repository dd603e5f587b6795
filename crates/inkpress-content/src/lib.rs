//! Content delivery for inkpress.
//!
//! Lists content types and entries from a headless CMS, resolves links between
//! entries, and aggregates everything into the intermediate document consumed
//! by the render stages.

pub mod client;
pub mod document;
mod error;
pub mod fetch;
pub mod links;

pub use client::{ContentSource, ContentType, ContentfulClient, ContentfulConfig};
pub use document::{ContentDocument, Entry};
pub use error::ContentError;
pub use fetch::{fetch_all, FetchOptions, MemorySource};
