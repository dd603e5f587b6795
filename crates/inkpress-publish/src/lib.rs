//! Publishers that ship a built output tree to its hosting destination.
//!
//! Two mutually exclusive targets are supported: an S3 bucket, where every
//! file becomes an object keyed by its relative path, and a static-pages
//! branch, where the tree is committed and pushed with git.

mod error;
pub mod pages;
pub mod s3;
pub mod store;

pub use error::PublishError;
pub use pages::{PagesConfig, PagesPublisher};
pub use s3::{S3Config, S3Store};
pub use store::{content_type_for, upload_tree, ObjectStore, UploadReport};
