//! Content source selection.

use std::path::Path;

use anyhow::{Context, Result};

use inkpress_content::{
    ContentDocument, ContentError, ContentSource, ContentType, ContentfulClient, Entry,
    MemorySource,
};

use crate::config::Settings;

/// Where a build gets its content from.
pub enum SiteSource {
    /// The live CMS
    Contentful(ContentfulClient),

    /// A previously saved intermediate document
    Snapshot(MemorySource),
}

impl SiteSource {
    /// Use the snapshot at `content_file` if given, the CMS otherwise.
    pub async fn open(settings: &Settings, content_file: Option<&Path>) -> Result<Self> {
        match content_file {
            Some(path) => {
                let document = ContentDocument::read(path)
                    .await
                    .with_context(|| format!("Failed to load content from {}", path.display()))?;
                tracing::info!(
                    "Using {} entries from {}",
                    document.entry_count(),
                    path.display()
                );
                Ok(Self::Snapshot(MemorySource::new(document)))
            }
            None => {
                let client = ContentfulClient::new(settings.contentful.clone())?;
                Ok(Self::Contentful(client))
            }
        }
    }
}

impl ContentSource for SiteSource {
    async fn content_types(&self) -> Result<Vec<ContentType>, ContentError> {
        match self {
            Self::Contentful(client) => client.content_types().await,
            Self::Snapshot(memory) => memory.content_types().await,
        }
    }

    async fn entries(
        &self,
        content_type: &str,
        order_by: Option<&str>,
    ) -> Result<Vec<Entry>, ContentError> {
        match self {
            Self::Contentful(client) => client.entries(content_type, order_by).await,
            Self::Snapshot(memory) => memory.entries(content_type, order_by).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, Env};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn settings() -> Settings {
        Settings::resolve(ConfigFile::default(), &Env::default()).unwrap()
    }

    #[tokio::test]
    async fn loads_snapshot_document() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("data.json");
        let mut document = ContentDocument::new();
        document.insert(
            "post",
            vec![Entry::new(json!({ "fields": { "url": "/a" } }))],
        );
        document.write(&path).await.unwrap();

        let source = SiteSource::open(&settings(), Some(&path)).await.unwrap();

        let types = source.content_types().await.unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].id, "post");
        assert_eq!(source.entries("post", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cms_requires_credentials() {
        let result = SiteSource::open(&settings(), None).await;
        assert!(result.is_err());
    }
}
