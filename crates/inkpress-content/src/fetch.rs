//! Aggregation of all entries into a [`ContentDocument`].

use std::cmp::Ordering;

use futures_util::future::try_join_all;
use std::collections::BTreeSet;

use serde_json::Value;

use crate::client::{ContentSource, ContentType};
use crate::document::{ContentDocument, Entry};
use crate::error::ContentError;

/// Options for [`fetch_all`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Field to sort entries by, newest first
    pub order_by: Option<String>,
}

/// Fetch every entry of every content type.
///
/// Content types are fetched concurrently. The first failure aborts the whole
/// fetch; no partial document is returned. Ordering applies only to types that
/// define the `order_by` field; other types keep the source's order.
pub async fn fetch_all<S: ContentSource>(
    source: &S,
    options: &FetchOptions,
) -> Result<ContentDocument, ContentError> {
    let content_types = source.content_types().await?;
    tracing::info!("Fetching entries for {} content types", content_types.len());

    let order_by = options.order_by.as_deref();
    let fetches = content_types.iter().map(|content_type| async move {
        let order_by = order_by.filter(|field| content_type.defines_field(field));
        let entries = source.entries(&content_type.id, order_by).await?;
        tracing::debug!("{}: {} entries", content_type.id, entries.len());
        Ok::<_, ContentError>((content_type.id.clone(), entries))
    });

    let mut document = ContentDocument::new();
    for (id, entries) in try_join_all(fetches).await? {
        document.insert(id, entries);
    }

    Ok(document)
}

/// A content source backed by an in-memory document.
///
/// Used to build from a saved snapshot instead of the live CMS.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    document: ContentDocument,
}

impl MemorySource {
    pub fn new(document: ContentDocument) -> Self {
        Self { document }
    }
}

impl ContentSource for MemorySource {
    async fn content_types(&self) -> Result<Vec<ContentType>, ContentError> {
        Ok(self
            .document
            .iter()
            .map(|(id, entries)| ContentType {
                id: id.to_string(),
                name: id.to_string(),
                fields: field_ids(entries),
            })
            .collect())
    }

    async fn entries(
        &self,
        content_type: &str,
        order_by: Option<&str>,
    ) -> Result<Vec<Entry>, ContentError> {
        let mut entries = self.document.get(content_type).unwrap_or_default().to_vec();
        if let Some(field) = order_by {
            entries.sort_by(|a, b| compare_desc(a.field(field), b.field(field)));
        }
        Ok(entries)
    }
}

/// Every field id used by at least one entry, sorted.
fn field_ids(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| entry.as_value().get("fields")?.as_object())
        .flat_map(|fields| fields.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Descending order with missing values last.
fn compare_desc(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a.and_then(Value::as_str), b.and_then(Value::as_str)) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    fn entry(url: &str, date: &str) -> Entry {
        Entry::new(json!({ "fields": { "url": url, "publishDate": date } }))
    }

    fn sample() -> ContentDocument {
        let mut doc = ContentDocument::new();
        doc.insert(
            "post",
            vec![
                entry("/a", "2020-01-01"),
                entry("/b", "2021-06-01"),
                entry("/c", "2019-03-01"),
            ],
        );
        doc.insert("page", vec![]);
        doc
    }

    struct FailingSource;

    impl ContentSource for FailingSource {
        async fn content_types(&self) -> Result<Vec<ContentType>, ContentError> {
            Ok(vec![
                ContentType {
                    id: "ok".to_string(),
                    name: "ok".to_string(),
                    fields: vec![],
                },
                ContentType {
                    id: "broken".to_string(),
                    name: "broken".to_string(),
                    fields: vec![],
                },
            ])
        }

        async fn entries(&self, content_type: &str, _: Option<&str>) -> Result<Vec<Entry>, ContentError> {
            if content_type == "broken" {
                return Err(ContentError::Status {
                    status: 500,
                    url: "entries".to_string(),
                    body: String::new(),
                });
            }
            Ok(vec![])
        }
    }

    /// Records the ordering requested for each content type.
    #[derive(Default)]
    struct OrderRecordingSource {
        requested: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ContentSource for OrderRecordingSource {
        async fn content_types(&self) -> Result<Vec<ContentType>, ContentError> {
            Ok(vec![
                ContentType {
                    id: "post".to_string(),
                    name: "Post".to_string(),
                    fields: vec!["url".to_string(), "publishDate".to_string()],
                },
                ContentType {
                    id: "page".to_string(),
                    name: "Page".to_string(),
                    fields: vec!["url".to_string()],
                },
            ])
        }

        async fn entries(
            &self,
            content_type: &str,
            order_by: Option<&str>,
        ) -> Result<Vec<Entry>, ContentError> {
            self.requested
                .lock()
                .unwrap()
                .push((content_type.to_string(), order_by.map(str::to_string)));
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn orders_only_types_defining_the_field() {
        let source = OrderRecordingSource::default();
        let options = FetchOptions {
            order_by: Some("publishDate".to_string()),
        };

        fetch_all(&source, &options).await.unwrap();

        let mut requested = source.requested.lock().unwrap().clone();
        requested.sort();
        assert_eq!(
            requested,
            vec![
                ("page".to_string(), None),
                ("post".to_string(), Some("publishDate".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn snapshot_types_list_their_fields() {
        let types = MemorySource::new(sample()).content_types().await.unwrap();

        let post = types.iter().find(|t| t.id == "post").unwrap();
        assert_eq!(post.fields, vec!["publishDate", "url"]);
        assert!(types.iter().find(|t| t.id == "page").unwrap().fields.is_empty());
    }

    #[tokio::test]
    async fn aggregates_every_content_type() {
        let source = MemorySource::new(sample());

        let doc = fetch_all(&source, &FetchOptions::default()).await.unwrap();

        assert_eq!(doc, sample());
        assert_eq!(doc.get("page").map(<[Entry]>::len), Some(0));
    }

    #[tokio::test]
    async fn orders_entries_newest_first() {
        let source = MemorySource::new(sample());
        let options = FetchOptions {
            order_by: Some("publishDate".to_string()),
        };

        let doc = fetch_all(&source, &options).await.unwrap();
        let urls: Vec<_> = doc
            .get("post")
            .unwrap()
            .iter()
            .filter_map(|e| e.url("url"))
            .collect();

        assert_eq!(urls, vec!["/b", "/a", "/c"]);
    }

    #[tokio::test]
    async fn any_failure_aborts_the_fetch() {
        let result = fetch_all(&FailingSource, &FetchOptions::default()).await;

        assert!(matches!(result, Err(ContentError::Status { status: 500, .. })));
    }
}
