//! CMS client.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Entry;
use crate::error::ContentError;
use crate::links::LinkIndex;

/// A category of structured content defined in the CMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    /// Identifier used as the intermediate document key
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Ids of the fields entries of this type may carry
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ContentType {
    /// Whether entries of this type define the field `name`.
    pub fn defines_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field == name)
    }
}

/// Source of content types and entries.
pub trait ContentSource: Send + Sync {
    /// List every content type known to the space.
    fn content_types(&self) -> impl Future<Output = Result<Vec<ContentType>, ContentError>> + Send;

    /// Fetch all entries of a content type.
    ///
    /// When `order_by` names a field, entries are sorted by it, newest first.
    /// The field must be one the type defines.
    fn entries(
        &self,
        content_type: &str,
        order_by: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Entry>, ContentError>> + Send;
}

/// Connection settings for the Contentful delivery API.
#[derive(Debug, Clone)]
pub struct ContentfulConfig {
    /// Space identifier
    pub space: String,

    /// Delivery (or preview) access token
    pub access_token: String,

    /// Environment within the space
    pub environment: String,

    /// API base URL
    pub host: String,

    /// Entries requested per page
    pub page_size: u32,

    /// Per-request timeout
    pub timeout: Duration,

    /// How many levels of linked entries to inline
    pub include_depth: usize,
}

impl ContentfulConfig {
    pub const DELIVERY_HOST: &'static str = "https://cdn.contentful.com";
    pub const PREVIEW_HOST: &'static str = "https://preview.contentful.com";
    pub const MAX_PAGE_SIZE: u32 = 1000;
    /// Deepest `include` level the delivery API accepts
    pub const MAX_INCLUDE_DEPTH: usize = 10;
}

impl Default for ContentfulConfig {
    fn default() -> Self {
        Self {
            space: String::new(),
            access_token: String::new(),
            environment: "master".to_string(),
            host: Self::DELIVERY_HOST.to_string(),
            page_size: 100,
            timeout: Duration::from_secs(30),
            include_depth: 4,
        }
    }
}

/// HTTP client for the Contentful Content Delivery API.
pub struct ContentfulClient {
    config: ContentfulConfig,
    http: reqwest::Client,
}

/// One page of a collection response.
#[derive(Debug, Deserialize)]
struct Collection {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(rename = "Entry", default)]
    entries: Vec<Value>,
    #[serde(rename = "Asset", default)]
    assets: Vec<Value>,
}

impl ContentfulClient {
    /// Create a client. Fails if the space or token is missing.
    pub fn new(config: ContentfulConfig) -> Result<Self, ContentError> {
        if config.space.is_empty() {
            return Err(ContentError::MissingSetting("CONTENTFUL_SPACE"));
        }
        if config.access_token.is_empty() {
            return Err(ContentError::MissingSetting("CONTENTFUL_ACCESSTOKEN"));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("inkpress/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ContentError::Request {
                url: config.host.clone(),
                source,
            })?;

        Ok(Self { config, http })
    }

    fn endpoint(&self, resource: &str) -> String {
        format!(
            "{}/spaces/{}/environments/{}/{}",
            self.config.host.trim_end_matches('/'),
            self.config.space,
            self.config.environment,
            resource
        )
    }

    async fn get_collection(
        &self,
        resource: &str,
        query: &[(&str, String)],
    ) -> Result<Collection, ContentError> {
        let url = self.endpoint(resource);
        tracing::debug!("GET {} {:?}", url, query);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .query(query)
            .send()
            .await
            .map_err(|source| ContentError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContentError::Status {
                status: status.as_u16(),
                url,
                body,
            });
        }

        response
            .json::<Collection>()
            .await
            .map_err(|source| ContentError::Request { url, source })
    }

    fn page_size(&self) -> u32 {
        self.config.page_size.clamp(1, ContentfulConfig::MAX_PAGE_SIZE)
    }
}

impl ContentSource for ContentfulClient {
    async fn content_types(&self) -> Result<Vec<ContentType>, ContentError> {
        let query = [("limit", ContentfulConfig::MAX_PAGE_SIZE.to_string())];
        let collection = self.get_collection("content_types", &query).await?;

        collection
            .items
            .iter()
            .map(|item| {
                parse_content_type(item).ok_or_else(|| ContentError::Payload {
                    url: self.endpoint("content_types"),
                    message: format!("content type without sys.id: {item}"),
                })
            })
            .collect()
    }

    async fn entries(
        &self,
        content_type: &str,
        order_by: Option<&str>,
    ) -> Result<Vec<Entry>, ContentError> {
        let limit = self.page_size();
        let mut entries = Vec::new();
        let mut skip = 0u64;

        loop {
            let query = entries_query(
                content_type,
                order_by,
                limit,
                skip,
                self.config.include_depth,
            );
            let page = self.get_collection("entries", &query).await?;
            let fetched = page.items.len() as u64;

            let index = LinkIndex::new(&page.items, &page.includes.entries, &page.includes.assets);
            entries.extend(
                page.items
                    .iter()
                    .map(|item| Entry::new(index.resolve_item(item, self.config.include_depth))),
            );

            skip += fetched;
            if fetched == 0 || skip >= page.total {
                break;
            }
        }

        tracing::debug!("Fetched {} {} entries", entries.len(), content_type);
        Ok(entries)
    }
}

fn parse_content_type(item: &Value) -> Option<ContentType> {
    let id = item.pointer("/sys/id").and_then(Value::as_str)?;
    let name = item
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(id)
        .to_string();
    let fields = item
        .get("fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|field| field.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(ContentType {
        id: id.to_string(),
        name,
        fields,
    })
}

/// Query parameters for one page of entries.
fn entries_query(
    content_type: &str,
    order_by: Option<&str>,
    limit: u32,
    skip: u64,
    include_depth: usize,
) -> Vec<(&'static str, String)> {
    let include = include_depth.min(ContentfulConfig::MAX_INCLUDE_DEPTH);
    let mut query = vec![
        ("content_type", content_type.to_string()),
        ("limit", limit.to_string()),
        ("skip", skip.to_string()),
        ("include", include.to_string()),
    ];
    if let Some(field) = order_by {
        query.push(("order", format!("-fields.{field}")));
    }
    query
}
