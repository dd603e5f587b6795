//! Resolution of `Link` references between CMS entries and assets.
//!
//! Entry fields reference other entries and assets by `{"sys": {"type": "Link",
//! "linkType": "Entry", "id": "..."}}` objects. The delivery API ships the
//! referenced items alongside each page in `includes`; this module inlines them
//! so templates can walk `data.fields.author.fields.name` directly.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Lookup table of linkable items from one response page.
#[derive(Debug, Default)]
pub struct LinkIndex {
    entries: HashMap<String, Value>,
    assets: HashMap<String, Value>,
}

impl LinkIndex {
    /// Index the page's own items plus its included entries and assets.
    pub fn new(items: &[Value], included_entries: &[Value], included_assets: &[Value]) -> Self {
        let mut index = Self::default();
        for item in items.iter().chain(included_entries) {
            if let Some(id) = sys_id(item) {
                index.entries.insert(id.to_string(), item.clone());
            }
        }
        for asset in included_assets {
            if let Some(id) = sys_id(asset) {
                index.assets.insert(id.to_string(), asset.clone());
            }
        }
        index
    }

    /// Return a copy of `item` with links in its `fields` replaced by their
    /// targets, following at most `depth` levels of references.
    pub fn resolve_item(&self, item: &Value, depth: usize) -> Value {
        let Some(object) = item.as_object() else {
            return item.clone();
        };

        let mut resolved = object.clone();
        if let Some(fields) = object.get("fields") {
            resolved.insert("fields".to_string(), self.resolve_value(fields, depth));
        }
        Value::Object(resolved)
    }

    fn resolve_value(&self, value: &Value, depth: usize) -> Value {
        if let Some((kind, id)) = link_target(value) {
            if depth == 0 {
                return value.clone();
            }
            let target = match kind {
                "Entry" => self.entries.get(id),
                "Asset" => self.assets.get(id),
                _ => None,
            };
            return match target {
                Some(target) => self.resolve_item(target, depth - 1),
                None => value.clone(),
            };
        }

        match value {
            Value::Array(values) => Value::Array(
                values
                    .iter()
                    .map(|v| self.resolve_value(v, depth))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v, depth)))
                    .collect::<Map<_, _>>(),
            ),
            _ => value.clone(),
        }
    }
}

fn sys_id(value: &Value) -> Option<&str> {
    value.pointer("/sys/id").and_then(Value::as_str)
}

/// `(linkType, id)` if `value` is a link object.
fn link_target(value: &Value) -> Option<(&str, &str)> {
    let sys = value.get("sys")?;
    if sys.get("type").and_then(Value::as_str) != Some("Link") {
        return None;
    }
    let kind = sys.get("linkType").and_then(Value::as_str)?;
    let id = sys.get("id").and_then(Value::as_str)?;
    Some((kind, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn link(kind: &str, id: &str) -> Value {
        json!({ "sys": { "type": "Link", "linkType": kind, "id": id } })
    }

    #[test]
    fn inlines_included_entries_and_assets() {
        let post = json!({
            "sys": { "id": "p1", "type": "Entry" },
            "fields": {
                "title": "Hello",
                "author": link("Entry", "a1"),
                "images": [link("Asset", "img1")]
            }
        });
        let author = json!({
            "sys": { "id": "a1", "type": "Entry" },
            "fields": { "name": "Ada" }
        });
        let image = json!({
            "sys": { "id": "img1", "type": "Asset" },
            "fields": { "file": { "url": "//cdn/img.png" } }
        });

        let index = LinkIndex::new(&[post.clone()], &[author], &[image]);
        let resolved = index.resolve_item(&post, 4);

        assert_eq!(resolved["fields"]["author"]["fields"]["name"], json!("Ada"));
        assert_eq!(
            resolved["fields"]["images"][0]["fields"]["file"]["url"],
            json!("//cdn/img.png")
        );
        assert_eq!(resolved["fields"]["title"], json!("Hello"));
    }

    #[test]
    fn leaves_unknown_links_untouched() {
        let post = json!({ "sys": { "id": "p1" }, "fields": { "author": link("Entry", "missing") } });

        let index = LinkIndex::new(&[post.clone()], &[], &[]);
        let resolved = index.resolve_item(&post, 4);

        assert_eq!(resolved["fields"]["author"], link("Entry", "missing"));
    }

    #[test]
    fn does_not_touch_sys_links() {
        let post = json!({
            "sys": { "id": "p1", "contentType": link("ContentType", "post") },
            "fields": {}
        });

        let index = LinkIndex::new(&[post.clone()], &[], &[]);

        assert_eq!(index.resolve_item(&post, 4), post);
    }

    #[test]
    fn stops_at_depth_on_cycles() {
        let a = json!({ "sys": { "id": "a" }, "fields": { "next": link("Entry", "b") } });
        let b = json!({ "sys": { "id": "b" }, "fields": { "next": link("Entry", "a") } });

        let index = LinkIndex::new(&[a.clone(), b], &[], &[]);
        let resolved = index.resolve_item(&a, 2);

        assert_eq!(resolved["fields"]["next"]["sys"]["id"], json!("b"));
        assert_eq!(resolved["fields"]["next"]["fields"]["next"]["sys"]["id"], json!("a"));
        assert_eq!(
            resolved["fields"]["next"]["fields"]["next"]["fields"]["next"],
            link("Entry", "b")
        );
    }
}
