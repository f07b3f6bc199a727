//! Page types - the nested upstream shape and its normalized rows
//!
//! One upstream page decodes into a [`PageBody`]:
//! - `meta.pagination` becomes one [`Envelope`] row in `posts`
//! - every entry of `data` becomes one [`Item`] row in `items`
//!
//! Reconstruction goes the other way and produces the same [`PageBody`]
//! shape, so a record served back to clients is byte-compatible with what
//! the upstream returned.

use serde::{Deserialize, Deserializer, Serialize};

/// Reconstructed record served to clients; identical to the upstream shape.
pub type PageRecord = PageBody;

/// Navigation links of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Links {
    #[serde(deserialize_with = "null_as_empty")]
    pub previous: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub current: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub next: String,
}

/// Pagination metadata, copied verbatim from the upstream page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub total: i64,
    pub pages: i64,
    pub page: i64,
    pub limit: i64,
    pub links: Links,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub pagination: Pagination,
}

/// One child entry of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageItem {
    pub id: i64,
    pub user_id: i64,
    #[serde(deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub body: String,
}

/// A full page: pagination envelope plus its items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageBody {
    pub meta: Meta,
    #[serde(deserialize_with = "null_as_empty_vec")]
    pub data: Vec<PageItem>,
}

impl PageBody {
    /// Decode a raw upstream response body.
    pub fn decode(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Split into normalized rows stored under `envelope_id`.
    pub fn into_rows(self, envelope_id: i64) -> (Envelope, Vec<Item>) {
        let p = self.meta.pagination;
        let envelope = Envelope {
            id: envelope_id,
            total: p.total,
            page_count: p.pages,
            page: p.page,
            limit: p.limit,
            previous_link: p.links.previous,
            current_link: p.links.current,
            next_link: p.links.next,
        };
        let items = self
            .data
            .into_iter()
            .map(|d| Item {
                envelope_id,
                item_id: d.id,
                owner_id: d.user_id,
                title: d.title,
                body: d.body,
            })
            .collect();
        (envelope, items)
    }

    pub fn from_envelope(envelope: Envelope) -> Self {
        Self {
            meta: Meta {
                pagination: Pagination {
                    total: envelope.total,
                    pages: envelope.page_count,
                    page: envelope.page,
                    limit: envelope.limit,
                    links: Links {
                        previous: envelope.previous_link,
                        current: envelope.current_link,
                        next: envelope.next_link,
                    },
                },
            },
            data: Vec::new(),
        }
    }

    pub fn push_item(&mut self, item: Item) {
        self.data.push(PageItem {
            id: item.item_id,
            user_id: item.owner_id,
            title: item.title,
            body: item.body,
        });
    }
}

/// Row in `posts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Upstream page number this envelope was ingested as
    pub id: i64,
    pub total: i64,
    pub page_count: i64,
    pub page: i64,
    pub limit: i64,
    pub previous_link: String,
    pub current_link: String,
    pub next_link: String,
}

/// Row in `items`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub envelope_id: i64,
    pub item_id: i64,
    pub owner_id: i64,
    pub title: String,
    pub body: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_empty_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<PageItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<PageItem>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_ONE: &str = r#"{
        "meta": {"pagination": {"total": 100, "pages": 2, "page": 1, "limit": 50,
            "links": {"previous": null, "current": "p1", "next": "p2"}}},
        "data": [{"id": 1, "user_id": 9, "title": "a", "body": "b"}]
    }"#;

    #[test]
    fn test_decode_upstream_page() {
        let body = PageBody::decode(PAGE_ONE).unwrap();
        assert_eq!(body.meta.pagination.total, 100);
        assert_eq!(body.meta.pagination.links.previous, "");
        assert_eq!(body.meta.pagination.links.next, "p2");
        assert_eq!(body.data.len(), 1);
        assert_eq!(body.data[0].user_id, 9);
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(PageBody::decode("<html>rate limited</html>").is_err());
        assert!(PageBody::decode("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_missing_fields_default() {
        let body = PageBody::decode(r#"{"data": null}"#).unwrap();
        assert_eq!(body, PageBody::default());
    }

    #[test]
    fn test_rows_use_given_envelope_id() {
        let body = PageBody::decode(PAGE_ONE).unwrap();
        let (envelope, items) = body.into_rows(7);
        assert_eq!(envelope.id, 7);
        assert_eq!(envelope.page, 1);
        assert_eq!(envelope.current_link, "p1");
        assert_eq!(items[0].envelope_id, 7);
        assert_eq!(items[0].item_id, 1);
    }

    #[test]
    fn test_rebuild_matches_decoded() {
        let decoded = PageBody::decode(PAGE_ONE).unwrap();
        let (envelope, items) = decoded.clone().into_rows(1);

        let mut rebuilt = PageBody::from_envelope(envelope);
        for item in items {
            rebuilt.push_item(item);
        }
        assert_eq!(rebuilt, decoded);

        let json = serde_json::to_value(&rebuilt).unwrap();
        assert_eq!(json["meta"]["pagination"]["links"]["current"], "p1");
        assert_eq!(json["data"][0]["user_id"], 9);
    }
}
