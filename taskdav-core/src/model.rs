//! Domain types bridged to CalDAV.
//!
//! Projects become calendar collections, tasks become VTODO items. These
//! types are owned by the store; the bridge only projects them into
//! resources for a single request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated user a request acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
}

impl Principal {
    pub fn new(id: i64, username: &str) -> Self {
        Principal {
            id,
            username: username.to_string(),
        }
    }
}

/// A project exposed as a calendar collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// `None` until the items were loaded; `Some(vec![])` is a loaded, empty project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Item>>,
}

impl Collection {
    /// An unloaded reference carrying only the id taken from a request path.
    pub fn reference(id: i64) -> Self {
        Collection {
            id,
            ..Default::default()
        }
    }

    pub fn new(title: &str) -> Self {
        Collection {
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn items_loaded(&self) -> bool {
        self.items.is_some()
    }
}

/// A task exposed as a VTODO.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    /// Protocol-stable identifier, independent of `id`.
    pub uid: String,
    pub collection_id: i64,
    pub title: String,
    pub description: String,
    pub done: bool,
    pub done_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// 0 = unset, 1 (low) to 5 (do now)
    pub priority: u8,
    /// 0.0 to 1.0
    pub percent_done: f64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub labels: Vec<Label>,
    pub reminders: Vec<Reminder>,
}

impl Item {
    pub fn new(uid: &str, title: &str) -> Self {
        Item {
            uid: uid.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn label_titles(&self) -> Vec<&str> {
        self.labels.iter().map(|l| l.title.as_str()).collect()
    }
}

/// A named tag, unique by title within what a principal can see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub hex_color: String,
    pub created_by: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Label {
    /// A reference by title only, as found in a parsed document.
    pub fn titled(title: &str) -> Self {
        Label {
            title: title.to_string(),
            ..Default::default()
        }
    }
}

/// A reminder relative to the due date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Minutes before the due date; negative values fire after it
    pub minutes: i64,
}

/// Page selection for listing calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub per_page: usize,
}

impl Page {
    pub fn first(per_page: usize) -> Self {
        Page {
            number: 1,
            per_page,
        }
    }

    /// Number of entries to skip before this page starts.
    pub fn offset(&self) -> usize {
        self.number.saturating_sub(1) * self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_and_empty_collections_differ() {
        let unloaded = Collection::reference(4);
        let empty = Collection {
            items: Some(Vec::new()),
            ..Collection::reference(4)
        };

        assert!(!unloaded.items_loaded());
        assert!(empty.items_loaded());
        assert_ne!(unloaded, empty);

        let unloaded_json = serde_json::to_value(&unloaded).unwrap();
        let empty_json = serde_json::to_value(&empty).unwrap();
        assert!(unloaded_json.get("items").is_none());
        assert_eq!(empty_json["items"], serde_json::json!([]));

        let back: Collection = serde_json::from_value(empty_json).unwrap();
        assert_eq!(back, empty);
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::first(50).offset(), 0);
        assert_eq!(Page { number: 3, per_page: 20 }.offset(), 40);
        assert_eq!(Page { number: 0, per_page: 20 }.offset(), 0);
    }
}
