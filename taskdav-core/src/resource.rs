//! Request-scoped resources handed to the transport.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ics::{CONTENT_TYPE, Codec};
use crate::model::{Collection, Item};

/// What a resource projects. Exactly one of these per resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    /// The principal / calendar home link; carries no data.
    Principal,
    Collection(Collection),
    Item(Item),
}

#[derive(Clone)]
pub struct Resource {
    href: String,
    name: Option<String>,
    subject: Subject,
    is_collection: bool,
    codec: Arc<dyn Codec>,
}

impl Resource {
    pub fn for_principal(href: impl Into<String>, codec: Arc<dyn Codec>) -> Self {
        Resource {
            href: href.into(),
            name: None,
            subject: Subject::Principal,
            is_collection: true,
            codec,
        }
    }

    pub fn for_collection(
        href: impl Into<String>,
        collection: Collection,
        is_collection: bool,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Resource {
            href: href.into(),
            name: None,
            subject: Subject::Collection(collection),
            is_collection,
            codec,
        }
    }

    pub fn for_item(href: impl Into<String>, item: Item, codec: Arc<dyn Codec>) -> Self {
        Resource {
            href: href.into(),
            name: None,
            subject: Subject::Item(item),
            is_collection: false,
            codec,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn as_item(&self) -> Option<&Item> {
        match &self.subject {
            Subject::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match &self.subject {
            Subject::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.is_collection
    }

    pub fn is_principal(&self) -> bool {
        matches!(self.subject, Subject::Principal)
    }

    /// `"<id>-<unix updated>"` of the task or project; empty for the principal.
    pub fn etag(&self) -> String {
        match &self.subject {
            Subject::Item(item) => format_etag(item.id, &item.updated),
            Subject::Collection(collection) => format_etag(collection.id, &collection.updated),
            Subject::Principal => String::new(),
        }
    }

    /// A loaded project renders all its tasks; a task renders itself.
    pub fn content(&self) -> String {
        match &self.subject {
            Subject::Collection(collection) => match &collection.items {
                Some(items) => self.codec.render_document(Some(collection), items),
                None => String::new(),
            },
            Subject::Item(item) => self
                .codec
                .render_document(None, std::slice::from_ref(item)),
            Subject::Principal => String::new(),
        }
    }

    /// Byte length of the rendered content.
    pub fn content_length(&self) -> u64 {
        self.content().len() as u64
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match &self.subject {
            Subject::Item(_) => Some(CONTENT_TYPE),
            Subject::Collection(collection) if collection.items_loaded() => Some(CONTENT_TYPE),
            _ => None,
        }
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        match &self.subject {
            Subject::Item(item) => item.updated,
            Subject::Collection(collection) => collection.updated,
            Subject::Principal => DateTime::<Utc>::default(),
        }
    }
}

fn format_etag(id: i64, updated: &DateTime<Utc>) -> String {
    format!("\"{}-{}\"", id, updated.timestamp())
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("href", &self.href)
            .field("name", &self.name)
            .field("subject", &self.subject)
            .field("is_collection", &self.is_collection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::{IcsCodec, parse_todo};
    use chrono::TimeZone;

    fn codec() -> Arc<dyn Codec> {
        Arc::new(IcsCodec::default())
    }

    fn item(id: i64, uid: &str) -> Item {
        let mut item = Item::new(uid, "Task");
        item.id = id;
        item.collection_id = 1;
        item.updated = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        item
    }

    #[test]
    fn test_etag_of_item_and_collection() {
        let task = Resource::for_item("/t", item(42, "a"), codec());
        assert_eq!(task.etag(), "\"42-1714564800\"");

        let mut project = Collection::reference(7);
        project.updated = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let project = Resource::for_collection("/p", project, true, codec());
        assert_eq!(project.etag(), "\"7-1700000000\"");

        assert_eq!(Resource::for_principal("/dav/", codec()).etag(), "");
    }

    #[test]
    fn test_etag_changes_with_modification_time_only() {
        let before = item(3, "a");
        let mut renamed = before.clone();
        renamed.title = "Renamed".into();
        let mut touched = before.clone();
        touched.updated = touched.updated + chrono::Duration::seconds(1);

        let etag = |i: &Item| Resource::for_item("/t", i.clone(), codec()).etag();
        assert_eq!(etag(&before), etag(&renamed));
        assert_ne!(etag(&before), etag(&touched));
    }

    #[test]
    fn test_loaded_collection_content_has_every_item() {
        let mut project = Collection::reference(1);
        project.title = "Chores".into();
        project.items = Some(vec![item(1, "first"), item(2, "second")]);

        let resource = Resource::for_collection("/p", project, true, codec());
        let content = resource.content();

        assert!(content.contains("X-WR-CALNAME:Chores"));
        assert!(content.contains("UID:first"));
        assert!(content.contains("UID:second"));
        assert_eq!(resource.content_type(), Some(CONTENT_TYPE));
    }

    #[test]
    fn test_unloaded_and_principal_content_is_empty() {
        let unloaded = Resource::for_collection("/p", Collection::reference(1), true, codec());
        assert_eq!(unloaded.content(), "");
        assert_eq!(unloaded.content_length(), 0);
        assert_eq!(unloaded.content_type(), None);

        let principal = Resource::for_principal("/dav/", codec());
        assert!(principal.is_principal());
        assert!(principal.is_collection());
        assert_eq!(principal.content(), "");
        assert_eq!(principal.modified_at().timestamp(), 0);
    }

    #[test]
    fn test_item_content_parses_back() {
        let resource = Resource::for_item("/t", item(5, "round"), codec());
        assert!(!resource.is_collection());

        let parsed = parse_todo(&resource.content()).unwrap();
        assert_eq!(parsed.uid, "round");
    }

    #[test]
    fn test_content_length_counts_bytes() {
        let mut task = item(9, "utf8");
        task.title = "Café ☕".into();
        let resource = Resource::for_item("/t", task, codec());

        assert_eq!(resource.content_length(), resource.content().len() as u64);
        assert!(resource.content_length() > resource.content().chars().count() as u64);
    }
}
