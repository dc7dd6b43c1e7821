//! Reconciliation of document labels against stored labels.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::DavResult;
use crate::model::{Label, Principal};
use crate::store::Session;

/// Resolve `references` to stored labels and make them the task's label set.
///
/// Titles are looked up in one call, restricted to labels the principal can
/// see. Each missing title is created once, so repeated references share a
/// label. The returned vector is parallel to `references`. The task's label
/// associations are replaced, not merged.
///
/// Runs inside the caller's session: an error leaves it to the caller to drop
/// the session, which discards the task write as well.
pub async fn reconcile_labels<S>(
    session: &mut S,
    principal: &Principal,
    item_id: i64,
    references: &[Label],
) -> DavResult<Vec<Label>>
where
    S: Session,
{
    let mut titles: Vec<String> = Vec::new();
    for reference in references {
        if !titles.contains(&reference.title) {
            titles.push(reference.title.clone());
        }
    }

    let mut by_title: HashMap<String, Label> = HashMap::new();
    if !titles.is_empty() {
        for label in session.find_labels_by_title(&titles, principal).await? {
            by_title.entry(label.title.clone()).or_insert(label);
        }
    }

    let mut canonical = Vec::with_capacity(references.len());
    for reference in references {
        let label = match by_title.get(&reference.title) {
            Some(existing) => existing.clone(),
            None => {
                let created = session
                    .create_label(
                        Label {
                            id: 0,
                            created_by: principal.id,
                            ..reference.clone()
                        },
                        principal,
                    )
                    .await?;
                debug!(label = %created.title, id = created.id, "Created label");
                by_title.insert(created.title.clone(), created.clone());
                created
            }
        };
        canonical.push(label);
    }

    session
        .set_item_labels(item_id, &distinct(&canonical), principal)
        .await?;

    Ok(canonical)
}

/// Labels with duplicates (by id) removed, first occurrence kept.
pub fn distinct(labels: &[Label]) -> Vec<Label> {
    let mut seen = HashSet::new();
    labels
        .iter()
        .filter(|label| seen.insert(label.id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DavError;
    use crate::model::Item;
    use crate::store::{MemoryStore, Operation, Store};

    fn alice() -> Principal {
        Principal::new(1, "alice")
    }

    fn seeded(store: &MemoryStore, labels: Vec<Label>) -> Item {
        let project = store.add_collection(&alice(), "Inbox");
        let mut item = Item::new("task", "Task");
        item.collection_id = project.id;
        item.labels = labels;
        store.add_item(item)
    }

    #[tokio::test]
    async fn test_existing_labels_are_reused() {
        let store = MemoryStore::new();
        let work = store.add_label(&alice(), "work");
        let item = seeded(&store, vec![]);

        let mut session = store.begin().await.unwrap();
        let canonical = reconcile_labels(&mut session, &alice(), item.id, &[Label::titled("work")])
            .await
            .unwrap();
        session.commit().await.unwrap();

        assert_eq!(canonical, vec![work.clone()]);
        assert_eq!(store.labels().len(), 1);
        assert_eq!(store.item_by_uid("task").unwrap().labels, vec![work]);
    }

    #[tokio::test]
    async fn test_duplicate_titles_share_one_new_label() {
        let store = MemoryStore::new();
        let item = seeded(&store, vec![]);

        let mut session = store.begin().await.unwrap();
        let canonical = reconcile_labels(
            &mut session,
            &alice(),
            item.id,
            &[Label::titled("home"), Label::titled("home")],
        )
        .await
        .unwrap();
        session.commit().await.unwrap();

        assert_eq!(canonical.len(), 2);
        assert_eq!(canonical[0].id, canonical[1].id);
        assert_ne!(canonical[0].id, 0);
        assert_eq!(store.labels().len(), 1);
        assert_eq!(store.item_by_uid("task").unwrap().labels.len(), 1);
    }

    #[tokio::test]
    async fn test_labels_are_replaced_not_merged() {
        let store = MemoryStore::new();
        let old = store.add_label(&alice(), "old");
        let kept = store.add_label(&alice(), "kept");
        let item = seeded(&store, vec![old, kept.clone()]);

        let mut session = store.begin().await.unwrap();
        reconcile_labels(&mut session, &alice(), item.id, &[Label::titled("kept")])
            .await
            .unwrap();
        session.commit().await.unwrap();

        assert_eq!(store.item_by_uid("task").unwrap().labels, vec![kept]);
    }

    #[tokio::test]
    async fn test_invisible_label_is_not_reused() {
        let store = MemoryStore::new();
        let foreign = store.add_label(&Principal::new(2, "bob"), "secret");
        let item = seeded(&store, vec![]);

        let mut session = store.begin().await.unwrap();
        let canonical =
            reconcile_labels(&mut session, &alice(), item.id, &[Label::titled("secret")])
                .await
                .unwrap();

        assert_ne!(canonical[0].id, foreign.id);
        assert_eq!(canonical[0].created_by, alice().id);
    }

    #[tokio::test]
    async fn test_failed_creation_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let item = seeded(&store, vec![]);
        store.fail_next(Operation::CreateLabel);

        {
            let mut session = store.begin().await.unwrap();
            let result = reconcile_labels(
                &mut session,
                &alice(),
                item.id,
                &[Label::titled("a"), Label::titled("b")],
            )
            .await;
            assert!(matches!(result, Err(DavError::Store(_))));
        }

        assert!(store.labels().is_empty());
        assert!(store.item_by_uid("task").unwrap().labels.is_empty());
    }

    #[test]
    fn test_distinct_keeps_first_occurrence() {
        let a = Label {
            id: 1,
            ..Label::titled("a")
        };
        let b = Label {
            id: 2,
            ..Label::titled("b")
        };
        assert_eq!(distinct(&[a.clone(), b.clone(), a.clone()]), vec![a, b]);
    }
}
