//! In-memory store.
//!
//! Sessions work on a snapshot of the shared state and record a journal of
//! their writes. `commit` replays the journal onto the shared state, so
//! concurrent sessions resolve as last-write-wins. Dropping a session
//! without committing throws the journal away.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::model::{Collection, Item, Label, Page, Principal};
use crate::store::{Rights, Session, Store};

/// Share level granted on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Right {
    Read,
    Write,
    Admin,
}

/// Store calls that can be made to fail once with [`MemoryStore::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Begin,
    CheckRights,
    FindCollections,
    LoadCollection,
    FindItems,
    FindItemsByUid,
    CreateItem,
    UpdateItem,
    DeleteItem,
    FindLabels,
    CreateLabel,
    SetItemLabels,
    Commit,
}

#[derive(Debug, Clone)]
struct StoredCollection {
    collection: Collection,
    owner_id: i64,
}

#[derive(Debug, Clone, Default)]
struct State {
    collections: BTreeMap<i64, StoredCollection>,
    items: BTreeMap<i64, Item>,
    labels: BTreeMap<i64, Label>,
    grants: HashMap<(i64, i64), Right>,
}

impl State {
    fn right_on(&self, principal: &Principal, collection_id: i64) -> Option<Right> {
        let stored = self.collections.get(&collection_id)?;
        if stored.owner_id == principal.id {
            return Some(Right::Admin);
        }
        self.grants.get(&(principal.id, collection_id)).copied()
    }

    fn can_read(&self, principal: &Principal, collection_id: i64) -> bool {
        self.right_on(principal, collection_id).is_some()
    }

    fn can_write(&self, principal: &Principal, collection_id: i64) -> bool {
        self.right_on(principal, collection_id)
            .is_some_and(|right| right >= Right::Write)
    }

    fn label_visible(&self, label: &Label, principal: &Principal) -> bool {
        label.created_by == principal.id
            || self.items.values().any(|item| {
                self.can_read(principal, item.collection_id)
                    && item.labels.iter().any(|l| l.id == label.id)
            })
    }

    fn apply(&mut self, change: Change) {
        match change {
            Change::PutCollection(collection) => {
                if let Some(stored) = self.collections.get_mut(&collection.id) {
                    stored.collection = collection;
                }
            }
            Change::PutItem(item) => {
                self.items.insert(item.id, item);
            }
            Change::RemoveItem(id) => {
                self.items.remove(&id);
            }
            Change::PutLabel(label) => {
                self.labels.insert(label.id, label);
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Change {
    PutCollection(Collection),
    PutItem(Item),
    RemoveItem(i64),
    PutLabel(Label),
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    next_id: AtomicI64,
    queries: AtomicUsize,
    failures: Mutex<HashSet<Operation>>,
}

impl Shared {
    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Count the call and fire an injected failure if one is armed.
    fn enter(&self, op: Operation) -> StoreResult<()> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failures.lock().remove(&op) {
            return Err(StoreError::Backend(format!("injected failure in {:?}", op)));
        }
        Ok(())
    }
}

/// Cloneable handle to one in-memory dataset.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collection(&self, owner: &Principal, title: &str) -> Collection {
        let now = now();
        let collection = Collection {
            id: self.shared.next_id(),
            created: now,
            updated: now,
            ..Collection::new(title)
        };
        self.shared.state.lock().collections.insert(
            collection.id,
            StoredCollection {
                collection: collection.clone(),
                owner_id: owner.id,
            },
        );
        collection
    }

    pub fn grant(&self, principal: &Principal, collection_id: i64, right: Right) {
        self.shared
            .state
            .lock()
            .grants
            .insert((principal.id, collection_id), right);
    }

    /// Insert a task as-is apart from id, UID and timestamps when unset.
    pub fn add_item(&self, mut item: Item) -> Item {
        item.id = self.shared.next_id();
        if item.uid.is_empty() {
            item.uid = new_uid();
        }
        if item.updated.timestamp() <= 0 {
            item.updated = now();
        }
        if item.created.timestamp() <= 0 {
            item.created = item.updated;
        }
        self.shared.state.lock().items.insert(item.id, item.clone());
        item
    }

    /// Overwrite a stored task exactly as given, timestamps included.
    pub fn put_item(&self, item: Item) {
        self.shared.state.lock().items.insert(item.id, item);
    }

    pub fn add_label(&self, owner: &Principal, title: &str) -> Label {
        let now = now();
        let label = Label {
            id: self.shared.next_id(),
            created_by: owner.id,
            created: now,
            updated: now,
            ..Label::titled(title)
        };
        self.shared.state.lock().labels.insert(label.id, label.clone());
        label
    }

    /// Committed state of a task, bypassing rights and the query counter.
    pub fn item_by_uid(&self, uid: &str) -> Option<Item> {
        self.shared
            .state
            .lock()
            .items
            .values()
            .find(|item| item.uid == uid)
            .cloned()
    }

    pub fn item_count(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.shared.state.lock().labels.values().cloned().collect()
    }

    pub fn collection(&self, collection_id: i64) -> Option<Collection> {
        self.shared
            .state
            .lock()
            .collections
            .get(&collection_id)
            .map(|stored| stored.collection.clone())
    }

    /// Number of store calls made through sessions so far.
    pub fn queries(&self) -> usize {
        self.shared.queries.load(Ordering::SeqCst)
    }

    /// Make the next call of `op` fail with a backend error.
    pub fn fail_next(&self, op: Operation) {
        self.shared.failures.lock().insert(op);
    }

    fn snapshot(&self) -> State {
        self.shared.state.lock().clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Session = MemorySession;

    async fn begin(&self) -> StoreResult<MemorySession> {
        self.shared.enter(Operation::Begin)?;
        Ok(MemorySession {
            shared: Arc::clone(&self.shared),
            working: self.snapshot(),
            journal: Vec::new(),
            committed: false,
        })
    }
}

pub struct MemorySession {
    shared: Arc<Shared>,
    working: State,
    journal: Vec<Change>,
    committed: bool,
}

impl MemorySession {
    fn record(&mut self, change: Change) {
        self.working.apply(change.clone());
        self.journal.push(change);
    }

    fn existing_item(&self, id: i64) -> StoreResult<&Item> {
        self.working
            .items
            .get(&id)
            .ok_or_else(|| StoreError::ItemNotFound(id.to_string()))
    }

    /// Bump a project's modification time after one of its tasks changed.
    fn touch_collection(&mut self, collection_id: i64) {
        if let Some(stored) = self.working.collections.get(&collection_id) {
            let mut collection = stored.collection.clone();
            collection.updated = next_updated(collection.updated);
            self.record(Change::PutCollection(collection));
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.committed && !self.journal.is_empty() {
            debug!(
                changes = self.journal.len(),
                "Rolling back uncommitted session"
            );
        }
    }
}

#[async_trait]
impl Rights for MemorySession {
    async fn can_read_collection(
        &mut self,
        collection_id: i64,
        principal: &Principal,
    ) -> StoreResult<bool> {
        self.shared.enter(Operation::CheckRights)?;
        if !self.working.collections.contains_key(&collection_id) {
            return Err(StoreError::CollectionNotFound(collection_id));
        }
        Ok(self.working.can_read(principal, collection_id))
    }

    async fn can_create_item(&mut self, item: &Item, principal: &Principal) -> StoreResult<bool> {
        self.shared.enter(Operation::CheckRights)?;
        if !self.working.collections.contains_key(&item.collection_id) {
            return Err(StoreError::CollectionNotFound(item.collection_id));
        }
        Ok(self.working.can_write(principal, item.collection_id))
    }

    async fn can_update_item(&mut self, item: &Item, principal: &Principal) -> StoreResult<bool> {
        self.shared.enter(Operation::CheckRights)?;
        let current = self.existing_item(item.id)?.collection_id;
        let moved_to = match item.collection_id {
            0 => current,
            id => id,
        };
        Ok(self.working.can_write(principal, current) && self.working.can_write(principal, moved_to))
    }

    async fn can_delete_item(&mut self, item: &Item, principal: &Principal) -> StoreResult<bool> {
        self.shared.enter(Operation::CheckRights)?;
        let current = self.existing_item(item.id)?.collection_id;
        Ok(self.working.can_write(principal, current))
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn find_collections(
        &mut self,
        principal: &Principal,
        page: Page,
    ) -> StoreResult<Vec<Collection>> {
        self.shared.enter(Operation::FindCollections)?;
        Ok(self
            .working
            .collections
            .values()
            .filter(|stored| self.working.can_read(principal, stored.collection.id))
            .skip(page.offset())
            .take(page.per_page)
            .map(|stored| stored.collection.clone())
            .collect())
    }

    async fn load_collection(&mut self, collection_id: i64) -> StoreResult<Collection> {
        self.shared.enter(Operation::LoadCollection)?;
        self.working
            .collections
            .get(&collection_id)
            .map(|stored| stored.collection.clone())
            .ok_or(StoreError::CollectionNotFound(collection_id))
    }

    async fn find_items(
        &mut self,
        collection_id: i64,
        principal: &Principal,
        page: Page,
    ) -> StoreResult<Vec<Item>> {
        self.shared.enter(Operation::FindItems)?;
        if !self.working.can_read(principal, collection_id) {
            return Ok(Vec::new());
        }
        Ok(self
            .working
            .items
            .values()
            .filter(|item| item.collection_id == collection_id)
            .skip(page.offset())
            .take(page.per_page)
            .cloned()
            .collect())
    }

    async fn find_items_by_uid(
        &mut self,
        uids: &[String],
        principal: &Principal,
    ) -> StoreResult<Vec<Item>> {
        self.shared.enter(Operation::FindItemsByUid)?;
        let wanted: HashSet<&str> = uids.iter().map(String::as_str).collect();
        Ok(self
            .working
            .items
            .values()
            .filter(|item| wanted.contains(item.uid.as_str()))
            .filter(|item| self.working.can_read(principal, item.collection_id))
            .cloned()
            .collect())
    }

    async fn create_item(&mut self, mut item: Item, _principal: &Principal) -> StoreResult<Item> {
        self.shared.enter(Operation::CreateItem)?;
        if !self.working.collections.contains_key(&item.collection_id) {
            return Err(StoreError::CollectionNotFound(item.collection_id));
        }

        item.id = self.shared.next_id();
        if item.uid.is_empty() {
            item.uid = new_uid();
        }
        item.created = now();
        item.updated = item.created;
        item.labels.clear();

        self.record(Change::PutItem(item.clone()));
        self.touch_collection(item.collection_id);
        Ok(item)
    }

    async fn update_item(&mut self, mut item: Item, _principal: &Principal) -> StoreResult<Item> {
        self.shared.enter(Operation::UpdateItem)?;
        let existing = self.existing_item(item.id)?.clone();

        if item.collection_id == 0 {
            item.collection_id = existing.collection_id;
        }
        if !self.working.collections.contains_key(&item.collection_id) {
            return Err(StoreError::CollectionNotFound(item.collection_id));
        }
        if item.uid.is_empty() {
            item.uid = existing.uid.clone();
        }
        item.created = existing.created;
        item.updated = next_updated(existing.updated);
        item.labels = existing.labels;

        self.record(Change::PutItem(item.clone()));
        self.touch_collection(existing.collection_id);
        if item.collection_id != existing.collection_id {
            self.touch_collection(item.collection_id);
        }
        Ok(item)
    }

    async fn delete_item(&mut self, item: &Item, _principal: &Principal) -> StoreResult<()> {
        self.shared.enter(Operation::DeleteItem)?;
        let collection_id = self.existing_item(item.id)?.collection_id;
        self.record(Change::RemoveItem(item.id));
        self.touch_collection(collection_id);
        Ok(())
    }

    async fn find_labels_by_title(
        &mut self,
        titles: &[String],
        principal: &Principal,
    ) -> StoreResult<Vec<Label>> {
        self.shared.enter(Operation::FindLabels)?;
        let wanted: HashSet<&str> = titles.iter().map(String::as_str).collect();
        Ok(self
            .working
            .labels
            .values()
            .filter(|label| wanted.contains(label.title.as_str()))
            .filter(|label| self.working.label_visible(label, principal))
            .cloned()
            .collect())
    }

    async fn create_label(&mut self, mut label: Label, principal: &Principal) -> StoreResult<Label> {
        self.shared.enter(Operation::CreateLabel)?;
        label.id = self.shared.next_id();
        label.created_by = principal.id;
        label.created = now();
        label.updated = label.created;

        self.record(Change::PutLabel(label.clone()));
        Ok(label)
    }

    async fn set_item_labels(
        &mut self,
        item_id: i64,
        labels: &[Label],
        _principal: &Principal,
    ) -> StoreResult<()> {
        self.shared.enter(Operation::SetItemLabels)?;
        let mut item = self.existing_item(item_id)?.clone();

        let mut seen = BTreeSet::new();
        let mut resolved = Vec::with_capacity(labels.len());
        for label in labels {
            if !seen.insert(label.id) {
                continue;
            }
            let stored = self
                .working
                .labels
                .get(&label.id)
                .ok_or(StoreError::LabelNotFound(label.id))?;
            resolved.push(stored.clone());
        }

        item.labels = resolved;
        self.record(Change::PutItem(item));
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        let mut session = self;
        session.shared.enter(Operation::Commit)?;
        let journal = std::mem::take(&mut session.journal);
        let changes = journal.len();
        {
            let mut state = session.shared.state.lock();
            for change in journal {
                state.apply(change);
            }
        }
        session.committed = true;
        debug!(changes, "Committed session");
        Ok(())
    }
}

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_default()
}

/// A modification time strictly after `previous`, so every write moves the ETag.
fn next_updated(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now();
    if now.timestamp() > previous.timestamp() {
        now
    } else {
        DateTime::from_timestamp(previous.timestamp() + 1, 0).unwrap_or(now)
    }
}

fn new_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
