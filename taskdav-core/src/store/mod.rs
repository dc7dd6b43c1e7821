//! Domain store interface.
//!
//! The bridge never touches projects, tasks or labels directly. Every read and
//! write goes through a [`Session`], one transactional scope opened with
//! [`Store::begin`]. A session that is dropped without [`Session::commit`]
//! must discard its writes, which also covers requests cancelled mid-flight.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::{Collection, Item, Label, Page, Principal};

pub use memory::{MemorySession, MemoryStore, Operation, Right};

#[async_trait]
pub trait Store: Send + Sync {
    type Session: Session;

    async fn begin(&self) -> StoreResult<Self::Session>;
}

/// Permission checks, answered inside the session that will do the work.
///
/// `Ok(false)` is an explicit denial; an error means the check itself failed
/// (for example because the entity vanished).
#[async_trait]
pub trait Rights: Send {
    async fn can_read_collection(
        &mut self,
        collection_id: i64,
        principal: &Principal,
    ) -> StoreResult<bool>;

    async fn can_create_item(&mut self, item: &Item, principal: &Principal) -> StoreResult<bool>;

    async fn can_update_item(&mut self, item: &Item, principal: &Principal) -> StoreResult<bool>;

    async fn can_delete_item(&mut self, item: &Item, principal: &Principal) -> StoreResult<bool>;
}

#[async_trait]
pub trait Session: Rights + Send {
    /// Projects the principal can see, in store order.
    async fn find_collections(
        &mut self,
        principal: &Principal,
        page: Page,
    ) -> StoreResult<Vec<Collection>>;

    /// Project metadata, items not loaded.
    async fn load_collection(&mut self, collection_id: i64) -> StoreResult<Collection>;

    async fn find_items(
        &mut self,
        collection_id: i64,
        principal: &Principal,
        page: Page,
    ) -> StoreResult<Vec<Item>>;

    /// Batched lookup, restricted to tasks the principal can see.
    async fn find_items_by_uid(
        &mut self,
        uids: &[String],
        principal: &Principal,
    ) -> StoreResult<Vec<Item>>;

    /// Persist a new task. Label associations are not written here.
    async fn create_item(&mut self, item: Item, principal: &Principal) -> StoreResult<Item>;

    /// Persist changes to the task with `item.id`. Label associations are kept.
    async fn update_item(&mut self, item: Item, principal: &Principal) -> StoreResult<Item>;

    async fn delete_item(&mut self, item: &Item, principal: &Principal) -> StoreResult<()>;

    /// Labels with one of `titles` that the principal owns or can see.
    async fn find_labels_by_title(
        &mut self,
        titles: &[String],
        principal: &Principal,
    ) -> StoreResult<Vec<Label>>;

    async fn create_label(&mut self, label: Label, principal: &Principal) -> StoreResult<Label>;

    /// Replace the task's label associations with exactly `labels`.
    async fn set_item_labels(
        &mut self,
        item_id: i64,
        labels: &[Label],
        principal: &Principal,
    ) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;
}
