//! CalDAV storage provider over projects and tasks.
//!
//! A request is resolved once into a [`RequestContext`] (who is asking, what
//! the path addresses, which project and task it names). Each operation then
//! runs against the store in its own session: reads commit an untouched
//! session, writes commit only after the task write and label
//! reconciliation both succeeded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{DavError, DavResult};
use crate::gate::{Denial, GateOutcome};
use crate::ics::{Codec, IcsCodec};
use crate::labels::{distinct, reconcile_labels};
use crate::model::{Collection, Item, Page, Principal};
use crate::path::{DavPaths, Target};
use crate::resource::Resource;
use crate::store::{Rights, Session, Store};

/// Calendar-query filter as sent by the client.
///
/// Accepted but not evaluated: filtered queries answer with the full
/// project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceFilter {
    pub component: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Per-request state, built by [`ProjectStorage::resolve`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    principal: Principal,
    target: Target,
    collection: Option<Collection>,
    item: Option<Item>,
    page: Page,
}

impl RequestContext {
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn is_entry(&self) -> bool {
        self.target == Target::Entry
    }

    pub fn is_principal(&self) -> bool {
        self.target == Target::Principal
    }

    /// The addressed project. Items are loaded once a read touched it.
    pub fn collection(&self) -> Option<&Collection> {
        self.collection.as_ref()
    }

    /// The addressed task, if its UID exists and is visible.
    pub fn item(&self) -> Option<&Item> {
        self.item.as_ref()
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

pub struct ProjectStorage<S: Store> {
    store: S,
    codec: Arc<dyn Codec>,
    config: BridgeConfig,
    paths: DavPaths,
}

impl<S: Store> ProjectStorage<S> {
    pub fn new(store: S, config: BridgeConfig) -> Self {
        let codec = Arc::new(IcsCodec::new(&config));
        Self::with_codec(store, config, codec)
    }

    pub fn with_codec(store: S, config: BridgeConfig, codec: Arc<dyn Codec>) -> Self {
        ProjectStorage {
            paths: DavPaths::new(&config),
            store,
            codec,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn paths(&self) -> &DavPaths {
        &self.paths
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Resolve `path` for `principal`.
    ///
    /// An item path whose UID is unknown, or whose task lives in another
    /// project, resolves without a task; that request is then a create.
    pub async fn resolve(&self, principal: Principal, path: &str) -> DavResult<RequestContext> {
        let target = self.paths.parse(path)?;

        let collection = target.collection_id().map(Collection::reference);
        let item = match &target {
            Target::Item { collection_id, uid } => {
                self.find_item(&principal, *collection_id, uid).await?
            }
            _ => None,
        };

        debug!(
            principal = %principal.username,
            path,
            ?target,
            item_found = item.is_some(),
            "Resolved request"
        );

        Ok(RequestContext {
            principal,
            target,
            collection,
            item,
            page: Page::first(self.config.page_size),
        })
    }

    /// List resources under `path`. `include_children` is accepted and ignored.
    pub async fn discover(
        &self,
        ctx: &mut RequestContext,
        path: &str,
        _include_children: bool,
    ) -> DavResult<Vec<Resource>> {
        match ctx.target {
            Target::Entry => return Ok(vec![self.principal_resource(ctx, path)]),
            Target::Principal => {
                let home = self.paths.home();
                return Ok(vec![self.principal_resource(ctx, &home)]);
            }
            _ => {}
        }

        if ctx.collection.as_ref().is_some_and(|c| c.id != 0) {
            let collection = self.load_collection(ctx).await?;
            return Ok(vec![self.collection_resource(collection, true)]);
        }

        let mut session = self.store.begin().await?;
        let collections = session.find_collections(&ctx.principal, ctx.page).await?;
        session.commit().await?;

        debug!(
            principal = %ctx.principal.username,
            count = collections.len(),
            page = ctx.page.number,
            "Listed projects"
        );

        Ok(collections
            .into_iter()
            .map(|collection| self.collection_resource(collection, true))
            .collect())
    }

    /// One task resource per `<base>/<project-id>/<uid>.<ext>` path.
    ///
    /// Every path is checked before the store is asked; UIDs are looked up in
    /// one call.
    pub async fn discover_by_paths<P: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        paths: &[P],
    ) -> DavResult<Vec<Resource>> {
        let uids = paths
            .iter()
            .map(|path| self.paths.uid_from_item_path(path.as_ref()))
            .collect::<DavResult<Vec<String>>>()?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let mut session = self.store.begin().await?;
        let items = session.find_items_by_uid(&uids, &ctx.principal).await?;
        session.commit().await?;

        debug!(requested = uids.len(), found = items.len(), "Multiget");

        Ok(items.into_iter().map(|item| self.item_resource(item)).collect())
    }

    /// Answer a calendar query.
    ///
    /// Tasks already loaded by an earlier read in this request are returned
    /// as they are, without another store query. The filter is ignored.
    pub async fn discover_by_filter(
        &self,
        ctx: &mut RequestContext,
        path: &str,
        filter: &ResourceFilter,
    ) -> DavResult<Vec<Resource>> {
        if filter != &ResourceFilter::default() {
            debug!(?filter, "Calendar query filter is not evaluated");
        }

        if let Some(items) = ctx.collection.as_ref().and_then(|c| c.items.as_ref()) {
            return Ok(items
                .iter()
                .cloned()
                .map(|item| self.item_resource(item))
                .collect());
        }

        if ctx.collection.is_none() {
            return self.discover(ctx, path, false).await;
        }

        let collection = self.load_collection(ctx).await?;
        Ok(vec![self.collection_resource(collection, false)])
    }

    /// Current state of the addressed task or project; `None` if not found.
    pub async fn fetch(
        &self,
        ctx: &mut RequestContext,
        path: &str,
    ) -> DavResult<Option<Resource>> {
        if let Some(known) = &ctx.item {
            let Some(mut fresh) = self
                .find_item(&ctx.principal, known.collection_id, &known.uid)
                .await?
            else {
                return Ok(None);
            };
            if fresh.updated.timestamp() <= 0 {
                fresh.updated = known.updated;
            }
            return Ok(Some(self.item_resource(fresh)));
        }

        match ctx.target {
            Target::Entry | Target::Principal => {
                return Ok(self.discover(ctx, path, false).await?.into_iter().next());
            }
            // An item path never falls back to its project
            Target::Home | Target::Item { .. } => return Ok(None),
            Target::Collection(_) => {}
        }

        match self.load_collection(ctx).await {
            Ok(collection) => Ok(Some(self.collection_resource(collection, true))),
            Err(DavError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Same as [`fetch`](Self::fetch).
    pub async fn fetch_shallow(
        &self,
        ctx: &mut RequestContext,
        path: &str,
    ) -> DavResult<Option<Resource>> {
        self.fetch(ctx, path).await
    }

    /// Create a task from `document` in the addressed project.
    ///
    /// On an item path the path's UID wins over the document's. A path that
    /// already names a visible task is an update.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        path: &str,
        document: &str,
    ) -> DavResult<Resource> {
        if ctx.item.is_some() {
            return self.update(ctx, path, document).await;
        }

        let collection_id = ctx
            .target
            .collection_id()
            .ok_or_else(|| DavError::InvalidPath(path.to_string()))?;

        let mut candidate = self.codec.parse_document(document)?;
        candidate.id = 0;
        candidate.collection_id = collection_id;
        if let Target::Item { uid, .. } = &ctx.target {
            candidate.uid = uid.clone();
        }
        let references = std::mem::take(&mut candidate.labels);

        let mut session = self.store.begin().await?;
        GateOutcome::from(session.can_create_item(&candidate, &ctx.principal).await)
            .enforce(Denial::Forbidden, &format!("project {}", collection_id))?;

        let mut created = session.create_item(candidate, &ctx.principal).await?;
        let canonical =
            reconcile_labels(&mut session, &ctx.principal, created.id, &references).await?;
        created.labels = distinct(&canonical);
        session.commit().await?;

        info!(
            principal = %ctx.principal.username,
            project = collection_id,
            uid = %created.uid,
            labels = created.labels.len(),
            "Created task"
        );

        Ok(self.item_resource(created))
    }

    /// Replace the addressed task with `document`.
    ///
    /// Id, UID and project come from the resolved task, never from the
    /// document.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        path: &str,
        document: &str,
    ) -> DavResult<Resource> {
        let target = ctx
            .item
            .as_ref()
            .ok_or_else(|| DavError::NotFound(path.to_string()))?;

        let mut candidate = self.codec.parse_document(document)?;
        if candidate.uid != target.uid {
            debug!(path_uid = %target.uid, document_uid = %candidate.uid, "Document UID ignored");
        }
        candidate.id = target.id;
        candidate.uid = target.uid.clone();
        candidate.collection_id = target.collection_id;
        let references = std::mem::take(&mut candidate.labels);

        let mut session = self.store.begin().await?;
        GateOutcome::from(session.can_update_item(&candidate, &ctx.principal).await)
            .enforce(Denial::Forbidden, &format!("task {}", target.uid))?;

        let mut updated = session.update_item(candidate, &ctx.principal).await?;
        let canonical =
            reconcile_labels(&mut session, &ctx.principal, updated.id, &references).await?;
        updated.labels = distinct(&canonical);
        session.commit().await?;

        info!(
            principal = %ctx.principal.username,
            uid = %updated.uid,
            labels = updated.labels.len(),
            "Updated task"
        );

        Ok(self.item_resource(updated))
    }

    /// Delete the addressed task. Without one this does nothing.
    pub async fn delete(&self, ctx: &RequestContext, path: &str) -> DavResult<()> {
        let Some(target) = &ctx.item else {
            debug!(path, "Nothing to delete");
            return Ok(());
        };

        let mut session = self.store.begin().await?;
        GateOutcome::from(session.can_delete_item(target, &ctx.principal).await)
            .enforce(Denial::Forbidden, &format!("task {}", target.uid))?;
        session.delete_item(target, &ctx.principal).await?;
        session.commit().await?;

        info!(principal = %ctx.principal.username, uid = %target.uid, "Deleted task");
        Ok(())
    }

    /// Load the addressed project with its tasks and keep it in the context.
    ///
    /// A read denial answers not-found so projects of other users cannot be
    /// probed.
    async fn load_collection(&self, ctx: &mut RequestContext) -> DavResult<Collection> {
        let reference = ctx
            .collection
            .clone()
            .ok_or_else(|| DavError::NotFound("no project in request path".to_string()))?;

        let mut session = self.store.begin().await?;
        let outcome =
            GateOutcome::from(session.can_read_collection(reference.id, &ctx.principal).await);
        if outcome == GateOutcome::Forbidden {
            warn!(
                principal = %ctx.principal.username,
                project = reference.id,
                "User tried to access a project they cannot read"
            );
        }
        outcome.enforce(Denial::NotFound, &format!("project {}", reference.id))?;

        let mut collection = session.load_collection(reference.id).await?;
        collection.items = match reference.items {
            Some(items) => Some(items),
            None => Some(
                session
                    .find_items(
                        reference.id,
                        &ctx.principal,
                        Page::first(self.config.max_items_per_collection),
                    )
                    .await?,
            ),
        };
        session.commit().await?;

        debug!(
            project = collection.id,
            items = collection.items.as_ref().map_or(0, Vec::len),
            "Loaded project"
        );

        ctx.collection = Some(collection.clone());
        Ok(collection)
    }

    /// Look a task up by UID within one project; a missing or invisible task
    /// is `None`.
    async fn find_item(
        &self,
        principal: &Principal,
        collection_id: i64,
        uid: &str,
    ) -> DavResult<Option<Item>> {
        let mut session = self.store.begin().await?;
        let found = match session
            .find_items_by_uid(&[uid.to_string()], principal)
            .await
        {
            Ok(items) => items
                .into_iter()
                .find(|item| item.uid == uid && item.collection_id == collection_id),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };
        session.commit().await?;
        Ok(found)
    }

    fn principal_resource(&self, ctx: &RequestContext, href: &str) -> Resource {
        Resource::for_principal(href, Arc::clone(&self.codec))
            .with_name(ctx.principal.username.clone())
    }

    fn collection_resource(&self, collection: Collection, is_collection: bool) -> Resource {
        let href = self.paths.collection_href(collection.id);
        let name = collection.title.clone();
        Resource::for_collection(href, collection, is_collection, Arc::clone(&self.codec))
            .with_name(name)
    }

    fn item_resource(&self, item: Item) -> Resource {
        Resource::for_item(self.paths.item_href(&item), item, Arc::clone(&self.codec))
    }
}
