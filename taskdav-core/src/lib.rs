//! CalDAV storage bridge for a project/task domain.
//!
//! Projects are exposed as calendar collections and tasks as VTODO
//! documents. [`ProjectStorage`] resolves request paths, checks rights
//! through the store and drives discovery, fetch and the
//! create/update/delete lifecycle inside store sessions.

pub mod config;
pub mod error;
pub mod gate;
pub mod ics;
pub mod labels;
pub mod model;
pub mod path;
pub mod provider;
pub mod resource;
pub mod store;

pub use config::BridgeConfig;
pub use error::{DavError, DavResult, StoreError, StoreResult};
pub use gate::{Denial, GateOutcome};
pub use ics::{Codec, IcsCodec};
pub use labels::reconcile_labels;
pub use model::{Collection, Item, Label, Page, Principal, Reminder};
pub use path::{DavPaths, Target};
pub use provider::{ProjectStorage, RequestContext, ResourceFilter};
pub use resource::{Resource, Subject};
pub use store::{MemorySession, MemoryStore, Operation, Right, Rights, Session, Store};
