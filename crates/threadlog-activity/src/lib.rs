//! Activity log with thread-chain aggregation.
//!
//! Records discrete events about entities held in an external store, groups
//! comment events with the thread they belong to, pages through the log in
//! thread or creation order, and projects events into feed and push shapes.
//!
//! # Components
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `resolver` | [`EntityStore`] seam and the per-record memoized [`ActivityView`] |
//! | `record` | [`EventRecord`] and its derived identifiers |
//! | `chain` | The only writer of the `last_activity_id` chain pointer |
//! | `query` | [`FeedQuery`] scopes, orders and cursors |
//! | `serialize` | Feed shape and kind-dispatched push payload |
//! | `logger` | [`log_activity`] and [`remove_log`] |
//!
//! # Usage
//!
//! ```rust,ignore
//! use threadlog_activity::{log_activity, ActivityView, ApiOptions, FeedQuery, FeedSettings, SqliteEntityStore};
//!
//! log_activity(&conn, Some(&project), &comment, "create", user_id)?;
//!
//! let store = SqliteEntityStore::new(&conn);
//! let page = FeedQuery::for_projects([project.id()])
//!     .threads_only()
//!     .fetch(&conn, &FeedSettings::default())?;
//! for record in &page {
//!     let shape = ActivityView::new(record, &store).to_api_hash(&ApiOptions::feed())?;
//! }
//! ```

mod chain;
mod error;
mod logger;
mod query;
mod record;
mod resolver;
mod serialize;
mod sqlite_store;

pub use error::ActivityError;
pub use logger::{log_activity, remove_log};
pub use query::{get_activity, FeedCursor, FeedOrder, FeedPage, FeedQuery, FeedSettings};
pub use record::{action_type_for, activity_id_for, underscore, EventRecord, CREATE_ACTION};
pub use resolver::{ActivityView, EntityStore, ThreadComments, Visibility};
pub use serialize::{
    api_time, basic_hash, push_includes, ApiOptions, Include, PushEnvelope, PushIncludes,
    TargetInclude, TargetOptions,
};
pub use sqlite_store::{
    hard_delete_entity, save_entity, soft_delete_entity, SqliteEntityStore, RECENT_COMMENTS,
};
