//! Scoped, ordered, cursor-paginated reads of the activity log.
//!
//! A [`FeedQuery`] is built by chaining named scopes and is turned into a
//! single parameterised statement by [`FeedQuery::fetch`]. Nothing is
//! interpolated into the SQL except placeholders.
//!
//! The `before` cursor always compares the same key the page is ordered by.
//! For thread order that key is `(COALESCE(last_activity_id, id), id)`: a
//! record is older than the cursor when its effective id is smaller, or equal
//! with a smaller own id. Because a chain pointer is always larger than its
//! record's own id, this is the same as requiring `id < cursor` and
//! `last_activity_id < cursor` whenever effective ids are distinct, and it
//! keeps roots that were bumped after the cursor was taken from reappearing.

use rusqlite::{types::ToSql, Connection, OptionalExtension};
use threadlog_types::{EntityKind, EntityRef};

use crate::error::ActivityError;
use crate::record::{EventRecord, ACTIVITY_COLUMNS};

/// Page sizing for feed reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    /// Page size when a query sets none.
    pub per_page: u32,
    /// Upper bound for any page.
    pub max_per_page: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            per_page: 20,
            max_per_page: 100,
        }
    }
}

/// Sort order of a feed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedOrder {
    /// Newest activity first, threads bubbled up by their latest reply.
    #[default]
    Thread,
    /// Plain insertion order, newest first.
    Creation,
    /// Most recently written rows first.
    Updated,
}

/// Snapshot of a record's ordering keys, taken when its page was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCursor {
    pub id: i64,
    pub effective_id: i64,
    pub updated_at: String,
}

impl From<&EventRecord> for FeedCursor {
    fn from(record: &EventRecord) -> Self {
        Self {
            id: record.id,
            effective_id: record.last_id(),
            updated_at: record.updated_at.clone(),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub records: Vec<EventRecord>,
    /// Cursor for the following page; `None` once the feed is exhausted.
    pub next: Option<FeedCursor>,
}

/// A composable activity feed query.
#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    project_ids: Option<Vec<i64>>,
    user_id: Option<i64>,
    targets: Option<Vec<EntityRef>>,
    kinds: Option<Vec<EntityKind>>,
    threads_only: bool,
    order: FeedOrder,
    before: Option<FeedCursor>,
    after: Option<i64>,
    limit: Option<u32>,
}

impl FeedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard project feed: the given projects, thread order.
    pub fn for_projects(project_ids: impl IntoIterator<Item = i64>) -> Self {
        Self::new().for_project(project_ids).order_by_thread()
    }

    /// Restricts to activities scoped to any of `project_ids`.
    pub fn for_project(mut self, project_ids: impl IntoIterator<Item = i64>) -> Self {
        self.project_ids = Some(project_ids.into_iter().collect());
        self
    }

    /// Restricts to activities performed by `user_id`.
    pub fn for_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Restricts to activities about any of `targets`, either directly or
    /// through a comment posted on them.
    pub fn in_targets(mut self, targets: impl IntoIterator<Item = EntityRef>) -> Self {
        self.targets = Some(targets.into_iter().collect());
        self
    }

    /// Excludes comment activities, leaving one entry per thread root.
    pub fn threads_only(mut self) -> Self {
        self.threads_only = true;
        self
    }

    pub fn for_conversations(self) -> Self {
        self.for_kinds([EntityKind::Conversation])
    }

    pub fn for_tasks(self) -> Self {
        self.for_kinds([EntityKind::Task])
    }

    pub fn for_task_lists(self) -> Self {
        self.for_kinds([EntityKind::TaskList, EntityKind::Task])
    }

    /// Restricts to activities whose target or comment target is of one of
    /// `kinds`.
    pub fn for_kinds(mut self, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn order_by_thread(mut self) -> Self {
        self.order = FeedOrder::Thread;
        self
    }

    pub fn order_by_creation(mut self) -> Self {
        self.order = FeedOrder::Creation;
        self
    }

    pub fn order_by_updated(mut self) -> Self {
        self.order = FeedOrder::Updated;
        self
    }

    pub fn order(mut self, order: FeedOrder) -> Self {
        self.order = order;
        self
    }

    pub fn current_order(&self) -> FeedOrder {
        self.order
    }

    /// Only records strictly older than `reference` under the query's order.
    pub fn before(self, reference: &EventRecord) -> Self {
        self.before_cursor(FeedCursor::from(reference))
    }

    /// Like [`Self::before`], from a snapshot taken when an earlier page was
    /// served rather than the reference row's current position.
    pub fn before_cursor(mut self, cursor: FeedCursor) -> Self {
        self.before = Some(cursor);
        self
    }

    /// Only records with an id strictly greater than `activity_id`.
    pub fn after(mut self, activity_id: i64) -> Self {
        self.after = Some(activity_id);
        self
    }

    /// Page size. Clamped to `1..=max_per_page` at fetch time.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Runs the query and returns at most one page of records.
    ///
    /// # Errors
    ///
    /// Returns `ActivityError::Storage` on SQL failure.
    pub fn fetch(
        &self,
        conn: &Connection,
        settings: &FeedSettings,
    ) -> Result<Vec<EventRecord>, ActivityError> {
        let limit = self.page_size(settings);
        let mut sql = SqlParts::default();

        if let Some(ids) = &self.project_ids {
            if ids.is_empty() {
                sql.clauses.push("0".to_string());
            } else {
                let placeholders: Vec<String> = ids.iter().map(|id| sql.bind(*id)).collect();
                let clause = format!("project_id IN ({})", placeholders.join(", "));
                sql.clauses.push(clause);
            }
        }

        if let Some(user_id) = self.user_id {
            let clause = format!("user_id = {}", sql.bind(user_id));
            sql.clauses.push(clause);
        }

        if let Some(targets) = &self.targets {
            if targets.is_empty() {
                sql.clauses.push("0".to_string());
            } else {
                let mut alternatives = Vec::with_capacity(targets.len() * 2);
                for target in targets {
                    let kind = sql.bind(target.kind.as_str().to_string());
                    let id = sql.bind(target.id);
                    alternatives.push(format!("(target_type = {kind} AND target_id = {id})"));
                    alternatives.push(format!(
                        "(comment_target_type = {kind} AND comment_target_id = {id})"
                    ));
                }
                sql.clauses.push(format!("({})", alternatives.join(" OR ")));
            }
        }

        if let Some(kinds) = &self.kinds {
            if kinds.is_empty() {
                sql.clauses.push("0".to_string());
            } else {
                let placeholders: Vec<String> = kinds
                    .iter()
                    .map(|k| sql.bind(k.as_str().to_string()))
                    .collect();
                let list = placeholders.join(", ");
                sql.clauses.push(format!(
                    "(target_type IN ({list}) OR comment_target_type IN ({list}))"
                ));
            }
        }

        if self.threads_only {
            let comment = sql.bind(EntityKind::Comment.as_str().to_string());
            sql.clauses.push(format!("target_type <> {comment}"));
        }

        if let Some(cursor) = &self.before {
            let clause = match self.order {
                FeedOrder::Thread => {
                    let effective = sql.bind(cursor.effective_id);
                    let id = sql.bind(cursor.id);
                    format!(
                        "(COALESCE(last_activity_id, id) < {effective}
                          OR (COALESCE(last_activity_id, id) = {effective} AND id < {id}))"
                    )
                }
                FeedOrder::Creation => format!("id < {}", sql.bind(cursor.id)),
                FeedOrder::Updated => {
                    let updated_at = sql.bind(cursor.updated_at.clone());
                    let id = sql.bind(cursor.id);
                    format!(
                        "(updated_at < {updated_at} OR (updated_at = {updated_at} AND id < {id}))"
                    )
                }
            };
            sql.clauses.push(clause);
        }

        if let Some(after) = self.after {
            let clause = format!("id > {}", sql.bind(after));
            sql.clauses.push(clause);
        }

        let where_clause = if sql.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", sql.clauses.join(" AND "))
        };
        let order_clause = match self.order {
            FeedOrder::Thread => "COALESCE(last_activity_id, id) DESC, id DESC",
            FeedOrder::Creation => "id DESC",
            FeedOrder::Updated => "updated_at DESC, id DESC",
        };
        let limit_param = sql.bind(i64::from(limit));

        let statement = format!(
            "SELECT {ACTIVITY_COLUMNS}
             FROM activities
             {where_clause}
             ORDER BY {order_clause}
             LIMIT {limit_param}"
        );

        let params_refs: Vec<&dyn ToSql> = sql.params.iter().map(|p| &**p).collect();
        let mut stmt = conn.prepare(&statement)?;
        let rows = stmt.query_map(params_refs.as_slice(), EventRecord::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        tracing::trace!(
            order = ?self.order,
            limit,
            returned = records.len(),
            "fetched feed page"
        );

        Ok(records)
    }

    /// Like [`Self::fetch`], also returning the cursor for the next page.
    pub fn fetch_page(
        &self,
        conn: &Connection,
        settings: &FeedSettings,
    ) -> Result<FeedPage, ActivityError> {
        let records = self.fetch(conn, settings)?;
        let full = records.len() == self.page_size(settings) as usize;
        let next = if full {
            records.last().map(FeedCursor::from)
        } else {
            None
        };
        Ok(FeedPage { records, next })
    }

    fn page_size(&self, settings: &FeedSettings) -> u32 {
        let max = settings.max_per_page.max(1);
        self.limit.unwrap_or(settings.per_page).clamp(1, max)
    }
}

/// Loads a single activity by id.
pub fn get_activity(conn: &Connection, id: i64) -> Result<Option<EventRecord>, ActivityError> {
    let record = conn
        .query_row(
            &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1"),
            [id],
            EventRecord::from_row,
        )
        .optional()?;
    Ok(record)
}

/// WHERE clauses and their positional parameters, built together.
#[derive(Default)]
struct SqlParts {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl SqlParts {
    /// Records a parameter and returns its placeholder.
    fn bind<T: ToSql + 'static>(&mut self, value: T) -> String {
        self.params.push(Box::new(value));
        format!("?{}", self.params.len())
    }
}
