//! Read-only activity feed handlers.
//!
//! Provides:
//! - `GET /api/activities`: scoped, ordered, paginated feed
//! - `GET /api/activities/{id}`: a single activity in feed shape
//! - `GET /api/activities/{id}/push`: the push payload and its delivery gate

use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use threadlog_activity::{
    get_activity, ActivityError, ActivityView, ApiOptions, EventRecord, FeedCursor, FeedOrder,
    FeedQuery, FeedSettings, PushEnvelope, SqliteEntityStore,
};

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<ActivityError> for ApiError {
    fn from(err: ActivityError) -> Self {
        tracing::error!(error = %err, storage = err.is_storage_failure(), "activity read failed");
        ApiError::InternalServerError(err.to_string())
    }
}

/// Query parameters for `GET /api/activities`.
#[derive(Debug, Default, Deserialize)]
pub struct ActivitiesQuery {
    /// Comma-separated project ids.
    pub project_id: Option<String>,
    /// Only activities performed by this user.
    pub user_id: Option<i64>,
    /// Exclude comment activities.
    #[serde(default)]
    pub threads: bool,
    /// `thread` (default), `creation` or `updated`.
    pub order: Option<String>,
    /// Activity id whose position is the page cursor.
    pub before: Option<i64>,
    /// Effective id of `before` as it was when its page was served.
    pub before_effective_id: Option<i64>,
    /// `updated_at` of `before` as it was when its page was served.
    pub before_updated_at: Option<String>,
    /// Only activities with a larger id.
    pub after: Option<i64>,
    /// Page size, bounded by the server's configured maximum.
    pub limit: Option<u32>,
}

/// Response wrapper for feed listings.
#[derive(Debug, Serialize)]
pub struct ActivitiesResponse {
    /// Activities in feed shape, in page order.
    pub activities: Vec<Map<String, Value>>,
    /// The number of activities returned.
    pub count: usize,
    /// Query parameters for the following page; `null` on the last page.
    pub next: Option<NextPage>,
}

/// Cursor for the following page, named after the query parameters that
/// accept it back.
///
/// Echoing all three fields pins the page boundary to the positions served,
/// so a thread bumped between requests is neither repeated nor skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextPage {
    pub before: i64,
    pub before_effective_id: i64,
    pub before_updated_at: String,
}

impl From<FeedCursor> for NextPage {
    fn from(cursor: FeedCursor) -> Self {
        Self {
            before: cursor.id,
            before_effective_id: cursor.effective_id,
            before_updated_at: cursor.updated_at,
        }
    }
}

impl ActivitiesQuery {
    /// Builds the feed query for everything but a `before` cursor that has
    /// to be read from the database.
    fn to_feed_query(&self) -> Result<FeedQuery, ApiError> {
        let mut query = FeedQuery::new().order(parse_order(self.order.as_deref())?);

        if let Some(raw) = &self.project_id {
            query = query.for_project(parse_project_ids(raw)?);
        }
        if let Some(user_id) = self.user_id {
            query = query.for_user(user_id);
        }
        if self.threads {
            query = query.threads_only();
        }
        if let Some(after) = self.after {
            query = query.after(after);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(cursor) = self.cursor_snapshot(query.current_order()) {
            query = query.before_cursor(cursor);
        }

        Ok(query)
    }

    /// The `before` cursor as sent by the client, if it carries every key
    /// `order` compares. Keys the order ignores are left at placeholders.
    fn cursor_snapshot(&self, order: FeedOrder) -> Option<FeedCursor> {
        let id = self.before?;
        match order {
            FeedOrder::Creation => Some(FeedCursor {
                id,
                effective_id: id,
                updated_at: String::new(),
            }),
            FeedOrder::Thread => self.before_effective_id.map(|effective_id| FeedCursor {
                id,
                effective_id,
                updated_at: String::new(),
            }),
            FeedOrder::Updated => self.before_updated_at.clone().map(|updated_at| FeedCursor {
                id,
                effective_id: id,
                updated_at,
            }),
        }
    }

    /// Activity id to look up when the cursor snapshot is incomplete.
    fn cursor_lookup(&self, order: FeedOrder) -> Option<i64> {
        if self.cursor_snapshot(order).is_some() {
            None
        } else {
            self.before
        }
    }
}

fn parse_order(raw: Option<&str>) -> Result<FeedOrder, ApiError> {
    match raw {
        None | Some("thread") => Ok(FeedOrder::Thread),
        Some("creation") => Ok(FeedOrder::Creation),
        Some("updated") => Ok(FeedOrder::Updated),
        Some(other) => Err(ApiError::BadRequest(format!(
            "invalid order: {other}. Expected one of: thread, creation, updated"
        ))),
    }
}

fn parse_project_ids(raw: &str) -> Result<Vec<i64>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid project id: {part}")))
        })
        .collect()
}

/// Runs `work` on a pooled connection off the async runtime.
async fn with_connection<T, F>(state: Arc<AppState>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection, &FeedSettings) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {e}")))?;
        work(&*conn, &state.feed)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {e}")))?
}

fn load_activity(conn: &Connection, id: i64) -> Result<EventRecord, ApiError> {
    get_activity(conn, id)?.ok_or_else(|| ApiError::NotFound(format!("activity {id}")))
}

/// Handler for `GET /api/activities`.
pub async fn list_activities_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>, ApiError> {
    let mut query = params.to_feed_query()?;
    let lookup = params.cursor_lookup(query.current_order());

    let (activities, next) = with_connection(state, move |conn, settings| {
        // A bare `before=<id>` uses the row's current position.
        if let Some(id) = lookup {
            let reference = get_activity(conn, id)?
                .ok_or_else(|| ApiError::BadRequest(format!("unknown cursor activity: {id}")))?;
            query = query.before(&reference);
        }

        let page = query.fetch_page(conn, settings)?;
        let store = SqliteEntityStore::new(conn);
        let options = ApiOptions::feed();

        let mut shapes = Vec::with_capacity(page.records.len());
        for record in &page.records {
            shapes.push(ActivityView::new(record, &store).to_api_hash(&options)?);
        }
        Ok((shapes, page.next.map(NextPage::from)))
    })
    .await?;

    let count = activities.len();
    Ok(Json(ActivitiesResponse {
        activities,
        count,
        next,
    }))
}

/// Handler for `GET /api/activities/{id}`.
pub async fn get_activity_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let shape = with_connection(state, move |conn, _| {
        let record = load_activity(conn, id)?;
        let store = SqliteEntityStore::new(conn);
        Ok(ActivityView::new(&record, &store).to_api_hash(&ApiOptions::feed())?)
    })
    .await?;

    Ok(Json(shape))
}

/// Handler for `GET /api/activities/{id}/push`.
pub async fn get_push_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PushEnvelope>, ApiError> {
    let envelope = with_connection(state, move |conn, _| {
        let record = load_activity(conn, id)?;
        let store = SqliteEntityStore::new(conn);
        Ok(ActivityView::new(&record, &store).push_payload(Map::new())?)
    })
    .await?;

    Ok(Json(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_ids_accept_comma_lists() {
        assert_eq!(parse_project_ids("1, 2,3").expect("should parse"), vec![1, 2, 3]);
        assert_eq!(parse_project_ids("4,").expect("should parse"), vec![4]);
        assert!(parse_project_ids("1,x").is_err());
    }

    #[test]
    fn cursor_snapshot_needs_the_ordered_key() {
        let params = ActivitiesQuery {
            before: Some(4),
            before_effective_id: Some(9),
            ..ActivitiesQuery::default()
        };

        let snapshot = params
            .cursor_snapshot(FeedOrder::Thread)
            .expect("thread snapshot");
        assert_eq!((snapshot.id, snapshot.effective_id), (4, 9));
        assert_eq!(params.cursor_lookup(FeedOrder::Thread), None);

        assert!(params.cursor_snapshot(FeedOrder::Updated).is_none());
        assert_eq!(params.cursor_lookup(FeedOrder::Updated), Some(4));

        let bare = ActivitiesQuery {
            before: Some(4),
            ..ActivitiesQuery::default()
        };
        assert!(bare.cursor_snapshot(FeedOrder::Creation).is_some());
        assert_eq!(bare.cursor_lookup(FeedOrder::Thread), Some(4));
    }

    #[test]
    fn order_defaults_to_thread() {
        assert_eq!(parse_order(None).expect("default"), FeedOrder::Thread);
        assert_eq!(
            parse_order(Some("updated")).expect("updated"),
            FeedOrder::Updated
        );
        assert!(matches!(
            parse_order(Some("random")),
            Err(ApiError::BadRequest(_))
        ));
    }
}
