//! Integration tests for the activity feed HTTP surface.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use threadlog_activity::{log_activity, save_entity, FeedSettings};
use threadlog_db::{create_pool, DbPool, DbRuntimeSettings};
use threadlog_server::{app, AppState};
use threadlog_types::{Entity, EntityKind};
use tower::ServiceExt; // for oneshot

/// File-backed pool so every pooled connection sees the same database.
fn setup() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("threadlog.db");
    let pool = create_pool(
        path.to_str().expect("temp path should be utf-8"),
        DbRuntimeSettings::default(),
    )
    .expect("should create pool");
    {
        let conn = pool.get().expect("should get connection");
        threadlog_db::run_migrations(&conn).expect("migrations should succeed");
    }
    (dir, pool)
}

/// Seeds one project with a conversation (activity 1), a page (activity 2)
/// and a comment on the conversation (activity 3).
fn seed(pool: &DbPool) {
    let conn = pool.get().expect("should get connection");

    let mut user = Entity::new(EntityKind::User, 1);
    user.attributes.insert("login".into(), json!("ada"));
    save_entity(&conn, &user).expect("save user");

    let mut project = Entity::new(EntityKind::Project, 1);
    project.attributes.insert("name".into(), json!("Launch"));
    project.attributes.insert("permalink".into(), json!("launch"));
    save_entity(&conn, &project).expect("save project");

    let mut conversation = Entity::new(EntityKind::Conversation, 10);
    conversation.project_id = Some(1);
    conversation.user_id = Some(1);
    conversation.attributes.insert("name".into(), json!("Kickoff"));
    save_entity(&conn, &conversation).expect("save conversation");

    let mut page = Entity::new(EntityKind::Page, 3);
    page.project_id = Some(1);
    page.user_id = Some(1);
    page.dont_push = true;
    save_entity(&conn, &page).expect("save page");

    let mut comment = Entity::new(EntityKind::Comment, 5);
    comment.project_id = Some(1);
    comment.user_id = Some(1);
    comment.parent = Some(conversation.entity_ref.clone());
    comment.attributes.insert("body".into(), json!("Welcome"));
    save_entity(&conn, &comment).expect("save comment");

    for target in [&conversation, &page, &comment] {
        log_activity(&conn, Some(&project), target, "create", 1)
            .expect("log should succeed")
            .expect("log should not be suppressed");
    }
}

fn test_app(pool: DbPool) -> Router {
    app(AppState {
        pool,
        feed: FeedSettings::default(),
    })
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("should build request"),
        )
        .await
        .expect("request should complete");

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("should read body");
    let json = serde_json::from_slice(&body).expect("body should be json");
    (status, json)
}

fn activity_ids(body: &Value) -> Vec<i64> {
    body["activities"]
        .as_array()
        .expect("activities should be an array")
        .iter()
        .map(|a| a["id"].as_i64().expect("id should be an integer"))
        .collect()
}

// ── Health ───────────────────────────────────────────────────────────

#[tokio::test]
async fn health_check_returns_ok() {
    let (_dir, pool) = setup();

    let (status, body) = get_json(test_app(pool), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

// ── Listing ──────────────────────────────────────────────────────────

#[tokio::test]
async fn list_defaults_to_thread_order() {
    let (_dir, pool) = setup();
    seed(&pool);

    let (status, body) = get_json(test_app(pool), "/api/activities?project_id=1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(activity_ids(&body), vec![3, 1, 2]);
    assert_eq!(body["count"], 3);
}

#[tokio::test]
async fn list_threads_only_hides_comments() {
    let (_dir, pool) = setup();
    seed(&pool);

    let (status, body) =
        get_json(test_app(pool), "/api/activities?project_id=1&threads=true").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(activity_ids(&body), vec![1, 2]);
    assert_eq!(body["activities"][0]["last_activity_id"], 3);
}

#[tokio::test]
async fn list_nests_project_user_and_target() {
    let (_dir, pool) = setup();
    seed(&pool);

    let (_, body) = get_json(test_app(pool), "/api/activities?threads=true&limit=1").await;
    let first = &body["activities"][0];

    assert_eq!(first["project"]["name"], "Launch");
    assert_eq!(first["user"]["username"], "ada");
    assert_eq!(first["target"]["type"], "Conversation");
    assert_eq!(first["activity_id"], "thread_conversation_10");
    assert_eq!(first["changes"]["name"], "Kickoff");
}

#[tokio::test]
async fn list_creation_order_and_cursor() {
    let (_dir, pool) = setup();
    seed(&pool);
    let app = test_app(pool);

    let (_, body) = get_json(app.clone(), "/api/activities?order=creation").await;
    assert_eq!(activity_ids(&body), vec![3, 2, 1]);

    let (_, body) = get_json(app.clone(), "/api/activities?order=creation&before=3").await;
    assert_eq!(activity_ids(&body), vec![2, 1]);

    let (_, body) = get_json(app, "/api/activities?order=creation&after=1").await;
    assert_eq!(activity_ids(&body), vec![3, 2]);
}

#[tokio::test]
async fn list_thread_cursor_skips_chained_peers() {
    let (_dir, pool) = setup();
    seed(&pool);

    let (_, body) = get_json(test_app(pool), "/api/activities?before=1").await;

    assert_eq!(activity_ids(&body), vec![2]);
}

#[tokio::test]
async fn list_next_cursor_holds_across_a_thread_bump() {
    let (_dir, pool) = setup();
    seed(&pool);
    {
        let conn = pool.get().expect("should get connection");
        let project = Entity::new(EntityKind::Project, 1);
        let mut planning = Entity::new(EntityKind::Conversation, 11);
        planning.project_id = Some(1);
        planning.user_id = Some(1);
        save_entity(&conn, &planning).expect("save conversation");
        log_activity(&conn, Some(&project), &planning, "create", 1)
            .expect("log should succeed")
            .expect("log should not be suppressed");
    }
    let app = test_app(pool.clone());

    let (_, first) = get_json(app.clone(), "/api/activities?threads=true&limit=2").await;
    assert_eq!(activity_ids(&first), vec![4, 1]);
    assert_eq!(first["next"]["before"], 1);
    assert_eq!(first["next"]["before_effective_id"], 3);

    // A reply on Kickoff moves activity 1 to the top of the feed.
    {
        let conn = pool.get().expect("should get connection");
        let project = Entity::new(EntityKind::Project, 1);
        let mut reply = Entity::new(EntityKind::Comment, 6);
        reply.project_id = Some(1);
        reply.user_id = Some(1);
        reply.parent = Some(Entity::new(EntityKind::Conversation, 10).entity_ref);
        save_entity(&conn, &reply).expect("save comment");
        log_activity(&conn, Some(&project), &reply, "create", 1)
            .expect("log should succeed")
            .expect("log should not be suppressed");
    }

    let (_, second) = get_json(
        app,
        "/api/activities?threads=true&limit=2&before=1&before_effective_id=3",
    )
    .await;
    assert_eq!(activity_ids(&second), vec![2]);
    assert!(second["next"].is_null());
}

#[tokio::test]
async fn list_scopes_by_project_list_and_user() {
    let (_dir, pool) = setup();
    seed(&pool);
    let app = test_app(pool);

    let (_, body) = get_json(app.clone(), "/api/activities?project_id=2").await;
    assert_eq!(body["count"], 0);

    let (_, body) = get_json(app.clone(), "/api/activities?project_id=2,1").await;
    assert_eq!(body["count"], 3);

    let (_, body) = get_json(app, "/api/activities?user_id=7").await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn list_limit_is_respected() {
    let (_dir, pool) = setup();
    seed(&pool);

    let app = test_app(pool);

    let (_, body) = get_json(app.clone(), "/api/activities?limit=2").await;
    assert_eq!(activity_ids(&body), vec![3, 1]);
    assert_eq!(body["next"]["before"], 1);

    let (_, body) = get_json(app, "/api/activities?limit=3").await;
    assert_eq!(body["count"], 3);
    assert!(!body["next"].is_null());
}

#[tokio::test]
async fn list_rejects_bad_parameters() {
    let (_dir, pool) = setup();
    seed(&pool);
    let app = test_app(pool);

    let (status, body) = get_json(app.clone(), "/api/activities?order=random").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("error message").contains("random"));

    let (status, _) = get_json(app.clone(), "/api/activities?project_id=one").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(app, "/api/activities?before=999").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Single activity ──────────────────────────────────────────────────

#[tokio::test]
async fn get_activity_returns_feed_shape() {
    let (_dir, pool) = setup();
    seed(&pool);

    let (status, body) = get_json(test_app(pool), "/api/activities/3").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activity_id"], "comment_5");
    assert_eq!(body["action_type"], "create_comment");
    assert_eq!(body["comment_target_type"], "Conversation");
    assert_eq!(body["comment_target_id"], 10);
    assert_eq!(body["thread_id"], "Conversation_10");
}

#[tokio::test]
async fn get_missing_activity_is_not_found() {
    let (_dir, pool) = setup();

    let (status, body) = get_json(test_app(pool), "/api/activities/999").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

// ── Push payload ─────────────────────────────────────────────────────

#[tokio::test]
async fn push_payload_nests_conversation_comments() {
    let (_dir, pool) = setup();
    seed(&pool);

    let (status, body) = get_json(test_app(pool), "/api/activities/1/push").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["push"], true);
    assert_eq!(body["payload"]["type"], "Activity");
    let comments = body["payload"]["target"]["comments"]
        .as_array()
        .expect("comments should be an array");
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["body"], "Welcome");
}

#[tokio::test]
async fn push_gate_honours_suppressed_targets() {
    let (_dir, pool) = setup();
    seed(&pool);

    let (status, body) = get_json(test_app(pool), "/api/activities/2/push").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["push"], false);
    assert_eq!(body["payload"]["target_type"], "Page");
}
