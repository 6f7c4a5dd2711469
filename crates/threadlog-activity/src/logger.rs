//! Entry points that write the activity log.
//!
//! [`log_activity`] records one domain action and chains comment activities
//! to their thread root. [`remove_log`] retracts the most recent matching
//! record.

use rusqlite::{params, Connection, OptionalExtension};
use threadlog_types::{Entity, EntityRef};

use crate::chain;
use crate::error::ActivityError;
use crate::record::{EventRecord, ACTIVITY_COLUMNS};

/// Records `action` performed by `creator_id` on `target`.
///
/// Returns `Ok(None)` without writing when `project` is bulk-importing.
/// Comment targets get their comment target filled from the comment's
/// parent, and `created_at` is backdated to the target's own `updated_at`
/// (or `created_at`) when it has one.
///
/// The record is committed before its thread root is touched. Once this
/// returns `Ok`, the root's chain pointer already names the new record.
///
/// # Errors
///
/// - `ActivityError::InvalidRecord` if `target` is a comment with no parent.
/// - `ActivityError::Storage` if the insert fails; nothing is written.
/// - `ActivityError::ChainUpdate` if the record was written but the thread
///   root could not be updated.
pub fn log_activity(
    conn: &Connection,
    project: Option<&Entity>,
    target: &Entity,
    action: &str,
    creator_id: i64,
) -> Result<Option<EventRecord>, ActivityError> {
    if let Some(project) = project.filter(|p| p.is_importing()) {
        tracing::debug!(
            project_id = project.id(),
            entity = %target.entity_ref,
            action,
            "project is importing, activity suppressed"
        );
        return Ok(None);
    }

    let comment_target = if target.kind().is_comment() {
        let parent = target.parent.as_ref().ok_or_else(|| {
            ActivityError::InvalidRecord(format!(
                "comment {} has no target to thread under",
                target.entity_ref
            ))
        })?;
        Some(parent)
    } else {
        None
    };

    let occurred_at = target
        .updated_at
        .as_deref()
        .or(target.created_at.as_deref());

    let record = conn.query_row(
        &format!(
            "INSERT INTO activities (
                project_id, user_id, action, target_type, target_id,
                comment_target_type, comment_target_id, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                COALESCE(?8, datetime('now')), datetime('now')
            )
            RETURNING {ACTIVITY_COLUMNS}"
        ),
        params![
            project.map(Entity::id),
            creator_id,
            action,
            target.kind().as_str(),
            target.id(),
            comment_target.map(|c| c.kind.as_str()),
            comment_target.map(|c| c.id),
            occurred_at,
        ],
        EventRecord::from_row,
    )?;

    tracing::debug!(
        activity_id = record.id,
        action_type = %record.action_type(),
        "logged activity"
    );

    if record.comment_target.is_some() {
        chain::touch_thread(conn, &record).map_err(|source| {
            tracing::error!(
                activity_id = record.id,
                thread = %record.thread_key(),
                error = %source,
                "activity recorded but thread chain update failed"
            );
            ActivityError::ChainUpdate {
                activity_id: record.id,
                source,
            }
        })?;
    }

    Ok(Some(record))
}

/// Removes the most recent activity matching `(project, target, action)`.
///
/// Thread roots chained to the removed record are re-pointed at their
/// freshest remaining comment. Returns whether a record was removed.
///
/// # Errors
///
/// Returns `ActivityError::Storage` on SQL failure; the removal and the
/// chain repair are rolled back together.
pub fn remove_log(
    conn: &Connection,
    project: Option<&Entity>,
    target: &EntityRef,
    action: &str,
) -> Result<bool, ActivityError> {
    let tx = conn.unchecked_transaction()?;

    let found = tx
        .query_row(
            &format!(
                "SELECT {ACTIVITY_COLUMNS} FROM activities
                 WHERE project_id IS ?1 AND target_type = ?2 AND target_id = ?3 AND action = ?4
                 ORDER BY id DESC
                 LIMIT 1"
            ),
            params![
                project.map(Entity::id),
                target.kind.as_str(),
                target.id,
                action
            ],
            EventRecord::from_row,
        )
        .optional()?;

    let Some(record) = found else {
        tracing::debug!(entity = %target, action, "no activity to remove");
        return Ok(false);
    };

    chain::unlink(&tx, &record)?;
    tx.execute("DELETE FROM activities WHERE id = ?1", [record.id])?;
    tx.commit()?;

    tracing::debug!(activity_id = record.id, entity = %target, action, "removed activity");
    Ok(true)
}
