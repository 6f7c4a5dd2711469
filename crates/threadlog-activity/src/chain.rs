//! Thread chain maintenance.
//!
//! Every comment activity re-points its thread root's `last_activity_id` at
//! itself, so ordering by `COALESCE(last_activity_id, id)` surfaces threads
//! by their latest reply. The pointer always targets the comment directly;
//! it never hops through another comment.
//!
//! This module is the only writer of `last_activity_id`.
//!
//! Concurrent comments on the same thread race on the root's pointer. The
//! last committed write wins, even if it carries the smaller id.

use rusqlite::{params, Connection, OptionalExtension};

use crate::record::EventRecord;

/// Points the thread root of a comment activity at that activity.
///
/// The root is the most recent other activity whose target is the comment's
/// target. Returns the root's id, or `None` when `record` is not a comment
/// or no root exists yet.
pub(crate) fn touch_thread(
    conn: &Connection,
    record: &EventRecord,
) -> Result<Option<i64>, rusqlite::Error> {
    let Some(comment_target) = record.comment_target.as_ref() else {
        return Ok(None);
    };
    if !record.is_comment() {
        return Ok(None);
    }

    let root_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM activities
             WHERE target_type = ?1 AND target_id = ?2 AND id <> ?3
             ORDER BY id DESC
             LIMIT 1",
            params![comment_target.kind.as_str(), comment_target.id, record.id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(root_id) = root_id else {
        tracing::debug!(
            activity_id = record.id,
            thread = %comment_target,
            "no thread root to chain"
        );
        return Ok(None);
    };

    set_chain_pointer(conn, root_id, record.id)?;

    tracing::debug!(
        activity_id = record.id,
        root_id,
        thread = %comment_target,
        "chained activity to thread root"
    );

    Ok(Some(root_id))
}

/// Repairs chain pointers that reference an activity about to be removed.
///
/// Each affected root is re-pointed at its freshest remaining comment, or
/// cleared when none is left. Returns the number of roots updated.
pub(crate) fn unlink(conn: &Connection, removed: &EventRecord) -> Result<usize, rusqlite::Error> {
    let repaired = conn.execute(
        "UPDATE activities
         SET last_activity_id = (
            SELECT MAX(c.id) FROM activities c
            WHERE c.comment_target_type = activities.target_type
              AND c.comment_target_id = activities.target_id
              AND c.target_type = 'Comment'
              AND c.id > activities.id
              AND c.id <> ?1
         )
         WHERE last_activity_id = ?1",
        params![removed.id],
    )?;

    if repaired > 0 {
        tracing::debug!(
            activity_id = removed.id,
            repaired,
            "re-pointed thread roots away from removed activity"
        );
    }

    Ok(repaired)
}

fn set_chain_pointer(
    conn: &Connection,
    root_id: i64,
    last_activity_id: i64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE activities SET last_activity_id = ?2 WHERE id = ?1",
        params![root_id, last_activity_id],
    )?;
    Ok(())
}
