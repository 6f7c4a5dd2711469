//! SQLite-backed [`EntityStore`] over the `entities` table.
//!
//! The activity log treats the entity store as external; this implementation
//! exists so the server and tests have a concrete store sharing the activity
//! log's database. Writes go through [`save_entity`], [`soft_delete_entity`]
//! and [`hard_delete_entity`].

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use threadlog_types::{Entity, EntityKind, EntityRef};

use crate::error::ActivityError;
use crate::resolver::{EntityStore, ThreadComments, Visibility};

/// How many trailing comments [`EntityStore::thread_comments`] returns.
pub const RECENT_COMMENTS: usize = 2;

const ENTITY_COLUMNS: &str = "entity_type, entity_id, project_id, user_id, parent_type, parent_id, \
     position, attributes_json, previous_changes_json, dont_push, created_at, updated_at, deleted_at";

/// Entity store reading from the `entities` table on one connection.
pub struct SqliteEntityStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteEntityStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl EntityStore for SqliteEntityStore<'_> {
    fn lookup(
        &self,
        entity: &EntityRef,
        visibility: Visibility,
    ) -> Result<Option<Entity>, ActivityError> {
        let with_deleted = visibility == Visibility::WithDeleted;
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE entity_type = ?1 AND entity_id = ?2 AND (?3 OR deleted_at IS NULL)"
        );

        let raw = self
            .conn
            .query_row(
                &sql,
                params![entity.kind.as_str(), entity.id, with_deleted],
                RawEntity::from_row,
            )
            .optional()?;

        raw.map(RawEntity::into_entity).transpose()
    }

    fn children(
        &self,
        parent: &EntityRef,
        kinds: &[EntityKind],
    ) -> Result<Vec<Entity>, ActivityError> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (0..kinds.len()).map(|i| format!("?{}", i + 3)).collect();
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE parent_type = ?1 AND parent_id = ?2
               AND deleted_at IS NULL
               AND entity_type IN ({})
             ORDER BY COALESCE(position, entity_id) ASC, entity_id ASC",
            placeholders.join(", ")
        );

        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
            Box::new(parent.kind.as_str().to_string()),
            Box::new(parent.id),
        ];
        for kind in kinds {
            param_values.push(Box::new(kind.as_str().to_string()));
        }
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| &**p).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), RawEntity::from_row)?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?.into_entity()?);
        }
        Ok(entities)
    }

    fn thread_comments(&self, thread: &Entity) -> Result<Option<ThreadComments>, ActivityError> {
        if !thread.kind().is_thread_root() {
            return Ok(None);
        }

        let mut comments = self.children(&thread.entity_ref, &[EntityKind::Comment])?;
        if comments.is_empty() {
            return Ok(Some(ThreadComments::default()));
        }

        let first = comments.remove(0);
        let skip = comments.len().saturating_sub(RECENT_COMMENTS);
        let recent = comments.split_off(skip);

        Ok(Some(ThreadComments {
            first: Some(first),
            recent,
        }))
    }

    fn push_suppressed(&self, entity: &Entity) -> bool {
        entity.dont_push
    }
}

/// Inserts or replaces an entity row.
///
/// Missing timestamps default to the current time.
pub fn save_entity(conn: &Connection, entity: &Entity) -> Result<(), ActivityError> {
    let attributes = serde_json::to_string(&entity.attributes)?;
    let previous_changes = serde_json::to_string(&entity.previous_changes)?;
    let (parent_type, parent_id) = match &entity.parent {
        Some(parent) => (Some(parent.kind.as_str().to_string()), Some(parent.id)),
        None => (None, None),
    };

    conn.execute(
        "INSERT OR REPLACE INTO entities (
            entity_type, entity_id, project_id, user_id, parent_type, parent_id,
            position, attributes_json, previous_changes_json, dont_push,
            created_at, updated_at, deleted_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
            COALESCE(?11, datetime('now')), COALESCE(?12, datetime('now')), ?13
        )",
        params![
            entity.kind().as_str(),
            entity.id(),
            entity.project_id,
            entity.user_id,
            parent_type,
            parent_id,
            entity.position,
            attributes,
            previous_changes,
            entity.dont_push,
            entity.created_at,
            entity.updated_at,
            entity.deleted_at,
        ],
    )?;
    Ok(())
}

/// Marks an entity deleted while keeping it resolvable with
/// [`Visibility::WithDeleted`]. Returns whether a live row was found.
pub fn soft_delete_entity(conn: &Connection, entity: &EntityRef) -> Result<bool, ActivityError> {
    let changed = conn.execute(
        "UPDATE entities SET deleted_at = datetime('now')
         WHERE entity_type = ?1 AND entity_id = ?2 AND deleted_at IS NULL",
        params![entity.kind.as_str(), entity.id],
    )?;
    Ok(changed > 0)
}

/// Removes an entity row outright. Activities referencing it keep their
/// reference but resolve to nothing.
pub fn hard_delete_entity(conn: &Connection, entity: &EntityRef) -> Result<bool, ActivityError> {
    let changed = conn.execute(
        "DELETE FROM entities WHERE entity_type = ?1 AND entity_id = ?2",
        params![entity.kind.as_str(), entity.id],
    )?;
    Ok(changed > 0)
}

/// Row image before JSON decoding, which can fail outside rusqlite's error type.
struct RawEntity {
    kind: String,
    id: i64,
    project_id: Option<i64>,
    user_id: Option<i64>,
    parent_type: Option<String>,
    parent_id: Option<i64>,
    position: Option<i64>,
    attributes_json: String,
    previous_changes_json: String,
    dont_push: bool,
    created_at: Option<String>,
    updated_at: Option<String>,
    deleted_at: Option<String>,
}

impl RawEntity {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            kind: row.get(0)?,
            id: row.get(1)?,
            project_id: row.get(2)?,
            user_id: row.get(3)?,
            parent_type: row.get(4)?,
            parent_id: row.get(5)?,
            position: row.get(6)?,
            attributes_json: row.get(7)?,
            previous_changes_json: row.get(8)?,
            dont_push: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            deleted_at: row.get(12)?,
        })
    }

    fn into_entity(self) -> Result<Entity, ActivityError> {
        let parent = match (self.parent_type, self.parent_id) {
            (Some(kind), Some(id)) => Some(EntityRef::new(EntityKind::from_tag(&kind), id)),
            _ => None,
        };

        Ok(Entity {
            entity_ref: EntityRef::new(EntityKind::from_tag(&self.kind), self.id),
            project_id: self.project_id,
            user_id: self.user_id,
            parent,
            position: self.position,
            attributes: decode_object(&self.attributes_json)?,
            previous_changes: decode_object(&self.previous_changes_json)?,
            dont_push: self.dont_push,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

fn decode_object(json: &str) -> Result<Map<String, Value>, ActivityError> {
    match serde_json::from_str(json)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ActivityError::InvalidRecord(format!(
            "entity attributes must be a JSON object, got {other}"
        ))),
    }
}
