//! Shared types for the threadlog workspace.
//!
//! This crate provides the foundational types used across all threadlog
//! crates: the closed set of entity kinds an activity can reference, the
//! polymorphic `(type, id)` reference, and the resolved entity snapshot
//! returned by an entity store.
//!
//! Nothing here performs I/O. Resolution lives in `threadlog-activity`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kinds of entity an activity may reference.
///
/// The set is closed for dispatch purposes. Type tags that are not part of
/// the set still resolve, and are carried as [`EntityKind::Other`] so that a
/// stored activity never becomes unreadable because its tag is unfamiliar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EntityKind {
    /// A platform user account.
    User,
    /// A user's membership in a project.
    Person,
    /// A project, the scoping unit for most activities.
    Project,
    /// A task inside a task list.
    Task,
    /// A list grouping tasks.
    TaskList,
    /// A comment posted against another entity.
    Comment,
    /// A discussion thread.
    Conversation,
    /// A page made of ordered slots.
    Page,
    /// A text note placed on a page.
    Note,
    /// A divider placed on a page.
    Divider,
    /// An uploaded file.
    Upload,
    /// Any type tag outside the known set.
    Other(String),
}

impl EntityKind {
    /// Returns the type tag stored in the `*_type` columns.
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "User",
            Self::Person => "Person",
            Self::Project => "Project",
            Self::Task => "Task",
            Self::TaskList => "TaskList",
            Self::Comment => "Comment",
            Self::Conversation => "Conversation",
            Self::Page => "Page",
            Self::Note => "Note",
            Self::Divider => "Divider",
            Self::Upload => "Upload",
            Self::Other(tag) => tag,
        }
    }

    /// Parses a stored type tag. Unknown tags become [`EntityKind::Other`].
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "User" => Self::User,
            "Person" => Self::Person,
            "Project" => Self::Project,
            "Task" => Self::Task,
            "TaskList" => Self::TaskList,
            "Comment" => Self::Comment,
            "Conversation" => Self::Conversation,
            "Page" => Self::Page,
            "Note" => Self::Note,
            "Divider" => Self::Divider,
            "Upload" => Self::Upload,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether entities of this kind are comments posted against a parent.
    pub fn is_comment(&self) -> bool {
        matches!(self, Self::Comment)
    }

    /// Whether entities of this kind open a thread of comments.
    pub fn is_thread_root(&self) -> bool {
        matches!(self, Self::Conversation | Self::Task)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EntityKind {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A polymorphic `(type, id)` reference to an entity in the external store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// The referenced entity's kind.
    pub kind: EntityKind,
    /// The referenced entity's id within its kind.
    pub id: i64,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// A resolved entity snapshot as returned by an entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// The entity's own reference.
    pub entity_ref: EntityRef,
    /// The project the entity belongs to, if any.
    pub project_id: Option<i64>,
    /// The user that created or owns the entity, if any.
    pub user_id: Option<i64>,
    /// The owning entity: a comment's target, a task's list, a note's page.
    pub parent: Option<EntityRef>,
    /// Ordering position within the parent (page slots).
    pub position: Option<i64>,
    /// The full attribute set.
    pub attributes: Map<String, Value>,
    /// Attributes changed by the most recent save, as `[old, new]` pairs.
    pub previous_changes: Map<String, Value>,
    /// Suppresses realtime delivery of activities about this entity.
    pub dont_push: bool,
    /// Creation time, `YYYY-MM-DD HH:MM:SS` UTC.
    pub created_at: Option<String>,
    /// Last update time, `YYYY-MM-DD HH:MM:SS` UTC.
    pub updated_at: Option<String>,
    /// Soft-deletion time. `None` for live entities.
    pub deleted_at: Option<String>,
}

impl Entity {
    /// Creates a live entity with no attributes.
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self {
            entity_ref: EntityRef::new(kind, id),
            project_id: None,
            user_id: None,
            parent: None,
            position: None,
            attributes: Map::new(),
            previous_changes: Map::new(),
            dont_push: false,
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }

    pub fn kind(&self) -> &EntityKind {
        &self.entity_ref.kind
    }

    pub fn id(&self) -> i64 {
        self.entity_ref.id
    }

    /// Returns a string attribute, if present.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Returns an integer attribute, if present.
    pub fn attr_i64(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(Value::as_i64)
    }

    /// Returns a boolean attribute, treating absence as `false`.
    pub fn attr_flag(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether this is a project that is currently bulk-importing.
    pub fn is_importing(&self) -> bool {
        matches!(self.kind(), EntityKind::Project) && self.attr_flag("is_importing")
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
