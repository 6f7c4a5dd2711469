//! Projection of activities into the feed (API) shape and the push payload.
//!
//! Both shapes share the same base mapping. They differ in which related
//! entities are nested: the feed shape takes an explicit [`ApiOptions`],
//! while the push payload picks its nesting from [`push_includes`], a closed
//! match over the target's kind.
//!
//! Absent entities are omitted, never reported as errors: a hard-deleted
//! target still yields `target_type`/`target_id` but no nested `target` and
//! no `changes`.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Map, Value};
use threadlog_types::{Entity, EntityKind, EntityRef};

use crate::error::ActivityError;
use crate::resolver::{ActivityView, EntityStore, Visibility};

/// Type tag emitted for activities when `emit_type` is set.
const ACTIVITY_TYPE: &str = "Activity";

/// Top-level entities nested into an activity shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Include {
    Project,
    User,
    Target,
}

/// Related entities nested into a serialized target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetInclude {
    /// The target's project (name, permalink).
    Project,
    /// The target's creator.
    User,
    /// The target's live comments.
    Comments,
    /// The user a task is assigned to.
    Assigned,
    /// The list a task belongs to.
    TaskList,
    /// The entity a comment was posted against.
    Target,
    /// Page slot positions.
    Slots,
    /// Objects placed on a page.
    Objects,
    /// The page a note or divider sits on.
    Page,
}

/// Options for serializing the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetOptions {
    pub emit_type: bool,
    pub include: Vec<TargetInclude>,
}

/// Options for [`ActivityView::to_api_hash`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiOptions {
    pub include: Vec<Include>,
    pub emit_type: bool,
    pub target: TargetOptions,
}

impl ApiOptions {
    /// Options used by feed listings: project, user and type-tagged target.
    pub fn feed() -> Self {
        Self {
            include: vec![Include::Project, Include::User, Include::Target],
            emit_type: false,
            target: TargetOptions {
                emit_type: true,
                include: Vec::new(),
            },
        }
    }
}

/// Nesting chosen for a push payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushIncludes {
    pub include: &'static [Include],
    pub target_include: &'static [TargetInclude],
}

const DEFAULT_INCLUDES: &[Include] = &[Include::Target, Include::Project, Include::User];

/// The push dispatch table.
pub fn push_includes(kind: &EntityKind) -> PushIncludes {
    use TargetInclude as T;

    let (include, target_include): (&'static [Include], &'static [TargetInclude]) = match kind {
        EntityKind::User => (&[], &[]),
        EntityKind::Project => (&[Include::User], &[T::User]),
        EntityKind::Task => (
            DEFAULT_INCLUDES,
            &[T::Project, T::User, T::Comments, T::Assigned, T::TaskList],
        ),
        EntityKind::Comment => (DEFAULT_INCLUDES, &[T::Project, T::User, T::Target]),
        EntityKind::Conversation => (DEFAULT_INCLUDES, &[T::Project, T::User, T::Comments]),
        EntityKind::Page => (
            DEFAULT_INCLUDES,
            &[T::Project, T::User, T::Slots, T::Objects],
        ),
        EntityKind::Note | EntityKind::Divider => {
            (DEFAULT_INCLUDES, &[T::Project, T::User, T::Page])
        }
        EntityKind::Person | EntityKind::TaskList | EntityKind::Upload | EntityKind::Other(_) => {
            (DEFAULT_INCLUDES, &[T::Project, T::User])
        }
    };

    PushIncludes {
        include,
        target_include,
    }
}

/// Push payload plus the delivery gate handed to the realtime transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushEnvelope {
    pub push: bool,
    pub payload: Map<String, Value>,
}

/// Kinds placed on a page.
const PAGE_OBJECT_KINDS: &[EntityKind] = &[EntityKind::Note, EntityKind::Divider, EntityKind::Upload];

impl<S: EntityStore + ?Sized> ActivityView<'_, S> {
    /// Builds the feed (API) shape.
    ///
    /// # Errors
    ///
    /// Returns `ActivityError::Storage` if resolution hits a storage fault.
    pub fn to_api_hash(&self, options: &ApiOptions) -> Result<Map<String, Value>, ActivityError> {
        let record = self.record();
        let mut base = Map::new();

        base.insert("id".into(), json!(record.id));
        base.insert("last_activity_id".into(), json!(record.last_activity_id()));
        base.insert("action".into(), json!(record.action));
        base.insert("created_at".into(), json!(api_time(&record.created_at)));
        base.insert("updated_at".into(), json!(api_time(&record.updated_at)));
        base.insert("user_id".into(), json!(record.user_id));
        base.insert("project_id".into(), json!(record.project_id));
        base.insert("target_id".into(), json!(record.target.id));
        base.insert("target_type".into(), json!(record.target.kind.as_str()));
        base.insert("action_type".into(), json!(record.action_type()));
        base.insert(
            "comment_target_id".into(),
            json!(record.comment_target.as_ref().map(|c| c.id)),
        );
        base.insert(
            "comment_target_type".into(),
            json!(record.comment_target.as_ref().map(|c| c.kind.as_str())),
        );
        base.insert("activity_id".into(), json!(record.client_activity_id()));
        base.insert("thread_id".into(), json!(record.thread_id()));

        if let Some(target) = self.target()? {
            let changes = if record.is_creation() {
                target.attributes.clone()
            } else {
                target.previous_changes.clone()
            };
            base.insert("changes".into(), Value::Object(changes));
        }

        if options.emit_type {
            base.insert("type".into(), json!(ACTIVITY_TYPE));
        }

        if options.include.contains(&Include::Project) {
            if let Some(project) = self.project()? {
                base.insert("project".into(), project_summary(project));
            }
        }

        if options.include.contains(&Include::Target) {
            if let Some(target) = self.target()? {
                let nested = entity_hash(self, target, &options.target)?;
                base.insert("target".into(), Value::Object(nested));
            }
        }

        if options.include.contains(&Include::User) {
            if let Some(user) = self.user()? {
                base.insert("user".into(), user_summary(user));
            }
        }

        Ok(base)
    }

    /// Builds the push payload, nesting per [`push_includes`] and merging
    /// `overrides` on top. Override keys win.
    pub fn to_push_data(
        &self,
        overrides: Map<String, Value>,
    ) -> Result<Map<String, Value>, ActivityError> {
        let includes = push_includes(&self.record().target.kind);
        let options = ApiOptions {
            include: includes.include.to_vec(),
            emit_type: true,
            target: TargetOptions {
                emit_type: true,
                include: includes.target_include.to_vec(),
            },
        };

        let mut data = self.to_api_hash(&options)?;
        data.extend(overrides);
        Ok(data)
    }

    /// The push payload together with [`ActivityView::eligible_for_push`].
    pub fn push_payload(
        &self,
        overrides: Map<String, Value>,
    ) -> Result<PushEnvelope, ActivityError> {
        Ok(PushEnvelope {
            push: self.eligible_for_push()?,
            payload: self.to_push_data(overrides)?,
        })
    }
}

/// Serializes a related entity with its requested nesting.
fn entity_hash<S: EntityStore + ?Sized>(
    view: &ActivityView<'_, S>,
    entity: &Entity,
    options: &TargetOptions,
) -> Result<Map<String, Value>, ActivityError> {
    let store = view.store();
    let mut hash = basic_hash(entity, options.emit_type);

    for include in &options.include {
        match include {
            TargetInclude::Project => {
                if let Some(project) = lookup_opt(store, EntityKind::Project, entity.project_id)? {
                    hash.insert("project".into(), project_summary(&project));
                }
            }
            TargetInclude::User => {
                if let Some(user) = view.lookup_user(entity.user_id)? {
                    hash.insert("user".into(), user_summary(&user));
                }
            }
            TargetInclude::Comments => {
                let comments = store.children(&entity.entity_ref, &[EntityKind::Comment])?;
                let comments: Vec<Value> = comments
                    .iter()
                    .map(|c| Value::Object(basic_hash(c, true)))
                    .collect();
                hash.insert("comments".into(), Value::Array(comments));
            }
            TargetInclude::Assigned => {
                let assigned = lookup_opt(store, EntityKind::User, entity.attr_i64("assigned_id"))?;
                if let Some(user) = assigned {
                    hash.insert("assigned".into(), user_summary(&user));
                }
            }
            TargetInclude::TaskList => {
                if let Some(list) = parent_of_kind(store, entity, &EntityKind::TaskList)? {
                    hash.insert("task_list".into(), Value::Object(basic_hash(&list, true)));
                }
            }
            TargetInclude::Target => {
                if let Some(parent) = &entity.parent {
                    if let Some(commented) = store.lookup(parent, Visibility::WithDeleted)? {
                        hash.insert("target".into(), Value::Object(basic_hash(&commented, true)));
                    }
                }
            }
            TargetInclude::Slots => {
                let slots: Vec<Value> = store
                    .children(&entity.entity_ref, PAGE_OBJECT_KINDS)?
                    .iter()
                    .map(|object| {
                        json!({
                            "position": object.position,
                            "rel_object_type": object.kind().as_str(),
                            "rel_object_id": object.id(),
                        })
                    })
                    .collect();
                hash.insert("slots".into(), Value::Array(slots));
            }
            TargetInclude::Objects => {
                let objects: Vec<Value> = store
                    .children(&entity.entity_ref, PAGE_OBJECT_KINDS)?
                    .iter()
                    .map(|object| Value::Object(basic_hash(object, true)))
                    .collect();
                hash.insert("objects".into(), Value::Array(objects));
            }
            TargetInclude::Page => {
                if let Some(page) = parent_of_kind(store, entity, &EntityKind::Page)? {
                    hash.insert("page".into(), Value::Object(basic_hash(&page, true)));
                }
            }
        }
    }

    Ok(hash)
}

/// An entity's own fields and attributes, without nesting.
///
/// Fixed fields take precedence over attributes of the same name.
pub fn basic_hash(entity: &Entity, emit_type: bool) -> Map<String, Value> {
    let mut hash = entity.attributes.clone();

    hash.insert("id".into(), json!(entity.id()));
    hash.insert("project_id".into(), json!(entity.project_id));
    hash.insert("user_id".into(), json!(entity.user_id));
    if let Some(created_at) = &entity.created_at {
        hash.insert("created_at".into(), json!(api_time(created_at)));
    }
    if let Some(updated_at) = &entity.updated_at {
        hash.insert("updated_at".into(), json!(api_time(updated_at)));
    }
    if let Some(parent) = &entity.parent {
        hash.insert("parent_type".into(), json!(parent.kind.as_str()));
        hash.insert("parent_id".into(), json!(parent.id));
    }
    if entity.is_deleted() {
        hash.insert("deleted".into(), json!(true));
    }
    if emit_type {
        hash.insert("type".into(), json!(entity.kind().as_str()));
    }

    hash
}

fn project_summary(project: &Entity) -> Value {
    json!({
        "name": project.attr_str("name"),
        "permalink": project.attr_str("permalink"),
    })
}

fn user_summary(user: &Entity) -> Value {
    json!({
        "username": user.attr_str("login"),
        "first_name": user.attr_str("first_name"),
        "last_name": user.attr_str("last_name"),
        "avatar_url": avatar_url(user, "thumb"),
        "micro_avatar_url": avatar_url(user, "micro"),
    })
}

/// Avatar URL at `size`, falling back to the unsized `avatar_url` attribute.
fn avatar_url<'e>(user: &'e Entity, size: &str) -> Option<&'e str> {
    user.attr_str(&format!("avatar_{size}_url"))
        .or_else(|| user.attr_str("avatar_url"))
}

fn lookup_opt<S: EntityStore + ?Sized>(
    store: &S,
    kind: EntityKind,
    id: Option<i64>,
) -> Result<Option<Entity>, ActivityError> {
    match id {
        Some(id) => store.lookup(&EntityRef::new(kind, id), Visibility::WithDeleted),
        None => Ok(None),
    }
}

fn parent_of_kind<S: EntityStore + ?Sized>(
    store: &S,
    entity: &Entity,
    kind: &EntityKind,
) -> Result<Option<Entity>, ActivityError> {
    match &entity.parent {
        Some(parent) if &parent.kind == kind => store.lookup(parent, Visibility::WithDeleted),
        _ => Ok(None),
    }
}

/// Renders a stored `YYYY-MM-DD HH:MM:SS` UTC timestamp as RFC 3339.
/// Values in any other shape pass through unchanged.
pub fn api_time(raw: &str) -> String {
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        Ok(parsed) => parsed.and_utc().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        Err(_) => raw.to_string(),
    }
}
