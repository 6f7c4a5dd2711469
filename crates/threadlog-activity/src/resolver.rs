//! Resolution of polymorphic references through the external entity store.
//!
//! The store is consumed through [`EntityStore`]. Capabilities that only some
//! kinds support (comment threads, push suppression) are trait methods with
//! a "not supported" default, so callers never inspect kinds themselves.
//!
//! [`ActivityView`] binds one [`EventRecord`] to a store and memoizes every
//! lookup it performs. The memo lives exactly as long as the view: it is
//! never shared between records or requests, so soft-delete state is read
//! fresh for every operation.

use std::cell::OnceCell;

use threadlog_types::{Entity, EntityKind, EntityRef};

use crate::error::ActivityError;
use crate::record::EventRecord;

/// Whether soft-deleted entities are visible to a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Only live entities resolve.
    LiveOnly,
    /// Soft-deleted entities resolve too. Hard-deleted ones never do.
    WithDeleted,
}

/// The comment summary of an entity that carries a comment thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadComments {
    /// The comment that opened the thread.
    pub first: Option<Entity>,
    /// The latest comments, oldest first, excluding `first`.
    pub recent: Vec<Entity>,
}

/// Read access to the external entity store.
pub trait EntityStore {
    /// Resolves a reference. Returns `Ok(None)` when nothing is visible.
    fn lookup(
        &self,
        entity: &EntityRef,
        visibility: Visibility,
    ) -> Result<Option<Entity>, ActivityError>;

    /// Live entities of the given kinds owned by `parent`, by position then id.
    fn children(
        &self,
        parent: &EntityRef,
        kinds: &[EntityKind],
    ) -> Result<Vec<Entity>, ActivityError>;

    /// Comment summary for `thread`. `None` means the entity has no comment
    /// thread at all, as opposed to an empty one.
    fn thread_comments(&self, _thread: &Entity) -> Result<Option<ThreadComments>, ActivityError> {
        Ok(None)
    }

    /// Whether realtime delivery is suppressed for activities about `entity`.
    fn push_suppressed(&self, _entity: &Entity) -> bool {
        false
    }
}

/// One activity bound to a store, with per-view memoized resolution.
pub struct ActivityView<'a, S: EntityStore + ?Sized> {
    record: &'a EventRecord,
    store: &'a S,
    target: OnceCell<Option<Entity>>,
    comment_target: OnceCell<Option<Entity>>,
    user: OnceCell<Option<Entity>>,
    project: OnceCell<Option<Entity>>,
}

impl<'a, S: EntityStore + ?Sized> ActivityView<'a, S> {
    pub fn new(record: &'a EventRecord, store: &'a S) -> Self {
        Self {
            record,
            store,
            target: OnceCell::new(),
            comment_target: OnceCell::new(),
            user: OnceCell::new(),
            project: OnceCell::new(),
        }
    }

    pub fn record(&self) -> &'a EventRecord {
        self.record
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    /// The target entity, including soft-deleted ones.
    pub fn target(&self) -> Result<Option<&Entity>, ActivityError> {
        memoized(&self.target, || {
            self.store
                .lookup(&self.record.target, Visibility::WithDeleted)
        })
    }

    /// The entity a comment target was posted against.
    pub fn comment_target(&self) -> Result<Option<&Entity>, ActivityError> {
        memoized(&self.comment_target, || match &self.record.comment_target {
            Some(reference) => self.store.lookup(reference, Visibility::WithDeleted),
            None => Ok(None),
        })
    }

    /// The user that performed the action.
    pub fn user(&self) -> Result<Option<&Entity>, ActivityError> {
        memoized(&self.user, || {
            self.store.lookup(
                &EntityRef::new(EntityKind::User, self.record.user_id),
                Visibility::WithDeleted,
            )
        })
    }

    /// The scoping project, if the record has one.
    pub fn project(&self) -> Result<Option<&Entity>, ActivityError> {
        memoized(&self.project, || match self.record.project_id {
            Some(id) => self.store.lookup(
                &EntityRef::new(EntityKind::Project, id),
                Visibility::WithDeleted,
            ),
            None => Ok(None),
        })
    }

    /// The conversation this event belongs to: the comment target for
    /// comments, the target otherwise, falling back to the project.
    pub fn thread(&self) -> Result<Option<&Entity>, ActivityError> {
        let thread = if self.record.is_comment() {
            self.comment_target()?
        } else {
            self.target()?
        };
        match thread {
            Some(entity) => Ok(Some(entity)),
            None => self.project(),
        }
    }

    /// When the target itself was created.
    pub fn posted_date(&self) -> Result<Option<&str>, ActivityError> {
        Ok(self.target()?.and_then(|t| t.created_at.as_deref()))
    }

    /// Gate for realtime delivery. A missing target never suppresses.
    pub fn eligible_for_push(&self) -> Result<bool, ActivityError> {
        Ok(match self.target()? {
            Some(target) => !self.store.push_suppressed(target),
            None => true,
        })
    }

    /// Whether the target is the comment that opened its thread.
    pub fn is_first_comment(&self) -> Result<bool, ActivityError> {
        let Some(comment_target) = self.comment_target()? else {
            return Ok(false);
        };
        let first = self
            .store
            .thread_comments(comment_target)?
            .and_then(|comments| comments.first);
        Ok(first.is_some_and(|first| first.entity_ref == self.record.target))
    }

    /// Whether the comment target records a conversion from another kind.
    pub fn is_converted_comment(&self) -> Result<bool, ActivityError> {
        Ok(self
            .comment_target()?
            .is_some_and(|ct| ct.attr_flag("record_conversion")))
    }

    /// The target's first comment followed by its recent comments. Empty when
    /// the target has no comment thread.
    pub fn refs_thread_comments(&self) -> Result<Vec<Entity>, ActivityError> {
        let Some(target) = self.target()? else {
            return Ok(Vec::new());
        };
        let Some(comments) = self.store.thread_comments(target)? else {
            return Ok(Vec::new());
        };
        Ok(comments.first.into_iter().chain(comments.recent).collect())
    }

    /// Everything a client needs to render the comment target: the target
    /// itself and, when it carries a thread, its first comment, the users
    /// involved and the recent comments with their authors.
    pub fn refs_comment_target(&self) -> Result<Vec<Entity>, ActivityError> {
        let Some(comment_target) = self.comment_target()? else {
            return Ok(Vec::new());
        };
        let Some(comments) = self.store.thread_comments(comment_target)? else {
            return Ok(vec![comment_target.clone()]);
        };

        let mut refs = vec![comment_target.clone()];
        refs.extend(comments.first.clone());
        refs.extend(self.lookup_user(comment_target.user_id)?);
        if let Some(first) = &comments.first {
            refs.extend(self.lookup_user(first.user_id)?);
        }
        for comment in &comments.recent {
            refs.push(comment.clone());
        }
        for comment in &comments.recent {
            refs.extend(self.lookup_user(comment.user_id)?);
        }
        Ok(refs)
    }

    pub(crate) fn lookup_user(&self, user_id: Option<i64>) -> Result<Option<Entity>, ActivityError> {
        match user_id {
            Some(id) if id == self.record.user_id => Ok(self.user()?.cloned()),
            Some(id) => self.store.lookup(
                &EntityRef::new(EntityKind::User, id),
                Visibility::WithDeleted,
            ),
            None => Ok(None),
        }
    }
}

fn memoized<'c>(
    cell: &'c OnceCell<Option<Entity>>,
    load: impl FnOnce() -> Result<Option<Entity>, ActivityError>,
) -> Result<Option<&'c Entity>, ActivityError> {
    if let Some(cached) = cell.get() {
        return Ok(cached.as_ref());
    }
    let loaded = load()?;
    Ok(cell.get_or_init(|| loaded).as_ref())
}
