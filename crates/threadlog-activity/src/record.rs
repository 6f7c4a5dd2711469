//! The activity record and the identifiers derived from it.

use rusqlite::Row;
use serde::Serialize;
use threadlog_types::{EntityKind, EntityRef};

/// Column list shared by every query that maps rows with [`EventRecord::from_row`].
pub(crate) const ACTIVITY_COLUMNS: &str = "id, project_id, user_id, action, target_type, target_id, \
     comment_target_type, comment_target_id, last_activity_id, created_at, updated_at";

/// Action token that marks the creation of the target.
pub const CREATE_ACTION: &str = "create";

/// One logged occurrence.
///
/// Records are immutable once written, apart from the thread chain pointer,
/// which only [`crate::chain`] writes. The pointer is therefore exposed
/// read-only through [`EventRecord::last_activity_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    /// Store-assigned id; also the creation ordering key.
    pub id: i64,
    /// Scoping project. `None` for project-less events.
    pub project_id: Option<i64>,
    /// The user that performed the action.
    pub user_id: i64,
    /// The verb, e.g. `create`, `edit`, `delete`.
    pub action: String,
    /// The primary subject of the event.
    pub target: EntityRef,
    /// For comment targets, the entity the comment was posted against.
    pub comment_target: Option<EntityRef>,
    last_activity_id: Option<i64>,
    /// When the subject occurred (backdated to the target's own timestamp).
    pub created_at: String,
    /// When the row was written.
    pub updated_at: String,
}

impl EventRecord {
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let target_type: String = row.get(4)?;
        let comment_target_type: Option<String> = row.get(6)?;
        let comment_target_id: Option<i64> = row.get(7)?;

        let comment_target = match (comment_target_type, comment_target_id) {
            (Some(kind), Some(id)) => Some(EntityRef::new(EntityKind::from_tag(&kind), id)),
            _ => None,
        };

        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            user_id: row.get(2)?,
            action: row.get(3)?,
            target: EntityRef::new(EntityKind::from_tag(&target_type), row.get(5)?),
            comment_target,
            last_activity_id: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    /// The chain pointer: id of the freshest activity in this record's thread.
    pub fn last_activity_id(&self) -> Option<i64> {
        self.last_activity_id
    }

    /// The effective sort id, `coalesce(last_activity_id, id)`.
    pub fn last_id(&self) -> i64 {
        self.last_activity_id.unwrap_or(self.id)
    }

    /// Reference grouping this event with the rest of its conversation.
    ///
    /// Comments group under the entity they were posted against; everything
    /// else groups under its own target.
    pub fn thread_key(&self) -> &EntityRef {
        match &self.comment_target {
            Some(comment_target) if self.target.kind.is_comment() => comment_target,
            _ => &self.target,
        }
    }

    /// String form of [`Self::thread_key`], e.g. `Conversation_10`.
    pub fn thread_id(&self) -> String {
        let key = self.thread_key();
        format!("{}_{}", key.kind, key.id)
    }

    /// Whether the target opens a comment thread.
    pub fn is_thread_root(&self) -> bool {
        self.target.kind.is_thread_root()
    }

    /// Whether the target is a comment, i.e. a reply inside another thread.
    pub fn is_comment(&self) -> bool {
        self.target.kind.is_comment()
    }

    /// Stable identifier used by clients to merge and dedupe feed entries.
    pub fn client_activity_id(&self) -> String {
        activity_id_for(&self.target)
    }

    /// Normalised `action + target_type`, e.g. `create_task_list`.
    pub fn action_type(&self) -> String {
        action_type_for(&self.action, &self.target.kind)
    }

    /// Like [`Self::action_type`], with the comment target's type appended.
    pub fn action_comment_type(&self) -> String {
        let mut joined = format!("{}{}", self.action, self.target.kind);
        if let Some(comment_target) = &self.comment_target {
            joined.push_str(comment_target.kind.as_str());
        }
        underscore(&joined)
    }

    /// Compares against [`Self::action_type`], e.g. `is_action_type("create_page")`.
    pub fn is_action_type(&self, candidate: &str) -> bool {
        self.action_type() == candidate
    }

    /// Whether this event records the creation of its target.
    pub fn is_creation(&self) -> bool {
        self.action == CREATE_ACTION
    }
}

/// Derives the action type from its parts.
pub fn action_type_for(action: &str, kind: &EntityKind) -> String {
    underscore(&format!("{action}{kind}"))
}

/// Derives the client activity id for a target.
pub fn activity_id_for(target: &EntityRef) -> String {
    let kind = target.kind.as_str().to_lowercase();
    if target.kind.is_comment() {
        format!("{kind}_{}", target.id)
    } else if target.kind.is_thread_root() {
        format!("thread_{kind}_{}", target.id)
    } else {
        format!("activity_{kind}_{}", target.id)
    }
}

/// Converts `CamelCase` runs to `snake_case`: `createTaskList` becomes
/// `create_task_list`, `HTMLPage` becomes `html_page`.
pub fn underscore(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' {
            out.push('_');
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let boundary = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower);
            if boundary {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underscore_splits_camel_case() {
        assert_eq!(underscore("createConversation"), "create_conversation");
        assert_eq!(underscore("editTaskList"), "edit_task_list");
        assert_eq!(underscore("createHTMLPage"), "create_html_page");
        assert_eq!(underscore("delete-Note"), "delete_note");
        assert_eq!(underscore("already_snake"), "already_snake");
    }

    #[test]
    fn activity_id_branches() {
        let comment = EntityRef::new(EntityKind::Comment, 5);
        let conversation = EntityRef::new(EntityKind::Conversation, 5);
        let page = EntityRef::new(EntityKind::Page, 5);
        let task_list = EntityRef::new(EntityKind::TaskList, 7);

        assert_eq!(activity_id_for(&comment), "comment_5");
        assert_eq!(activity_id_for(&conversation), "thread_conversation_5");
        assert_eq!(activity_id_for(&page), "activity_page_5");
        assert_eq!(activity_id_for(&task_list), "activity_tasklist_7");
    }

    #[test]
    fn activity_ids_do_not_collide_across_kinds() {
        let kinds = [
            EntityKind::User,
            EntityKind::Person,
            EntityKind::Project,
            EntityKind::Task,
            EntityKind::TaskList,
            EntityKind::Comment,
            EntityKind::Conversation,
            EntityKind::Page,
            EntityKind::Note,
            EntityKind::Divider,
            EntityKind::Upload,
        ];

        let mut seen = std::collections::HashSet::new();
        for kind in kinds {
            for id in [1, 2, 10, 11] {
                let activity_id = activity_id_for(&EntityRef::new(kind.clone(), id));
                assert!(seen.insert(activity_id.clone()), "collision on {activity_id}");
            }
        }
    }

    #[test]
    fn action_type_is_snake_cased() {
        assert_eq!(
            action_type_for("create", &EntityKind::Conversation),
            "create_conversation"
        );
        assert_eq!(action_type_for("edit", &EntityKind::TaskList), "edit_task_list");
        assert_eq!(
            action_type_for("create", &EntityKind::Other("Invitation".to_string())),
            "create_invitation"
        );
    }

    #[test]
    fn comment_record_predicates() {
        let record = EventRecord {
            id: 3,
            project_id: Some(1),
            user_id: 1,
            action: "create".to_string(),
            target: EntityRef::new(EntityKind::Comment, 5),
            comment_target: Some(EntityRef::new(EntityKind::Conversation, 10)),
            last_activity_id: None,
            created_at: "2026-01-01 00:00:00".to_string(),
            updated_at: "2026-01-01 00:00:00".to_string(),
        };

        assert!(record.is_comment());
        assert!(!record.is_thread_root());
        assert!(record.is_action_type("create_comment"));
        assert!(!record.is_action_type("create_conversation"));
        assert_eq!(record.action_comment_type(), "create_comment_conversation");
    }
}
