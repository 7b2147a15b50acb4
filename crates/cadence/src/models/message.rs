use super::role::Role;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Identifier assigned by the conversation store when a message is inserted
pub type MessageId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub created: i64,
    pub content: String,
}

impl Message {
    pub(crate) fn new<S: Into<String>>(id: MessageId, role: Role, content: S) -> Self {
        Message {
            id,
            role,
            created: Utc::now().timestamp(),
            content: content.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}
