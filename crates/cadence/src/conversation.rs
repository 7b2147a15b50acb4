use std::collections::HashMap;

use crate::errors::{AgentError, AgentResult};
use crate::models::message::{Message, MessageId};
use crate::models::role::Role;

/// Ordered store of the messages in the active conversation.
///
/// Messages keep insertion order for their whole lifetime; the store never merges or
/// reorders them. Content is replaced through [`Conversation::update_message`] so every
/// mutation goes through the store rather than through a borrowed message.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    positions: HashMap<MessageId, usize>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return the id the store generated for it
    pub fn add_message<S: Into<String>>(&mut self, role: Role, content: S) -> MessageId {
        let id = uuid::Uuid::new_v4().to_string();
        self.positions.insert(id.clone(), self.messages.len());
        self.messages.push(Message::new(id.clone(), role, content));
        id
    }

    /// Replace the content of an existing message
    pub fn update_message<S: Into<String>>(&mut self, id: &str, content: S) -> AgentResult<()> {
        let message = self.find_mut(id)?;
        message.content = content.into();
        Ok(())
    }

    /// Append a streamed fragment to an existing message
    pub fn append_to_message(&mut self, id: &str, fragment: &str) -> AgentResult<()> {
        let message = self.find_mut(id)?;
        message.content.push_str(fragment);
        Ok(())
    }

    pub fn remove_message(&mut self, id: &str) -> Option<Message> {
        let position = self.positions.remove(id)?;
        let removed = self.messages.remove(position);
        for (index, message) in self.messages.iter().enumerate().skip(position) {
            self.positions.insert(message.id.clone(), index);
        }
        Some(removed)
    }

    pub fn find(&self, id: &str) -> Option<&Message> {
        self.positions.get(id).map(|&position| &self.messages[position])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// A fresh copy of the conversation to hand to a provider
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn find_mut(&mut self, id: &str) -> AgentResult<&mut Message> {
        let position = *self
            .positions
            .get(id)
            .ok_or_else(|| AgentError::Internal(format!("No message with id {}", id)))?;
        Ok(&mut self.messages[position])
    }
}
