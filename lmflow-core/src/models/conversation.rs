//! Conversations sent to model backends

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "system" => Some(MessageRole::System),
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered sequence of turns passed to [`Model::complete`](super::Model::complete)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation holding a single user turn
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::new(MessageRole::User, prompt)],
        }
    }

    /// Parse role-tagged text into turns.
    ///
    /// A line starting with `[system]`, `[user]` or `[assistant]` opens a new turn;
    /// following untagged lines continue it. Text before the first tag is a user turn.
    pub fn from_tagged(text: &str) -> Self {
        let mut conversation = Self::new();
        let mut current: Option<(MessageRole, Vec<&str>)> = None;

        for line in text.lines() {
            let trimmed = line.trim_start();
            let tagged = trimmed.strip_prefix('[').and_then(|rest| {
                let (tag, body) = rest.split_once(']')?;
                let role = MessageRole::from_tag(&tag.to_ascii_lowercase())?;
                Some((role, body.trim_start()))
            });

            match tagged {
                Some((role, body)) => {
                    if let Some((role, lines)) = current.take() {
                        conversation.push(role, lines.join("\n").trim_end());
                    }
                    current = Some((role, vec![body]));
                }
                None => match current.as_mut() {
                    Some((_, lines)) => lines.push(line),
                    None => {
                        if !line.trim().is_empty() {
                            current = Some((MessageRole::User, vec![line]));
                        }
                    }
                },
            }
        }

        if let Some((role, lines)) = current {
            conversation.push(role, lines.join("\n").trim_end());
        }
        conversation
    }

    pub fn push(&mut self, role: MessageRole, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.push(MessageRole::System, content);
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.push(MessageRole::User, content);
        self
    }

    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        self.push(MessageRole::Assistant, content);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Flatten to text.
    ///
    /// A lone user turn is its content; anything else renders as `ROLE: content` lines.
    pub fn text(&self) -> String {
        match self.messages.as_slice() {
            [only] if only.role == MessageRole::User => only.content.clone(),
            messages => messages
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl fmt::Display for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl From<String> for Conversation {
    fn from(prompt: String) -> Self {
        Conversation::from_prompt(prompt)
    }
}

impl From<&str> for Conversation {
    fn from(prompt: &str) -> Self {
        Conversation::from_prompt(prompt)
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_user_turn_text() {
        let conversation = Conversation::from_prompt("hello world");
        assert_eq!(conversation.text(), "hello world");
    }

    #[test]
    fn test_multi_turn_text() {
        let conversation = Conversation::new()
            .system("You count words.")
            .user("hello world");
        assert_eq!(
            conversation.text(),
            "SYSTEM: You count words.\nUSER: hello world"
        );
    }

    #[test]
    fn test_from_tagged() {
        let conversation = Conversation::from_tagged(
            "[system] You are an assistant\nthat counts words.\n[user] hello world\n",
        );

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[0].role, MessageRole::System);
        assert_eq!(
            conversation.messages()[0].content,
            "You are an assistant\nthat counts words."
        );
        assert_eq!(conversation.messages()[1].role, MessageRole::User);
        assert_eq!(conversation.messages()[1].content, "hello world");
    }

    #[test]
    fn test_from_tagged_untagged_text_is_user() {
        let conversation = Conversation::from_tagged("just a question");
        assert_eq!(conversation, Conversation::from_prompt("just a question"));
    }

    #[test]
    fn test_serializes_as_list() {
        let conversation = Conversation::new().user("hi");
        let json = serde_json::to_value(&conversation).unwrap();
        assert_eq!(json, serde_json::json!([{"role": "user", "content": "hi"}]));
    }
}
