use serde::{Deserialize, Serialize};

/// A single utterance in a conversation thread.
///
/// Messages carry a role ("user", "assistant", "system"), an optional author
/// name (the human participant or the agent that produced the message), and
/// the text content. They are immutable once created: state merges only ever
/// append messages, never rewrite them.
///
/// # Examples
///
/// ```
/// use threadloom::message::Message;
///
/// let user_msg = Message::human("Human", "What happened in the meeting?");
/// let reply = Message::agent("Touchpoint", "Here is a summary of the meeting.");
/// let notice = Message::system("Answer using the available information only.");
///
/// assert!(user_msg.has_role(Message::USER));
/// assert_eq!(reply.name.as_deref(), Some("Touchpoint"));
/// ```
///
/// # Serialization
///
/// Messages round-trip through JSON for checkpoint persistence:
/// ```
/// use threadloom::message::Message;
///
/// let msg = Message::user("test");
/// let json = serde_json::to_string(&msg).unwrap();
/// let parsed: Message = serde_json::from_str(&json).unwrap();
/// assert_eq!(msg, parsed);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// The role of the sender. Use the constants on [`Message`] for the
    /// standard values.
    pub role: String,
    /// Author name: the human participant or the agent that wrote this
    /// message. Absent for plain role-only messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The text content.
    pub content: String,
}

impl Message {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// Assistant response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System prompt or instruction message role.
    pub const SYSTEM: &'static str = "system";

    /// Creates a new message with the specified role and content, no author.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            name: None,
            content: content.to_string(),
        }
    }

    /// Creates an anonymous user message.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an anonymous assistant message.
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Creates a user message attributed to a named human participant.
    ///
    /// ```
    /// use threadloom::message::Message;
    ///
    /// let msg = Message::human("Human", "hello");
    /// assert_eq!(msg.role, Message::USER);
    /// assert_eq!(msg.name.as_deref(), Some("Human"));
    /// ```
    #[must_use]
    pub fn human(name: &str, content: &str) -> Self {
        Self {
            role: Self::USER.to_string(),
            name: Some(name.to_string()),
            content: content.to_string(),
        }
    }

    /// Creates an assistant message attributed to a named agent.
    ///
    /// Used by workflow nodes so the chat history records which agent
    /// produced each entry.
    #[must_use]
    pub fn agent(name: &str, content: &str) -> Self {
        Self {
            role: Self::ASSISTANT.to_string(),
            name: Some(name.to_string()),
            content: content.to_string(),
        }
    }

    /// Creates a system message attributed to a named source, such as the
    /// fallback policy that injected it.
    #[must_use]
    pub fn system_from(name: &str, content: &str) -> Self {
        Self {
            role: Self::SYSTEM.to_string(),
            name: Some(name.to_string()),
            content: content.to_string(),
        }
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Renders the message as a single transcript line, used when building
    /// completion prompts from history windows.
    #[must_use]
    pub fn transcript_line(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({}): {}", self.role, name, self.content),
            None => format!("{}: {}", self.role, self.content),
        }
    }
}
