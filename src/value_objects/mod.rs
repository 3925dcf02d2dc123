//! Value objects for the dialog engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of an inbound or outbound activity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    /// Text (or structured) message
    Message,
    /// Members joined or left the conversation
    ConversationUpdate,
    /// Named application event
    Event,
    /// Typing indicator
    Typing,
    /// Conversation was closed by the other side
    EndOfConversation,
    /// Replacement of a previously sent activity
    MessageUpdate,
    /// Removal of a previously sent activity
    MessageDelete,
}

/// An account taking part in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChannelAccount {
    /// Channel specific identifier
    pub id: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    /// Create an account with an id and a display name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

impl Default for ChannelAccount {
    fn default() -> Self {
        Self::new("bot", "Bot")
    }
}

/// An event flowing in or out of a turn
///
/// Inbound activities are immutable for the duration of a turn. Outbound
/// activities are produced by dialogs and collected by the buffering channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub conversation_id: String,
    pub from: ChannelAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_removed: Vec<ChannelAccount>,
    /// Structured payload (event values, card submissions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Event name for `event` activities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    /// Supplied by the caller; the engine never reads the clock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Activity {
    /// Create an empty activity of the given type
    pub fn new(
        activity_type: ActivityType,
        conversation_id: impl Into<String>,
        from: ChannelAccount,
    ) -> Self {
        Self {
            activity_type,
            id: None,
            text: None,
            conversation_id: conversation_id.into(),
            from,
            recipient: None,
            members_added: Vec::new(),
            members_removed: Vec::new(),
            value: None,
            name: None,
            reply_to_id: None,
            timestamp: None,
        }
    }

    /// Create a text message
    pub fn message(
        conversation_id: impl Into<String>,
        from: ChannelAccount,
        text: impl Into<String>,
    ) -> Self {
        let mut activity = Self::new(ActivityType::Message, conversation_id, from);
        activity.text = Some(text.into());
        activity
    }

    /// Create a conversation update announcing new members
    pub fn conversation_update(
        conversation_id: impl Into<String>,
        from: ChannelAccount,
        members_added: Vec<ChannelAccount>,
    ) -> Self {
        let mut activity = Self::new(ActivityType::ConversationUpdate, conversation_id, from);
        activity.members_added = members_added;
        activity
    }

    /// Create a named event
    pub fn event(
        conversation_id: impl Into<String>,
        from: ChannelAccount,
        name: impl Into<String>,
        value: Option<Value>,
    ) -> Self {
        let mut activity = Self::new(ActivityType::Event, conversation_id, from);
        activity.name = Some(name.into());
        activity.value = value;
        activity
    }

    /// Set the activity id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the recipient
    pub fn with_recipient(mut self, recipient: ChannelAccount) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether this is a message activity
    pub fn is_message(&self) -> bool {
        self.activity_type == ActivityType::Message
    }

    /// Trimmed message text, if any
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Build an outbound activity addressed back to the sender of this one
    pub fn create_reply(&self, activity_type: ActivityType, bot: &ChannelAccount) -> Activity {
        let mut reply = Activity::new(
            activity_type,
            self.conversation_id.clone(),
            self.recipient.clone().unwrap_or_else(|| bot.clone()),
        );
        reply.recipient = Some(self.from.clone());
        reply.reply_to_id = self.id.clone();
        reply.timestamp = self.timestamp;
        reply
    }
}

/// Status returned by every dialog stack operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DialogTurnStatus {
    /// The stack was empty, nothing ran
    Empty,
    /// A dialog is still running and did not ask for input
    Active,
    /// The active dialog is suspended until the next inbound event
    Waiting,
    /// The dialog ended and its frame was popped
    Complete,
    /// Frames were cancelled
    Cancelled,
}

/// Outcome of a stack operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTurnResult {
    pub status: DialogTurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl DialogTurnResult {
    pub fn new(status: DialogTurnStatus) -> Self {
        Self {
            status,
            result: None,
        }
    }

    /// Suspend until the next inbound event
    pub fn waiting() -> Self {
        Self::new(DialogTurnStatus::Waiting)
    }

    /// A dialog finished with an optional result
    pub fn complete(result: Option<Value>) -> Self {
        Self {
            status: DialogTurnStatus::Complete,
            result,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == DialogTurnStatus::Waiting
    }
}

/// Why a dialog is being started, resumed or ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DialogReason {
    BeginCalled,
    ContinueCalled,
    EndCalled,
    ReplaceCalled,
    CancelCalled,
    NextCalled,
}

/// An entity extracted by a recognizer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub entity_type: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

/// Output of a recognizer collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecognizerResult {
    pub text: String,
    pub top_intent: String,
    pub score: f64,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl RecognizerResult {
    /// Intent reported when nothing matched
    pub const NONE_INTENT: &'static str = "None";

    /// A result with no recognized intent
    pub fn none(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_intent: Self::NONE_INTENT.to_string(),
            score: 0.0,
            entities: Vec::new(),
        }
    }

    pub fn is_none_intent(&self) -> bool {
        self.top_intent.is_empty() || self.top_intent == Self::NONE_INTENT
    }
}
