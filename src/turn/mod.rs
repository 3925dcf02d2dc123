//! Per-turn context
//!
//! A [`TurnContext`] lives for exactly one inbound event. It carries the
//! immutable inbound activity, the buffering channel that stands in for the
//! transport, turn-scoped memory and the chained-step budget.

pub mod channel;

pub use channel::BufferingChannel;

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::collaborators::{
    ActivityTemplate, CollaboratorFailure, CollaboratorKind, LanguageGenerator,
};
use crate::errors::{DialogError, DialogResult};
use crate::value_objects::{Activity, ActivityType, ChannelAccount};

/// Default bound on same-turn chained advance
pub const DEFAULT_MAX_CHAINED_STEPS: usize = 100;

/// State and services for a single turn
pub struct TurnContext {
    activity: Activity,
    channel: BufferingChannel,
    turn_state: Map<String, Value>,
    generator: Option<Arc<dyn LanguageGenerator>>,
    bot: ChannelAccount,
    max_chained_steps: usize,
    steps_taken: usize,
}

impl TurnContext {
    /// Create a context for an inbound activity
    pub fn new(activity: Activity) -> Self {
        let channel = BufferingChannel::for_turn(&activity);
        let mut turn_state = Map::new();
        turn_state.insert(
            "activity".to_string(),
            serde_json::to_value(&activity).unwrap_or(Value::Null),
        );
        Self {
            activity,
            channel,
            turn_state,
            generator: None,
            bot: ChannelAccount::default(),
            max_chained_steps: DEFAULT_MAX_CHAINED_STEPS,
            steps_taken: 0,
        }
    }

    /// Attach a language generator
    pub fn with_generator(mut self, generator: Option<Arc<dyn LanguageGenerator>>) -> Self {
        self.generator = generator;
        self
    }

    /// Account used as `from` when the inbound activity has no recipient
    pub fn with_bot(mut self, bot: ChannelAccount) -> Self {
        self.bot = bot;
        self
    }

    /// Bound on steps executed without waiting for input
    pub fn with_max_chained_steps(mut self, limit: usize) -> Self {
        self.max_chained_steps = limit;
        self
    }

    /// The inbound activity
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Turn-scoped memory (`turn.*`)
    pub fn turn_state(&self) -> &Map<String, Value> {
        &self.turn_state
    }

    pub fn turn_state_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.turn_state
    }

    /// Buffer an outbound activity and return its id
    pub fn send_activity(&mut self, activity: Activity) -> String {
        debug!(
            conversation_id = %self.activity.conversation_id,
            activity_type = ?activity.activity_type,
            "buffering outbound activity"
        );
        self.channel.send(activity)
    }

    /// Reply to the sender with plain text
    pub fn send_text(&mut self, text: impl Into<String>) -> String {
        let mut reply = self.activity.create_reply(ActivityType::Message, &self.bot);
        reply.text = Some(text.into());
        self.send_activity(reply)
    }

    /// Replace a previously sent activity
    pub fn update_activity(&mut self, activity: Activity) {
        self.channel.update(activity);
    }

    /// Remove a previously sent activity
    pub fn delete_activity(&mut self, activity_id: impl Into<String>) {
        let template = self.activity.create_reply(ActivityType::MessageDelete, &self.bot);
        self.channel.delete(&template, activity_id);
    }

    /// Resolve a literal or `${Template}` string into outbound text
    pub fn render_text(&self, raw: &str, scope: &Value) -> Result<String, CollaboratorFailure> {
        match ActivityTemplate::parse(raw) {
            ActivityTemplate::Text(text) => Ok(text),
            ActivityTemplate::Template(name) => {
                let Some(generator) = &self.generator else {
                    return Err(CollaboratorFailure {
                        collaborator: CollaboratorKind::LanguageGenerator,
                        message: format!("no language generator configured for '{name}'"),
                    });
                };
                generator
                    .render(&name, scope)
                    .map_err(|e| CollaboratorFailure::new(CollaboratorKind::LanguageGenerator, &e))
            }
        }
    }

    /// Memory scope used when rendering outside an adaptive dialog
    pub fn render_scope(&self) -> Value {
        let mut scope = Map::new();
        scope.insert("turn".to_string(), Value::Object(self.turn_state.clone()));
        Value::Object(scope)
    }

    /// Charge one chained step against the turn budget
    pub fn consume_step(&mut self, dialog_id: &str) -> DialogResult<()> {
        self.steps_taken += 1;
        if self.steps_taken > self.max_chained_steps {
            return Err(DialogError::StepLimitExceeded {
                dialog_id: dialog_id.to_string(),
                limit: self.max_chained_steps,
            });
        }
        Ok(())
    }

    /// Steps charged so far this turn
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// Outbound activities buffered so far
    pub fn outbound(&self) -> &[Activity] {
        self.channel.activities()
    }

    /// Drain the buffered outbound activities
    pub fn take_outbound(&mut self) -> Vec<Activity> {
        self.channel.drain()
    }
}

impl std::fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnContext")
            .field("activity", &self.activity)
            .field("buffered", &self.channel.len())
            .field("steps_taken", &self.steps_taken)
            .finish()
    }
}
