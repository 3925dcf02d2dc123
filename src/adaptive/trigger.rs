//! Trigger conditions

use super::action::Action;
use super::expression::Expression;
use crate::errors::DialogResult;

/// Which events a trigger listens to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    /// The adaptive dialog was just started
    BeginDialog,
    /// A message recognized with this intent
    Intent(String),
    /// A message whose top intent is `None` or missing
    UnknownIntent,
    ConversationUpdate,
    /// Any message
    Message,
    /// Any activity; the condition decides
    Condition,
    /// The recognizer failed (`turn.error` holds the failure)
    RecognizerError,
    /// An action failed to render (`turn.error` holds the failure)
    Error,
}

/// What is being evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TriggerEvent {
    Begin,
    Activity {
        message: bool,
        conversation_update: bool,
        intent: Option<String>,
    },
    RecognizerError,
    Error,
}

impl TriggerKind {
    pub(crate) fn accepts(&self, event: &TriggerEvent) -> bool {
        match (self, event) {
            (Self::BeginDialog, TriggerEvent::Begin) => true,
            (Self::RecognizerError, TriggerEvent::RecognizerError) => true,
            (Self::Error, TriggerEvent::Error) => true,
            (Self::Condition, TriggerEvent::Activity { .. }) => true,
            (Self::Message, TriggerEvent::Activity { message, .. }) => *message,
            (
                Self::ConversationUpdate,
                TriggerEvent::Activity {
                    conversation_update,
                    ..
                },
            ) => *conversation_update,
            (Self::Intent(name), TriggerEvent::Activity { message, intent, .. }) => {
                *message && intent.as_deref() == Some(name.as_str())
            }
            (Self::UnknownIntent, TriggerEvent::Activity { message, intent, .. }) => {
                *message && intent.is_none()
            }
            _ => false,
        }
    }
}

/// A prioritized condition → actions rule
#[derive(Debug, Clone)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub condition: Option<Expression>,
    /// Higher runs first; equal priorities keep declaration order
    pub priority: i32,
    pub actions: Vec<Action>,
}

impl Trigger {
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            condition: None,
            priority: 0,
            actions: Vec::new(),
        }
    }

    pub fn on_begin_dialog() -> Self {
        Self::new(TriggerKind::BeginDialog)
    }

    pub fn on_intent(intent: impl Into<String>) -> Self {
        Self::new(TriggerKind::Intent(intent.into()))
    }

    pub fn on_unknown_intent() -> Self {
        Self::new(TriggerKind::UnknownIntent)
    }

    pub fn on_conversation_update() -> Self {
        Self::new(TriggerKind::ConversationUpdate)
    }

    pub fn on_message() -> Self {
        Self::new(TriggerKind::Message)
    }

    pub fn on_condition(condition: &str) -> DialogResult<Self> {
        Self::new(TriggerKind::Condition).when(condition)
    }

    pub fn on_recognizer_error() -> Self {
        Self::new(TriggerKind::RecognizerError)
    }

    pub fn on_error() -> Self {
        Self::new(TriggerKind::Error)
    }

    /// Extra condition on top of the trigger kind
    pub fn when(mut self, condition: &str) -> DialogResult<Self> {
        self.condition = Some(Expression::parse(condition)?);
        Ok(self)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(intent: Option<&str>) -> TriggerEvent {
        TriggerEvent::Activity {
            message: true,
            conversation_update: false,
            intent: intent.map(str::to_string),
        }
    }

    #[test]
    fn test_intent_matching() {
        let cancel = Trigger::on_intent("Cancel");
        assert!(cancel.kind.accepts(&message(Some("Cancel"))));
        assert!(!cancel.kind.accepts(&message(Some("Help"))));
        assert!(!cancel.kind.accepts(&TriggerEvent::Begin));

        let unknown = Trigger::on_unknown_intent();
        assert!(unknown.kind.accepts(&message(None)));
        assert!(!unknown.kind.accepts(&message(Some("Help"))));
    }

    #[test]
    fn test_conversation_update_is_not_a_message() {
        let update = TriggerEvent::Activity {
            message: false,
            conversation_update: true,
            intent: None,
        };
        assert!(Trigger::on_conversation_update().kind.accepts(&update));
        assert!(!Trigger::on_message().kind.accepts(&update));
        assert!(!Trigger::on_unknown_intent().kind.accepts(&update));
        assert!(Trigger::on_condition("true").unwrap().kind.accepts(&update));
    }

    #[test]
    fn test_error_kinds_only_see_their_events() {
        assert!(Trigger::on_error().kind.accepts(&TriggerEvent::Error));
        assert!(!Trigger::on_error().kind.accepts(&message(None)));
        assert!(
            Trigger::on_recognizer_error()
                .kind
                .accepts(&TriggerEvent::RecognizerError)
        );
        assert!(!Trigger::on_condition("true").unwrap().kind.accepts(&TriggerEvent::Error));
    }
}
