//! External collaborators consumed by the engine
//!
//! Recognizers and language generators are injected services. They report
//! failures through `anyhow`; the engine turns those into
//! [`CollaboratorFailure`] values that trigger conditions can react to, so no
//! collaborator error ever aborts a turn.

pub mod generator;
pub mod recognizer;

pub use generator::TemplateGenerator;
pub use recognizer::RegexRecognizer;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::value_objects::{Activity, RecognizerResult};

/// Read-only view handed to a recognizer
#[derive(Debug, Clone, Copy)]
pub struct RecognizerContext<'a> {
    pub activity: &'a Activity,
    pub turn_state: &'a Map<String, Value>,
}

/// Maps utterance text to an intent and entities
///
/// Implementations must be deterministic for a given input; anything
/// non-deterministic belongs in the inbound activity or persisted state.
pub trait Recognizer: Send + Sync {
    fn recognize(
        &self,
        text: &str,
        context: &RecognizerContext<'_>,
    ) -> anyhow::Result<RecognizerResult>;
}

/// Renders named templates into outbound text
pub trait LanguageGenerator: Send + Sync {
    fn render(&self, template_name: &str, scope: &Value) -> anyhow::Result<String>;
}

/// Which collaborator failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum CollaboratorKind {
    Recognizer,
    LanguageGenerator,
}

/// Typed failure report from a collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorFailure {
    pub collaborator: CollaboratorKind,
    pub message: String,
}

impl CollaboratorFailure {
    pub fn new(collaborator: CollaboratorKind, error: &anyhow::Error) -> Self {
        Self {
            collaborator,
            message: format!("{error:#}"),
        }
    }

    /// Shape stored under `turn.error`
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Outbound text, either literal or a `${Template}` reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityTemplate {
    Text(String),
    Template(String),
}

impl ActivityTemplate {
    /// Classify a raw string: `${Name}` and `${Name()}` are template references
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let name = trimmed
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            .map(|inner| inner.trim().trim_end_matches("()").trim());
        match name {
            Some(name) if is_template_name(name) => Self::Template(name.to_string()),
            _ => Self::Text(raw.to_string()),
        }
    }
}

fn is_template_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_references() {
        assert_eq!(
            ActivityTemplate::parse("${HelpRootDialog()}"),
            ActivityTemplate::Template("HelpRootDialog".to_string())
        );
        assert_eq!(
            ActivityTemplate::parse("${Welcome}"),
            ActivityTemplate::Template("Welcome".to_string())
        );
        assert_eq!(
            ActivityTemplate::parse("Cancelling all dialogs.."),
            ActivityTemplate::Text("Cancelling all dialogs..".to_string())
        );
        assert_eq!(
            ActivityTemplate::parse("${not a name}"),
            ActivityTemplate::Text("${not a name}".to_string())
        );
    }
}
