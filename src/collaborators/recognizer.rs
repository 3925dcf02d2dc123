//! Pattern based recognizer

use regex::Regex;
use serde_json::Value;

use super::{Recognizer, RecognizerContext};
use crate::errors::{DialogError, DialogResult};
use crate::value_objects::{Entity, RecognizerResult};

/// Recognizer driven by ordered regular expressions
///
/// Intent rules are tried in registration order and the first match wins
/// with a score of 1.0. Entity extractors run on every utterance.
#[derive(Debug, Clone, Default)]
pub struct RegexRecognizer {
    intents: Vec<(String, Regex)>,
    entities: Vec<(String, Regex)>,
}

impl RegexRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an intent rule
    pub fn intent(mut self, intent: impl Into<String>, pattern: &str) -> DialogResult<Self> {
        self.intents.push((intent.into(), compile(pattern)?));
        Ok(self)
    }

    /// Add an entity extractor; the first capture group (or whole match) is the value
    pub fn entity(mut self, entity_type: impl Into<String>, pattern: &str) -> DialogResult<Self> {
        self.entities.push((entity_type.into(), compile(pattern)?));
        Ok(self)
    }
}

fn compile(pattern: &str) -> DialogResult<Regex> {
    Regex::new(pattern).map_err(|e| DialogError::invalid_expression(pattern, e.to_string()))
}

impl Recognizer for RegexRecognizer {
    fn recognize(
        &self,
        text: &str,
        _context: &RecognizerContext<'_>,
    ) -> anyhow::Result<RecognizerResult> {
        let mut result = self
            .intents
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(intent, _)| RecognizerResult {
                text: text.to_string(),
                top_intent: intent.clone(),
                score: 1.0,
                entities: Vec::new(),
            })
            .unwrap_or_else(|| RecognizerResult::none(text));

        for (entity_type, pattern) in &self.entities {
            for captures in pattern.captures_iter(text) {
                let Some(found) = captures.get(1).or_else(|| captures.get(0)) else {
                    continue;
                };
                result.entities.push(Entity {
                    entity_type: entity_type.clone(),
                    value: Value::String(found.as_str().to_string()),
                    start: Some(found.start()),
                    end: Some(found.end()),
                });
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::{Activity, ChannelAccount};
    use serde_json::{Map, json};

    fn recognize(recognizer: &RegexRecognizer, text: &str) -> RecognizerResult {
        let activity = Activity::message("conv", ChannelAccount::new("user", "User"), text);
        let turn_state = Map::new();
        let context = RecognizerContext {
            activity: &activity,
            turn_state: &turn_state,
        };
        recognizer.recognize(text, &context).unwrap()
    }

    #[test]
    fn test_first_matching_intent_wins() {
        let recognizer = RegexRecognizer::new()
            .intent("Cancel", r"(?i)\b(cancel|stop|quit)\b")
            .unwrap()
            .intent("Help", r"(?i)\bhelp\b")
            .unwrap();

        let result = recognize(&recognizer, "please stop, I need help");
        assert_eq!(result.top_intent, "Cancel");
        assert_eq!(result.score, 1.0);

        let result = recognize(&recognizer, "what's the weather");
        assert!(result.is_none_intent());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_entities_use_first_capture_group() {
        let recognizer = RegexRecognizer::new()
            .intent("AddItem", r"(?i)^add\b")
            .unwrap()
            .entity("item", r"(?i)add (\w+)")
            .unwrap();

        let result = recognize(&recognizer, "add milk");
        assert_eq!(result.top_intent, "AddItem");
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].value, json!("milk"));
        assert_eq!(result.entities[0].start, Some(4));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(RegexRecognizer::new().intent("Broken", "(unclosed").is_err());
    }
}
