//! Prompts: ask, validate, retry

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use super::{Dialog, DialogContext};
use crate::errors::{DialogError, DialogResult};
use crate::state::DialogInstance;
use crate::turn::TurnContext;
use crate::value_objects::{DialogReason, DialogTurnResult};

const OPTIONS: &str = "options";
const ATTEMPT_COUNT: &str = "attemptCount";

/// What to say when prompting
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptOptions {
    /// Initial prompt text (literal or `${Template}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Sent instead of `prompt` after a rejected answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_prompt: Option<String>,
    /// Accepted values for choice prompts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl PromptOptions {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry_prompt: impl Into<String>) -> Self {
        self.retry_prompt = Some(retry_prompt.into());
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }
}

/// Built-in acceptance rules
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Any non-empty text
    Text,
    /// Yes/no tokens, recognized as a boolean
    Confirm,
    /// A parseable number
    Number,
    /// An ISO date or date-time, or `dd/mm/yyyy`
    DateTime,
    /// One of the configured choices, by value or 1-based position
    Choice,
}

/// A recognized answer handed to a custom validator
#[derive(Debug, Clone, Copy)]
pub struct PromptRecognition<'a> {
    pub value: &'a Value,
    pub text: &'a str,
    /// 1 for the first answer
    pub attempt: u32,
}

/// Extra acceptance predicate applied after recognition
pub type PromptValidator = Box<dyn Fn(&PromptRecognition<'_>) -> bool + Send + Sync>;

/// Single-frame dialog that keeps asking until it gets an acceptable answer
///
/// Retries are unbounded unless `max_attempts` is set; when the limit is hit
/// the prompt completes with no result.
pub struct Prompt {
    id: String,
    kind: PromptKind,
    validator: Option<PromptValidator>,
    max_attempts: Option<u32>,
}

impl Prompt {
    pub fn new(id: impl Into<String>, kind: PromptKind) -> Self {
        Self {
            id: id.into(),
            kind,
            validator: None,
            max_attempts: None,
        }
    }

    pub fn text(id: impl Into<String>) -> Self {
        Self::new(id, PromptKind::Text)
    }

    pub fn confirm(id: impl Into<String>) -> Self {
        Self::new(id, PromptKind::Confirm)
    }

    pub fn number(id: impl Into<String>) -> Self {
        Self::new(id, PromptKind::Number)
    }

    pub fn date_time(id: impl Into<String>) -> Self {
        Self::new(id, PromptKind::DateTime)
    }

    pub fn choice(id: impl Into<String>) -> Self {
        Self::new(id, PromptKind::Choice)
    }

    /// Add a custom acceptance predicate
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&PromptRecognition<'_>) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Give up after this many rejected answers
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn kind(&self) -> PromptKind {
        self.kind
    }

    fn send_prompt(&self, turn: &mut TurnContext, options: &PromptOptions, retry: bool) {
        let raw = if retry {
            options.retry_prompt.as_ref().or(options.prompt.as_ref())
        } else {
            options.prompt.as_ref()
        };
        let Some(raw) = raw else {
            return;
        };

        let scope = turn.render_scope();
        let mut text = match turn.render_text(raw, &scope) {
            Ok(text) => text,
            Err(failure) => {
                warn!(prompt_id = %self.id, message = %failure.message, "prompt template failed, sending raw text");
                raw.clone()
            }
        };
        if self.kind == PromptKind::Choice && !options.choices.is_empty() {
            let listed: Vec<String> = options
                .choices
                .iter()
                .enumerate()
                .map(|(i, choice)| format!("({}) {}", i + 1, choice))
                .collect();
            text = format!("{text} {}", listed.join(", "));
        }
        turn.send_text(text);
    }
}

fn stored_options(instance: &DialogInstance) -> DialogResult<PromptOptions> {
    let raw = instance.state.get(OPTIONS).cloned().unwrap_or(Value::Null);
    serde_json::from_value(raw).map_err(|e| {
        DialogError::CorruptState(format!("{}: bad prompt options: {e}", instance.dialog_id))
    })
}

fn stored_attempts(instance: &DialogInstance) -> DialogResult<u32> {
    instance
        .state
        .get(ATTEMPT_COUNT)
        .and_then(Value::as_u64)
        .and_then(|count| u32::try_from(count).ok())
        .ok_or_else(|| {
            DialogError::CorruptState(format!("{}: bad attempt count", instance.dialog_id))
        })
}

impl Dialog for Prompt {
    fn id(&self) -> &str {
        &self.id
    }

    fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let options: PromptOptions = match options {
            Some(value) if !value.is_null() => serde_json::from_value(value)?,
            _ => PromptOptions::default(),
        };
        let state = dc.active_state_mut()?;
        state.insert(OPTIONS.to_string(), serde_json::to_value(&options)?);
        state.insert(ATTEMPT_COUNT.to_string(), json!(0));

        self.send_prompt(dc.turn_mut(), &options, false);
        Ok(DialogTurnResult::waiting())
    }

    fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> DialogResult<DialogTurnResult> {
        if !dc.turn().activity().is_message() {
            return Ok(DialogTurnResult::waiting());
        }
        let text = dc.turn().activity().text.clone().unwrap_or_default();

        let (options, attempt) = {
            let Some(instance) = dc.active_dialog_mut() else {
                return Ok(DialogTurnResult::waiting());
            };
            let attempt = stored_attempts(instance)?.saturating_add(1);
            instance
                .state
                .insert(ATTEMPT_COUNT.to_string(), json!(attempt));
            (stored_options(instance)?, attempt)
        };

        let accepted = recognize(self.kind, &text, &options).filter(|value| {
            self.validator.as_ref().is_none_or(|validate| {
                validate(&PromptRecognition {
                    value,
                    text: &text,
                    attempt,
                })
            })
        });
        if let Some(value) = accepted {
            return dc.end_dialog(Some(value));
        }

        if self.max_attempts.is_some_and(|max| attempt >= max) {
            warn!(prompt_id = %self.id, attempt, "prompt gave up after too many attempts");
            return dc.end_dialog(None);
        }

        self.send_prompt(dc.turn_mut(), &options, true);
        Ok(DialogTurnResult::waiting())
    }

    fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _reason: DialogReason,
        _result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        dc.reprompt_dialog()?;
        Ok(DialogTurnResult::waiting())
    }

    fn reprompt_dialog(
        &self,
        turn: &mut TurnContext,
        instance: &mut DialogInstance,
    ) -> DialogResult<()> {
        let options = stored_options(instance)?;
        self.send_prompt(turn, &options, false);
        Ok(())
    }

    fn validate_instance(&self, instance: &DialogInstance) -> DialogResult<()> {
        stored_options(instance)?;
        stored_attempts(instance).map(|_| ())
    }
}

/// Apply the built-in acceptance rule for `kind`
pub fn recognize(kind: PromptKind, text: &str, options: &PromptOptions) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match kind {
        PromptKind::Text => Some(Value::String(text.to_string())),
        PromptKind::Confirm => recognize_confirm(text).map(Value::Bool),
        PromptKind::Number => recognize_number(text),
        PromptKind::DateTime => recognize_date_time(text).map(Value::String),
        PromptKind::Choice => recognize_choice(text, &options.choices),
    }
}

fn recognize_confirm(text: &str) -> Option<bool> {
    let lowered = text.to_lowercase();
    let token = lowered.trim_end_matches(['.', '!']);
    match token {
        "yes" | "y" | "yeah" | "yep" | "sure" | "ok" | "okay" | "true" | "1" => Some(true),
        "no" | "n" | "nope" | "nah" | "false" | "2" => Some(false),
        _ => None,
    }
}

fn recognize_number(text: &str) -> Option<Value> {
    let cleaned: String = text.chars().filter(|c| *c != ',' && *c != '_').collect();
    if let Ok(integer) = cleaned.parse::<i64>() {
        return Some(Value::from(integer));
    }
    let float = cleaned.parse::<f64>().ok().filter(|f| f.is_finite())?;
    serde_json::Number::from_f64(float).map(Value::Number)
}

fn recognize_date_time(text: &str) -> Option<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.to_rfc3339());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d %B %Y", "%B %d %Y", "%B %d, %Y"] {
        if let Ok(parsed) = NaiveDate::parse_from_str(text, format) {
            return Some(parsed.format("%Y-%m-%d").to_string());
        }
    }
    None
}

fn recognize_choice(text: &str, choices: &[String]) -> Option<Value> {
    let position = choices
        .iter()
        .position(|choice| choice.eq_ignore_ascii_case(text))
        .or_else(|| {
            text.parse::<usize>()
                .ok()
                .filter(|n| (1..=choices.len()).contains(n))
                .map(|n| n - 1)
        })?;
    Some(json!({
        "value": choices[position],
        "index": position,
        "score": 1.0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_tokens() {
        let options = PromptOptions::default();
        assert_eq!(recognize(PromptKind::Confirm, "Yes", &options), Some(json!(true)));
        assert_eq!(recognize(PromptKind::Confirm, " nope ", &options), Some(json!(false)));
        assert_eq!(recognize(PromptKind::Confirm, "maybe", &options), None);
    }

    #[test]
    fn test_text_rejects_blank() {
        let options = PromptOptions::default();
        assert_eq!(recognize(PromptKind::Text, "   ", &options), None);
        assert_eq!(
            recognize(PromptKind::Text, " Paris ", &options),
            Some(json!("Paris"))
        );
    }

    #[test]
    fn test_numbers() {
        let options = PromptOptions::default();
        assert_eq!(recognize(PromptKind::Number, "1,200", &options), Some(json!(1200)));
        assert_eq!(recognize(PromptKind::Number, "2.5", &options), Some(json!(2.5)));
        assert_eq!(recognize(PromptKind::Number, "two", &options), None);
        assert_eq!(recognize(PromptKind::Number, "NaN", &options), None);
    }

    #[test]
    fn test_dates() {
        let options = PromptOptions::default();
        assert_eq!(
            recognize(PromptKind::DateTime, "2026-03-05", &options),
            Some(json!("2026-03-05"))
        );
        assert_eq!(
            recognize(PromptKind::DateTime, "05/03/2026", &options),
            Some(json!("2026-03-05"))
        );
        assert_eq!(
            recognize(PromptKind::DateTime, "2026-03-05 10:30", &options),
            Some(json!("2026-03-05T10:30:00"))
        );
        assert_eq!(recognize(PromptKind::DateTime, "next tuesday", &options), None);
    }

    #[test]
    fn test_choices_by_value_and_position() {
        let options = PromptOptions::text("Pick a card").with_choices(["Hero card", "Audio card"]);

        assert_eq!(
            recognize(PromptKind::Choice, "hero card", &options),
            Some(json!({"value": "Hero card", "index": 0, "score": 1.0}))
        );
        assert_eq!(
            recognize(PromptKind::Choice, "2", &options).map(|v| v["value"].clone()),
            Some(json!("Audio card"))
        );
        assert_eq!(recognize(PromptKind::Choice, "3", &options), None);
        assert_eq!(recognize(PromptKind::Choice, "video card", &options), None);
    }
}
