//! Waterfall dialog: a fixed sequence of steps sharing one accumulator

use serde_json::{Map, Value};

use super::{Dialog, DialogContext, PromptOptions};
use crate::errors::{DialogError, DialogResult};
use crate::state::DialogInstance;
use crate::state::memory::object_entry;
use crate::value_objects::{DialogReason, DialogTurnResult, DialogTurnStatus};

const OPTIONS: &str = "options";
const VALUES: &str = "values";
const STEP_INDEX: &str = "stepIndex";

/// A single waterfall step
pub type WaterfallStep =
    Box<dyn Fn(&mut WaterfallStepContext<'_, '_>) -> DialogResult<DialogTurnResult> + Send + Sync>;

/// Runs steps in order; the step index is kept in the frame so the sequence
/// survives turn boundaries.
///
/// A step either waits (prompting or starting a child), ends the dialog, or
/// calls [`WaterfallStepContext::next`] to advance immediately. Running past
/// the last step ends the waterfall with the last result handed along.
pub struct WaterfallDialog {
    id: String,
    steps: Vec<WaterfallStep>,
}

impl WaterfallDialog {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step<F>(mut self, step: F) -> Self
    where
        F: Fn(&mut WaterfallStepContext<'_, '_>) -> DialogResult<DialogTurnResult>
            + Send
            + Sync
            + 'static,
    {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn run_steps(
        &self,
        dc: &mut DialogContext<'_>,
        mut index: usize,
        mut reason: DialogReason,
        mut result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        loop {
            if index >= self.steps.len() {
                return dc.end_dialog(result);
            }
            dc.turn_mut().consume_step(&self.id)?;

            let frame = dc.depth().checked_sub(1).ok_or_else(|| {
                DialogError::FrameNotActive(self.id.clone())
            })?;
            let options = {
                let state = dc.active_state_mut()?;
                state.insert(STEP_INDEX.to_string(), Value::from(index));
                state.get(OPTIONS).cloned()
            };

            let mut step = WaterfallStepContext {
                dc: &mut *dc,
                dialog_id: &self.id,
                frame,
                index,
                reason,
                result: result.take(),
                options,
                next: None,
            };
            let turn_result = (self.steps[index])(&mut step)?;

            match step.next.take() {
                Some(next_result) => {
                    index += 1;
                    reason = DialogReason::NextCalled;
                    result = next_result;
                }
                None => return Ok(turn_result),
            }
        }
    }
}

impl Dialog for WaterfallDialog {
    fn id(&self) -> &str {
        &self.id
    }

    fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let state = dc.active_state_mut()?;
        state.insert(OPTIONS.to_string(), options.unwrap_or(Value::Null));
        state.insert(VALUES.to_string(), Value::Object(Map::new()));
        self.run_steps(dc, 0, DialogReason::BeginCalled, None)
    }

    fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> DialogResult<DialogTurnResult> {
        // Only messages move a waiting waterfall forward
        if !dc.turn().activity().is_message() {
            return Ok(DialogTurnResult::waiting());
        }
        let text = dc.turn().activity().text.clone().map(Value::String);
        self.resume_dialog(dc, DialogReason::ContinueCalled, text)
    }

    fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let next = dc
            .active_dialog()
            .and_then(step_index)
            .and_then(|current| current.checked_add(1))
            .ok_or_else(|| DialogError::CorruptState(format!("{}: bad step index", self.id)))?;
        self.run_steps(dc, next, reason, result)
    }

    fn validate_instance(&self, instance: &DialogInstance) -> DialogResult<()> {
        match step_index(instance) {
            Some(index) if index < self.steps.len() => Ok(()),
            _ => Err(DialogError::CorruptState(format!(
                "{}: step index {} outside 0..{}",
                self.id,
                instance.state.get(STEP_INDEX).unwrap_or(&Value::Null),
                self.steps.len()
            ))),
        }
    }
}

fn step_index(instance: &DialogInstance) -> Option<usize> {
    instance
        .state
        .get(STEP_INDEX)
        .and_then(Value::as_u64)
        .and_then(|index| usize::try_from(index).ok())
}

/// What a step sees while it runs
pub struct WaterfallStepContext<'d, 'a> {
    dc: &'d mut DialogContext<'a>,
    dialog_id: &'d str,
    frame: usize,
    index: usize,
    reason: DialogReason,
    result: Option<Value>,
    options: Option<Value>,
    next: Option<Option<Value>>,
}

impl<'a> WaterfallStepContext<'_, 'a> {
    /// Zero-based position of this step
    pub fn index(&self) -> usize {
        self.index
    }

    /// Why this step is running
    pub fn reason(&self) -> DialogReason {
        self.reason
    }

    /// Value handed over by the previous step, prompt or child dialog
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Previous result as text
    pub fn result_str(&self) -> Option<&str> {
        self.result.as_ref().and_then(Value::as_str)
    }

    /// Options the waterfall was started with
    pub fn options(&self) -> Option<&Value> {
        self.options.as_ref().filter(|v| !v.is_null())
    }

    /// Read one entry of the accumulator shared by all steps
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.dc
            .stack()
            .get(self.frame)
            .filter(|frame| frame.dialog_id == self.dialog_id)
            .and_then(|frame| frame.state.get(VALUES))
            .and_then(|values| values.get(key))
    }

    /// Copy of the whole accumulator
    pub fn values_snapshot(&self) -> Value {
        self.dc
            .stack()
            .get(self.frame)
            .filter(|frame| frame.dialog_id == self.dialog_id)
            .and_then(|frame| frame.state.get(VALUES))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Mutable accumulator; fails once the frame has been popped
    pub fn values_mut(&mut self) -> DialogResult<&mut Map<String, Value>> {
        let dialog_id = self.dialog_id;
        let frame = self
            .dc
            .frame_mut(self.frame)
            .filter(|frame| frame.dialog_id == dialog_id)
            .ok_or_else(|| DialogError::FrameNotActive(dialog_id.to_string()))?;
        Ok(object_entry(&mut frame.state, VALUES))
    }

    /// The underlying dialog context
    pub fn context(&mut self) -> &mut DialogContext<'a> {
        &mut *self.dc
    }

    /// Reply with plain text
    pub fn send_text(&mut self, text: impl Into<String>) -> String {
        self.dc.send_text(text)
    }

    /// Advance to the next step in this same turn
    pub fn next(&mut self, result: Option<Value>) -> DialogResult<DialogTurnResult> {
        self.next = Some(result);
        Ok(DialogTurnResult::new(DialogTurnStatus::Active))
    }

    /// Start a prompt; its answer becomes the next step's result
    pub fn prompt(
        &mut self,
        dialog_id: &str,
        options: PromptOptions,
    ) -> DialogResult<DialogTurnResult> {
        self.dc.prompt(dialog_id, options)
    }

    /// Start a child dialog; its result becomes the next step's result
    pub fn begin_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.dc.begin_dialog(dialog_id, options)
    }

    /// End the waterfall with a result
    pub fn end_dialog(&mut self, result: Option<Value>) -> DialogResult<DialogTurnResult> {
        self.dc.end_dialog(result)
    }

    /// Restart the waterfall, or swap in another dialog
    pub fn replace_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.dc.replace_dialog(dialog_id, options)
    }

    /// Cancel the whole stack
    pub fn cancel_all_dialogs(&mut self) -> DialogResult<DialogTurnResult> {
        self.dc.cancel_all_dialogs()
    }
}
