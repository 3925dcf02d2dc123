//! Dialog context: stack operations for the executing dialog

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{DialogSet, PromptOptions};
use crate::errors::{DialogError, DialogResult};
use crate::state::DialogInstance;
use crate::turn::TurnContext;
use crate::value_objects::{DialogReason, DialogTurnResult, DialogTurnStatus};

/// Per-turn coordinator over one dialog stack
///
/// Containers create a child context over their nested stack and the same
/// turn, so a single logical call threads through every nesting level.
pub struct DialogContext<'a> {
    dialogs: &'a DialogSet,
    stack: &'a mut Vec<DialogInstance>,
    turn: &'a mut TurnContext,
}

impl<'a> DialogContext<'a> {
    pub fn new(
        dialogs: &'a DialogSet,
        stack: &'a mut Vec<DialogInstance>,
        turn: &'a mut TurnContext,
    ) -> Self {
        Self {
            dialogs,
            stack,
            turn,
        }
    }

    /// Dialogs reachable from this stack
    pub fn dialogs(&self) -> &'a DialogSet {
        self.dialogs
    }

    pub fn turn(&self) -> &TurnContext {
        &*self.turn
    }

    pub fn turn_mut(&mut self) -> &mut TurnContext {
        &mut *self.turn
    }

    /// Frames, root first
    pub fn stack(&self) -> &[DialogInstance] {
        self.stack.as_slice()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The frame currently receiving events
    pub fn active_dialog(&self) -> Option<&DialogInstance> {
        self.stack.last()
    }

    pub fn active_dialog_mut(&mut self) -> Option<&mut DialogInstance> {
        self.stack.last_mut()
    }

    /// Frame at a fixed position from the root
    pub fn frame_mut(&mut self, index: usize) -> Option<&mut DialogInstance> {
        self.stack.get_mut(index)
    }

    /// State of the active frame
    pub fn active_state_mut(&mut self) -> DialogResult<&mut Map<String, Value>> {
        self.stack
            .last_mut()
            .map(|frame| &mut frame.state)
            .ok_or_else(|| DialogError::FrameNotActive("<empty stack>".to_string()))
    }

    /// Reply to the sender with plain text
    pub fn send_text(&mut self, text: impl Into<String>) -> String {
        self.turn.send_text(text)
    }

    /// Push a frame for `dialog_id` and start it
    pub fn begin_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let dialog = self.dialogs.get(dialog_id)?;
        self.stack.push(DialogInstance::new(dialog_id));
        debug!(dialog_id, depth = self.stack.len(), "dialog pushed");
        dialog.begin_dialog(self, options)
    }

    /// Start a prompt dialog
    pub fn prompt(
        &mut self,
        dialog_id: &str,
        options: PromptOptions,
    ) -> DialogResult<DialogTurnResult> {
        let options = serde_json::to_value(options)?;
        self.begin_dialog(dialog_id, Some(options))
    }

    /// Route the inbound event to the active frame
    ///
    /// Returns `Empty` when there is nothing on the stack; starting a root
    /// dialog in that case is the caller's decision.
    pub fn continue_dialog(&mut self) -> DialogResult<DialogTurnResult> {
        let Some(active) = self.stack.last() else {
            return Ok(DialogTurnResult::new(DialogTurnStatus::Empty));
        };
        let dialog = self.dialogs.get(&active.dialog_id)?;
        dialog.continue_dialog(self)
    }

    /// Pop the active frame and resume its parent with `result`
    pub fn end_dialog(&mut self, result: Option<Value>) -> DialogResult<DialogTurnResult> {
        self.end_active_dialog(DialogReason::EndCalled);

        let Some(parent) = self.stack.last_mut() else {
            return Ok(DialogTurnResult::complete(result));
        };
        parent.result = result.clone();
        let dialog = self.dialogs.get(&parent.dialog_id)?;
        dialog.resume_dialog(self, DialogReason::EndCalled, result)
    }

    /// Pop the active frame and begin `dialog_id` in its place
    pub fn replace_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        if !self.dialogs.contains(dialog_id) {
            return Err(DialogError::UnknownDialog(dialog_id.to_string()));
        }
        self.end_active_dialog(DialogReason::ReplaceCalled);
        self.begin_dialog(dialog_id, options)
    }

    /// Pop every frame, top to bottom, running each cancellation hook
    pub fn cancel_all_dialogs(&mut self) -> DialogResult<DialogTurnResult> {
        if self.stack.is_empty() {
            return Ok(DialogTurnResult::new(DialogTurnStatus::Empty));
        }
        while !self.stack.is_empty() {
            self.end_active_dialog(DialogReason::CancelCalled);
        }
        Ok(DialogTurnResult::new(DialogTurnStatus::Cancelled))
    }

    /// Pop the frames above the nearest frame of `dialog_id`
    ///
    /// The target frame stays on the stack and becomes active.
    pub fn cancel_until(&mut self, dialog_id: &str) -> DialogResult<DialogTurnResult> {
        if !self.stack.iter().any(|frame| frame.dialog_id == dialog_id) {
            return Err(DialogError::NotOnStack(dialog_id.to_string()));
        }
        while self
            .stack
            .last()
            .is_some_and(|frame| frame.dialog_id != dialog_id)
        {
            self.end_active_dialog(DialogReason::CancelCalled);
        }
        Ok(DialogTurnResult::new(DialogTurnStatus::Cancelled))
    }

    /// Ask the active dialog to re-emit its prompt
    pub fn reprompt_dialog(&mut self) -> DialogResult<()> {
        let dialogs = self.dialogs;
        let Some(instance) = self.stack.last_mut() else {
            return Ok(());
        };
        let dialog = dialogs.get(&instance.dialog_id)?;
        dialog.reprompt_dialog(self.turn, instance)
    }

    fn end_active_dialog(&mut self, reason: DialogReason) {
        let Some(mut instance) = self.stack.pop() else {
            return;
        };
        debug!(
            dialog_id = %instance.dialog_id,
            ?reason,
            depth = self.stack.len(),
            "dialog popped"
        );

        let Some(dialog) = self.dialogs.find(&instance.dialog_id).map(Arc::clone) else {
            warn!(dialog_id = %instance.dialog_id, "popped frame has no registered dialog");
            return;
        };
        if let Err(error) = dialog.end_dialog(self.turn, &mut instance, reason) {
            warn!(
                dialog_id = %instance.dialog_id,
                ?reason,
                %error,
                "end hook failed, continuing"
            );
        }
    }
}

impl std::fmt::Debug for DialogContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogContext")
            .field("stack", &self.stack)
            .field("turn", &self.turn)
            .finish()
    }
}
