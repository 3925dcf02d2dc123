//! Component dialog: a dialog that runs its own nested stack

use serde_json::Value;
use tracing::debug;

use super::{Dialog, DialogContext, DialogSet};
use crate::errors::{DialogError, DialogResult};
use crate::state::{DialogInstance, DialogState};
use crate::turn::TurnContext;
use crate::value_objects::{DialogReason, DialogTurnResult, DialogTurnStatus};

/// Frame state key holding the nested stack
pub const INNER_STACK: &str = "dialogs";

/// Groups a private set of dialogs behind one id
///
/// The nested stack is stored inside this dialog's frame, so to the outer
/// stack a component is a single frame however deep its inner stack grows.
/// When the inner stack empties the component ends with the inner result.
pub struct ComponentDialog {
    id: String,
    initial_dialog_id: Option<String>,
    dialogs: DialogSet,
}

impl ComponentDialog {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            initial_dialog_id: None,
            dialogs: DialogSet::new(),
        }
    }

    /// Register a child dialog; the first one added is the initial dialog
    /// unless [`ComponentDialog::with_initial_dialog`] says otherwise.
    pub fn add_dialog(mut self, dialog: impl Dialog + 'static) -> DialogResult<Self> {
        let id = dialog.id().to_string();
        self.dialogs.add(dialog)?;
        self.initial_dialog_id.get_or_insert(id);
        Ok(self)
    }

    pub fn with_initial_dialog(mut self, dialog_id: impl Into<String>) -> Self {
        self.initial_dialog_id = Some(dialog_id.into());
        self
    }

    pub fn dialogs(&self) -> &DialogSet {
        &self.dialogs
    }

    fn initial_dialog_id(&self) -> DialogResult<&str> {
        let id = self
            .initial_dialog_id
            .as_deref()
            .ok_or_else(|| DialogError::UnknownDialog(format!("{}/<initial>", self.id)))?;
        if !self.dialogs.contains(id) {
            return Err(DialogError::UnknownDialog(id.to_string()));
        }
        Ok(id)
    }

    fn inner_state(instance: &DialogInstance) -> DialogResult<DialogState> {
        DialogState::from_value(instance.state.get(INNER_STACK).unwrap_or(&Value::Null))
    }

    /// Run `op` against the nested stack of the active frame, persist the
    /// nested stack back into the frame and end the component when the
    /// nested stack finished.
    fn run_inner<F>(&self, dc: &mut DialogContext<'_>, op: F) -> DialogResult<DialogTurnResult>
    where
        F: FnOnce(&mut DialogContext<'_>) -> DialogResult<DialogTurnResult>,
    {
        let frame = dc
            .depth()
            .checked_sub(1)
            .ok_or_else(|| DialogError::FrameNotActive(self.id.clone()))?;
        let mut inner = match dc.active_dialog() {
            Some(instance) => Self::inner_state(instance)?,
            None => return Err(DialogError::FrameNotActive(self.id.clone())),
        };

        let outcome = {
            let mut inner_dc = DialogContext::new(&self.dialogs, &mut inner.dialog_stack, dc.turn_mut());
            op(&mut inner_dc)?
        };

        let persisted = inner.to_value()?;
        if let Some(instance) = dc.frame_mut(frame) {
            instance.state.insert(INNER_STACK.to_string(), persisted);
        }

        match outcome.status {
            DialogTurnStatus::Waiting => Ok(outcome),
            DialogTurnStatus::Active if !inner.is_empty() => Ok(DialogTurnResult::waiting()),
            _ => {
                debug!(dialog_id = %self.id, status = ?outcome.status, "nested stack finished");
                dc.end_dialog(outcome.result)
            }
        }
    }
}

impl Dialog for ComponentDialog {
    fn id(&self) -> &str {
        &self.id
    }

    fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let initial = self.initial_dialog_id()?.to_string();
        self.run_inner(dc, |inner| inner.begin_dialog(&initial, options))
    }

    fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> DialogResult<DialogTurnResult> {
        self.run_inner(dc, |inner| inner.continue_dialog())
    }

    /// Something pushed on the outer stack above us ended; the nested stack
    /// is still waiting on its own prompt, so show it again.
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
        let mut inner = Self::inner_state(instance)?;
        DialogContext::new(&self.dialogs, &mut inner.dialog_stack, turn).reprompt_dialog()?;
        instance
            .state
            .insert(INNER_STACK.to_string(), inner.to_value()?);
        Ok(())
    }

    fn end_dialog(
        &self,
        turn: &mut TurnContext,
        instance: &mut DialogInstance,
        reason: DialogReason,
    ) -> DialogResult<()> {
        if !matches!(reason, DialogReason::CancelCalled | DialogReason::ReplaceCalled) {
            return Ok(());
        }
        let mut inner = Self::inner_state(instance)?;
        if inner.is_empty() {
            return Ok(());
        }
        debug!(dialog_id = %self.id, depth = inner.depth(), "cancelling nested stack");
        DialogContext::new(&self.dialogs, &mut inner.dialog_stack, turn).cancel_all_dialogs()?;
        instance
            .state
            .insert(INNER_STACK.to_string(), inner.to_value()?);
        Ok(())
    }

    fn validate_instance(&self, instance: &DialogInstance) -> DialogResult<()> {
        let inner = Self::inner_state(instance)?;
        self.dialogs.validate_stack(&inner)
    }
}

impl std::fmt::Debug for ComponentDialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDialog")
            .field("id", &self.id)
            .field("initial_dialog_id", &self.initial_dialog_id)
            .field("dialogs", &self.dialogs)
            .finish()
    }
}
