//! Dialogs and the registry that owns them
//!
//! A [`Dialog`] is stateless logic. Everything it remembers between turns
//! lives in its [`DialogInstance`] frame on the stack, which the
//! [`DialogContext`] hands back to it on every call.

pub mod component;
pub mod context;
pub mod prompt;
pub mod waterfall;

pub use component::ComponentDialog;
pub use context::DialogContext;
pub use prompt::{Prompt, PromptKind, PromptOptions, PromptRecognition};
pub use waterfall::{WaterfallDialog, WaterfallStepContext};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::{DialogError, DialogResult};
use crate::state::{DialogInstance, DialogState};
use crate::turn::TurnContext;
use crate::value_objects::{DialogReason, DialogTurnResult};

/// Capability set every dialog variant implements
pub trait Dialog: Send + Sync {
    /// Unique id within the owning [`DialogSet`]
    fn id(&self) -> &str;

    /// Called right after the frame for this dialog was pushed
    fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult>;

    /// Called with a new inbound event while this dialog is on top
    fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> DialogResult<DialogTurnResult> {
        dc.end_dialog(None)
    }

    /// Called when a child pushed by this dialog ended
    fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        dc.end_dialog(result)
    }

    /// Re-emit whatever this dialog is waiting on
    fn reprompt_dialog(
        &self,
        _turn: &mut TurnContext,
        _instance: &mut DialogInstance,
    ) -> DialogResult<()> {
        Ok(())
    }

    /// Cleanup hook, run for every frame pop (end, replace and cancel)
    ///
    /// Failures are logged by the caller and never stop a cancellation sweep.
    fn end_dialog(
        &self,
        _turn: &mut TurnContext,
        _instance: &mut DialogInstance,
        _reason: DialogReason,
    ) -> DialogResult<()> {
        Ok(())
    }

    /// Structural check of a persisted frame owned by this dialog
    fn validate_instance(&self, _instance: &DialogInstance) -> DialogResult<()> {
        Ok(())
    }
}

/// Registry of dialogs keyed by id
///
/// Built once and then shared read-only across turns and threads.
#[derive(Clone, Default)]
pub struct DialogSet {
    dialogs: HashMap<String, Arc<dyn Dialog>>,
}

impl DialogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialog
    pub fn add(&mut self, dialog: impl Dialog + 'static) -> DialogResult<&mut Self> {
        self.add_shared(Arc::new(dialog))
    }

    /// Register a dialog that is already shared
    pub fn add_shared(&mut self, dialog: Arc<dyn Dialog>) -> DialogResult<&mut Self> {
        let id = dialog.id().to_string();
        if self.dialogs.contains_key(&id) {
            return Err(DialogError::DuplicateDialog(id));
        }
        self.dialogs.insert(id, dialog);
        Ok(self)
    }

    pub fn find(&self, dialog_id: &str) -> Option<&Arc<dyn Dialog>> {
        self.dialogs.get(dialog_id)
    }

    /// Look up a dialog, failing with `UnknownDialog`
    pub fn get(&self, dialog_id: &str) -> DialogResult<Arc<dyn Dialog>> {
        self.find(dialog_id)
            .cloned()
            .ok_or_else(|| DialogError::UnknownDialog(dialog_id.to_string()))
    }

    pub fn contains(&self, dialog_id: &str) -> bool {
        self.dialogs.contains_key(dialog_id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.dialogs.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    /// Check that every frame resolves in this set, recursively
    pub fn validate_stack(&self, state: &DialogState) -> DialogResult<()> {
        for frame in &state.dialog_stack {
            let dialog = self.find(&frame.dialog_id).ok_or_else(|| {
                DialogError::CorruptState(format!(
                    "frame references unknown dialog '{}'",
                    frame.dialog_id
                ))
            })?;
            dialog.validate_instance(frame)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DialogSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogSet").field("ids", &self.ids()).finish()
    }
}
