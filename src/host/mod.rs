//! Turn host: the pure-function boundary around one turn
//!
//! `run(activity, old_state)` decodes the persisted stack, drives one dialog
//! context cycle to completion or suspension and hands back the buffered
//! outbound activities with the re-encoded stack. Nothing is read from the
//! clock or other ambient sources, so equal inputs give equal outputs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::collaborators::LanguageGenerator;
use crate::dialogs::{DialogContext, DialogSet};
use crate::errors::{DialogError, DialogResult};
use crate::state::DialogState;
use crate::turn::{DEFAULT_MAX_CHAINED_STEPS, TurnContext};
use crate::value_objects::{Activity, ChannelAccount, DialogTurnResult, DialogTurnStatus};

/// What to do with persisted state that fails validation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CorruptStatePolicy {
    /// Drop it and start the conversation over
    #[default]
    Discard,
    /// Fail the turn with `CorruptState`
    Fail,
}

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    /// Steps and actions a turn may run without waiting for input
    pub max_chained_steps: usize,
    pub corrupt_state: CorruptStatePolicy,
    /// Sender of replies when the inbound activity has no recipient
    pub bot: ChannelAccount,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_chained_steps: DEFAULT_MAX_CHAINED_STEPS,
            corrupt_state: CorruptStatePolicy::default(),
            bot: ChannelAccount::default(),
        }
    }
}

impl HostConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(raw: &str) -> DialogResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Everything one turn produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutput {
    pub outbound_events: Vec<Activity>,
    pub new_state: Value,
    pub status: DialogTurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Runs turns for one root dialog over a shared, read-only dialog set
#[derive(Clone)]
pub struct TurnHost {
    dialogs: Arc<DialogSet>,
    root_dialog_id: String,
    generator: Option<Arc<dyn LanguageGenerator>>,
    config: HostConfig,
}

impl TurnHost {
    /// Fails with `UnknownDialog` when the root is not registered
    pub fn new(dialogs: impl Into<Arc<DialogSet>>, root_dialog_id: impl Into<String>) -> DialogResult<Self> {
        let dialogs = dialogs.into();
        let root_dialog_id = root_dialog_id.into();
        if !dialogs.contains(&root_dialog_id) {
            return Err(DialogError::UnknownDialog(root_dialog_id));
        }
        Ok(Self {
            dialogs,
            root_dialog_id,
            generator: None,
            config: HostConfig::default(),
        })
    }

    pub fn with_generator(self, generator: impl LanguageGenerator + 'static) -> Self {
        self.with_shared_generator(Arc::new(generator))
    }

    pub fn with_shared_generator(mut self, generator: Arc<dyn LanguageGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn dialogs(&self) -> &DialogSet {
        &self.dialogs
    }

    pub fn root_dialog_id(&self) -> &str {
        &self.root_dialog_id
    }

    /// Decode and validate persisted state, applying the corrupt-state policy
    pub fn load_state(&self, conversation_id: &str, old_state: &Value) -> DialogResult<DialogState> {
        let loaded = DialogState::from_value(old_state).and_then(|state| {
            self.dialogs.validate_stack(&state)?;
            Ok(state)
        });
        match loaded {
            Ok(state) => Ok(state),
            Err(error) if error.is_corrupt_state() => match self.config.corrupt_state {
                CorruptStatePolicy::Discard => {
                    warn!(conversation_id, %error, "discarding corrupt dialog state");
                    Ok(DialogState::new())
                }
                CorruptStatePolicy::Fail => Err(error),
            },
            Err(error) => Err(error),
        }
    }

    /// Process one inbound activity against `old_state`
    pub fn run(&self, activity: &Activity, old_state: &Value) -> DialogResult<TurnOutput> {
        let conversation_id = activity.conversation_id.as_str();
        let mut state = self.load_state(conversation_id, old_state)?;
        let mut turn = TurnContext::new(activity.clone())
            .with_generator(self.generator.clone())
            .with_bot(self.config.bot.clone())
            .with_max_chained_steps(self.config.max_chained_steps);

        let outcome = {
            let mut dc = DialogContext::new(&self.dialogs, &mut state.dialog_stack, &mut turn);
            let continued = dc.continue_dialog()?;
            if continued.status == DialogTurnStatus::Empty {
                dc.begin_dialog(&self.root_dialog_id, None)?
            } else {
                continued
            }
        };

        let outbound_events = turn.take_outbound();
        let new_state = state.to_value()?;
        info!(
            conversation_id,
            status = ?outcome.status,
            depth = state.depth(),
            outbound = outbound_events.len(),
            steps = turn.steps_taken(),
            "turn complete"
        );

        let DialogTurnResult { status, result } = outcome;
        Ok(TurnOutput {
            outbound_events,
            new_state,
            status,
            result,
        })
    }
}

impl std::fmt::Debug for TurnHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnHost")
            .field("root_dialog_id", &self.root_dialog_id)
            .field("dialogs", &self.dialogs)
            .field("config", &self.config)
            .finish()
    }
}
