//! Dialog execution engine
//!
//! A turn-based state machine for multi-step conversations. Each turn takes
//! an inbound activity plus the persisted dialog stack and returns the
//! outbound activities plus the updated stack:
//! - Stack operations (begin, continue, end, replace, cancel) over frames
//!   owned by registered dialogs
//! - Waterfall, prompt, component and adaptive (rule-driven) dialogs
//! - A pure-function turn host and an optimistic scale-out runner
//!
//! Recognizers, language generators and state stores are injected
//! collaborators; the engine never talks to a network service itself.

pub mod adaptive;
pub mod collaborators;
pub mod dialogs;
pub mod errors;
pub mod host;
pub mod scaleout;
pub mod state;
pub mod turn;
pub mod value_objects;

// Re-export main types
pub use adaptive::{Action, AdaptiveDialog, Expression, Trigger, TriggerKind};

pub use collaborators::{
    CollaboratorFailure, CollaboratorKind, LanguageGenerator, Recognizer, RecognizerContext,
    RegexRecognizer, TemplateGenerator,
};

pub use dialogs::{
    ComponentDialog, Dialog, DialogContext, DialogSet, Prompt, PromptKind, PromptOptions,
    PromptRecognition, WaterfallDialog, WaterfallStepContext,
};

pub use errors::{DialogError, DialogResult};
pub use host::{CorruptStatePolicy, HostConfig, TurnHost, TurnOutput};
pub use scaleout::{MemoryStore, SaveOutcome, ScaleoutConfig, ScaleoutRunner, StateStore, StoreItem};
pub use state::{DialogInstance, DialogState};
pub use turn::{BufferingChannel, TurnContext};

pub use value_objects::{
    Activity, ActivityType, ChannelAccount, DialogReason, DialogTurnResult, DialogTurnStatus,
    Entity, RecognizerResult,
};
