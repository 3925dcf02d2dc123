//! Adaptive dialog: prioritized trigger rules over turn and dialog memory
//!
//! On every event the dialog evaluates its triggers in priority order and
//! runs the actions of the first one whose kind and condition match. The
//! pending actions are kept in the frame as a plan of cursors, so a sequence
//! suspended on a child dialog or an `EndTurn` picks up where it stopped on a
//! later turn.

pub mod action;
pub mod expression;
pub mod trigger;

pub use action::{Action, PropertyPath, PropertyScope};
pub use expression::Expression;
pub use trigger::{Trigger, TriggerKind};

use std::cmp::Reverse;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::collaborators::{CollaboratorFailure, CollaboratorKind, Recognizer, RecognizerContext};
use crate::dialogs::{Dialog, DialogContext};
use crate::errors::{DialogError, DialogResult};
use crate::state::DialogInstance;
use crate::state::memory::{object_entry, remove_path, set_path};
use crate::value_objects::{ActivityType, DialogReason, DialogTurnResult, RecognizerResult};
use trigger::TriggerEvent;

const OPTIONS: &str = "options";
const VALUES: &str = "values";
const PLAN: &str = "plan";
const PENDING_RESULT: &str = "pendingResult";

/// Turn memory key for the recognition of the current message
pub const RECOGNIZED: &str = "recognized";
/// Turn memory key for the last collaborator failure
pub const TURN_ERROR: &str = "error";

/// Cursor into one action list of a trigger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct PlanFrame {
    trigger: usize,
    /// Alternating action index / branch index from the trigger root
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    block: Vec<usize>,
    next: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    foreach: Option<ForEachCursor>,
}

impl PlanFrame {
    fn root(trigger: usize) -> Self {
        Self {
            trigger,
            block: Vec::new(),
            next: 0,
            foreach: None,
        }
    }

    fn child(&self, action: usize, branch: usize) -> Self {
        let mut block = self.block.clone();
        block.extend([action, branch]);
        Self {
            trigger: self.trigger,
            block,
            next: 0,
            foreach: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ForEachCursor {
    items: Vec<Value>,
    index: usize,
}

enum Flow {
    Next,
    Return(DialogTurnResult),
}

/// Rule-driven dialog
pub struct AdaptiveDialog {
    id: String,
    recognizer: Option<Arc<dyn Recognizer>>,
    triggers: Vec<Trigger>,
    auto_end_dialog: bool,
}

impl AdaptiveDialog {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            recognizer: None,
            triggers: Vec::new(),
            auto_end_dialog: false,
        }
    }

    pub fn with_recognizer(mut self, recognizer: impl Recognizer + 'static) -> Self {
        self.recognizer = Some(Arc::new(recognizer));
        self
    }

    pub fn with_shared_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// End the dialog with `dialog.result` once no actions are pending
    pub fn with_auto_end_dialog(mut self, auto_end_dialog: bool) -> Self {
        self.auto_end_dialog = auto_end_dialog;
        self
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Index of the first trigger accepting `event`, by descending priority
    /// then declaration order
    fn select_trigger(&self, event: &TriggerEvent, scope: &Value) -> Option<usize> {
        let mut order: Vec<usize> = (0..self.triggers.len()).collect();
        order.sort_by_key(|&i| Reverse(self.triggers[i].priority));

        let selected = order.into_iter().find(|&i| {
            let trigger = &self.triggers[i];
            trigger.kind.accepts(event)
                && trigger
                    .condition
                    .as_ref()
                    .is_none_or(|condition| self.condition_holds(condition, scope))
        });
        if let Some(index) = selected {
            debug!(
                dialog_id = %self.id,
                trigger = index,
                kind = ?self.triggers[index].kind,
                priority = self.triggers[index].priority,
                "trigger selected"
            );
        }
        selected
    }

    fn condition_holds(&self, condition: &Expression, scope: &Value) -> bool {
        match condition.is_true(scope) {
            Ok(holds) => holds,
            Err(error) => {
                warn!(dialog_id = %self.id, %error, "condition failed to evaluate, treating as false");
                false
            }
        }
    }

    /// Action list addressed by a plan frame
    fn resolve(&self, trigger: usize, block: &[usize]) -> Option<&[Action]> {
        let mut actions = self.triggers.get(trigger)?.actions.as_slice();
        for pair in block.chunks(2) {
            let [action, branch] = pair else {
                return None;
            };
            actions = actions.get(*action)?.branch(*branch)?;
        }
        Some(actions)
    }

    fn load_plan(&self, instance: Option<&DialogInstance>) -> DialogResult<Vec<PlanFrame>> {
        let Some(raw) = instance.and_then(|frame| frame.state.get(PLAN)) else {
            return Ok(Vec::new());
        };
        let plan: Vec<PlanFrame> = serde_json::from_value(raw.clone())
            .map_err(|e| DialogError::CorruptState(format!("{}: bad plan: {e}", self.id)))?;
        for frame in &plan {
            let Some(block) = self.resolve(frame.trigger, &frame.block) else {
                return Err(DialogError::CorruptState(format!(
                    "{}: plan references missing actions (trigger {}, block {:?})",
                    self.id, frame.trigger, frame.block
                )));
            };
            if frame.next > block.len() {
                return Err(DialogError::CorruptState(format!(
                    "{}: plan cursor {} past the end of {} actions",
                    self.id,
                    frame.next,
                    block.len()
                )));
            }
            if let Some(cursor) = &frame.foreach
                && cursor.index >= cursor.items.len()
            {
                return Err(DialogError::CorruptState(format!(
                    "{}: forEach cursor {} outside {} items",
                    self.id,
                    cursor.index,
                    cursor.items.len()
                )));
            }
        }
        Ok(plan)
    }

    fn save_plan(&self, dc: &mut DialogContext<'_>, plan: &[PlanFrame]) -> DialogResult<()> {
        let value = serde_json::to_value(plan)?;
        dc.active_state_mut()?.insert(PLAN.to_string(), value);
        Ok(())
    }

    /// Memory visible to expressions and templates
    fn memory_scope(&self, dc: &DialogContext<'_>, plan: &[PlanFrame]) -> Value {
        let turn = dc.turn().turn_state();
        let mut scope = Map::new();
        scope.insert("turn".to_string(), Value::Object(turn.clone()));

        let frame = dc.active_dialog();
        let values = frame
            .and_then(|f| f.state.get(VALUES))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let options = frame
            .and_then(|f| f.state.get(OPTIONS))
            .cloned()
            .unwrap_or(Value::Null);
        scope.insert("dialog".to_string(), values);
        scope.insert("options".to_string(), options);

        if let Some(cursor) = plan.iter().rev().find_map(|f| f.foreach.as_ref()) {
            let mut foreach = Map::new();
            foreach.insert("index".to_string(), Value::from(cursor.index));
            foreach.insert(
                "value".to_string(),
                cursor.items.get(cursor.index).cloned().unwrap_or(Value::Null),
            );
            scope.insert("foreach".to_string(), Value::Object(foreach));
        }

        let recognized = turn.get(RECOGNIZED);
        for key in ["intent", "score", "entities"] {
            let value = recognized
                .and_then(|r| r.get(key))
                .cloned()
                .unwrap_or(Value::Null);
            scope.insert(key.to_string(), value);
        }
        let text = recognized
            .and_then(|r| r.get("text"))
            .cloned()
            .or_else(|| dc.turn().activity().text.clone().map(Value::String))
            .unwrap_or(Value::Null);
        scope.insert("text".to_string(), text);

        Value::Object(scope)
    }

    /// Recognize the inbound activity and pick the trigger to run for it
    fn process_activity(&self, dc: &mut DialogContext<'_>) -> DialogResult<Option<usize>> {
        let activity = dc.turn().activity();
        let message = activity.is_message();
        let conversation_update = activity.activity_type == ActivityType::ConversationUpdate;
        let mut intent = None;

        if message {
            let text = activity.text.clone().unwrap_or_default();
            let outcome = match &self.recognizer {
                Some(recognizer) => {
                    let context = RecognizerContext {
                        activity,
                        turn_state: dc.turn().turn_state(),
                    };
                    Some(recognizer.recognize(&text, &context))
                }
                None => None,
            };

            let recognized = match outcome {
                Some(Ok(result)) => result,
                Some(Err(error)) => {
                    let failure = CollaboratorFailure::new(CollaboratorKind::Recognizer, &error);
                    warn!(dialog_id = %self.id, message = %failure.message, "recognizer failed");
                    let turn_state = dc.turn_mut().turn_state_mut();
                    turn_state.insert(TURN_ERROR.to_string(), failure.to_value());
                    turn_state.insert(
                        RECOGNIZED.to_string(),
                        recognized_value(&RecognizerResult::none(text.clone())),
                    );

                    let scope = self.memory_scope(dc, &[]);
                    if let Some(index) = self.select_trigger(&TriggerEvent::RecognizerError, &scope)
                    {
                        return Ok(Some(index));
                    }
                    RecognizerResult::none(text)
                }
                None => RecognizerResult::none(text),
            };

            if !recognized.is_none_intent() {
                intent = Some(recognized.top_intent.clone());
            }
            dc.turn_mut()
                .turn_state_mut()
                .insert(RECOGNIZED.to_string(), recognized_value(&recognized));
        }

        let scope = self.memory_scope(dc, &[]);
        let event = TriggerEvent::Activity {
            message,
            conversation_update,
            intent,
        };
        Ok(self.select_trigger(&event, &scope))
    }

    fn write_property(
        &self,
        dc: &mut DialogContext<'_>,
        property: &PropertyPath,
        value: Value,
    ) -> DialogResult<()> {
        let target = match property.scope {
            PropertyScope::Dialog => object_entry(dc.active_state_mut()?, VALUES),
            PropertyScope::Turn => dc.turn_mut().turn_state_mut(),
        };
        if !set_path(target, &property.path, value) {
            warn!(dialog_id = %self.id, path = %property.path, "property path is blocked by a non-object value");
        }
        Ok(())
    }

    fn delete_property(&self, dc: &mut DialogContext<'_>, property: &PropertyPath) -> DialogResult<()> {
        let target = match property.scope {
            PropertyScope::Dialog => object_entry(dc.active_state_mut()?, VALUES),
            PropertyScope::Turn => dc.turn_mut().turn_state_mut(),
        };
        remove_path(target, &property.path);
        Ok(())
    }

    /// Run pending actions until the plan is empty or an action suspends
    fn run_plan(
        &self,
        dc: &mut DialogContext<'_>,
        mut plan: Vec<PlanFrame>,
    ) -> DialogResult<DialogTurnResult> {
        while let Some(top) = plan.last_mut() {
            let block = self.resolve(top.trigger, &top.block).ok_or_else(|| {
                DialogError::CorruptState(format!("{}: plan references missing actions", self.id))
            })?;

            if top.next >= block.len() {
                if let Some(cursor) = top.foreach.as_mut()
                    && let Some(index) = cursor.index.checked_add(1)
                    && index < cursor.items.len()
                {
                    cursor.index = index;
                    top.next = 0;
                    continue;
                }
                plan.pop();
                continue;
            }

            let index = top.next;
            top.next += 1;
            let action = &block[index];

            dc.turn_mut().consume_step(&self.id)?;
            debug!(dialog_id = %self.id, action = action.kind(), "running action");
            if let Flow::Return(result) = self.execute(dc, action, index, &mut plan)? {
                return Ok(result);
            }
        }

        self.save_plan(dc, &plan)?;
        if self.auto_end_dialog {
            let result = dc
                .active_dialog()
                .and_then(|f| f.state.get(VALUES))
                .and_then(|values| values.get("result"))
                .cloned();
            return dc.end_dialog(result);
        }
        Ok(DialogTurnResult::waiting())
    }

    fn execute(
        &self,
        dc: &mut DialogContext<'_>,
        action: &Action,
        index: usize,
        plan: &mut Vec<PlanFrame>,
    ) -> DialogResult<Flow> {
        match action {
            Action::SendActivity(template) => {
                let scope = self.memory_scope(dc, plan);
                match dc.turn().render_text(template, &scope) {
                    Ok(text) => {
                        dc.turn_mut().send_text(text);
                    }
                    Err(failure) => self.route_failure(dc, failure, plan),
                }
            }
            Action::SetProperty { property, value } => {
                let scope = self.memory_scope(dc, plan);
                match value.evaluate(&scope) {
                    Ok(value) => self.write_property(dc, property, value)?,
                    Err(error) => {
                        warn!(dialog_id = %self.id, path = %property.path, %error, "setProperty skipped");
                    }
                }
            }
            Action::DeleteProperty(property) => self.delete_property(dc, property)?,
            Action::IfCondition {
                condition,
                then,
                otherwise,
            } => {
                let scope = self.memory_scope(dc, plan);
                let branch = if self.condition_holds(condition, &scope) {
                    (!then.is_empty()).then_some(0)
                } else {
                    (!otherwise.is_empty()).then_some(1)
                };
                let child = branch.and_then(|b| plan.last().map(|parent| parent.child(index, b)));
                plan.extend(child);
            }
            Action::ForEach { items, actions } => {
                let scope = self.memory_scope(dc, plan);
                let items = match items.evaluate(&scope) {
                    Ok(Value::Array(items)) => items,
                    Ok(Value::Null) => Vec::new(),
                    Ok(other) => {
                        warn!(dialog_id = %self.id, items = %items, found = %other, "forEach over a non-array");
                        Vec::new()
                    }
                    Err(error) => {
                        warn!(dialog_id = %self.id, %error, "forEach items failed to evaluate");
                        Vec::new()
                    }
                };
                if items.is_empty() || actions.is_empty() {
                    return Ok(Flow::Next);
                }
                if let Some(mut child) = plan.last().map(|parent| parent.child(index, 0)) {
                    child.foreach = Some(ForEachCursor { items, index: 0 });
                    plan.push(child);
                }
            }
            Action::BeginDialog {
                dialog_id,
                options,
                result_property,
            } => {
                let options = match options {
                    Some(expression) => {
                        let scope = self.memory_scope(dc, plan);
                        match expression.evaluate(&scope) {
                            Ok(value) => Some(value),
                            Err(error) => {
                                warn!(dialog_id = %self.id, %error, "child options failed to evaluate");
                                None
                            }
                        }
                    }
                    None => None,
                };
                self.save_plan(dc, plan)?;
                let state = dc.active_state_mut()?;
                match result_property {
                    Some(property) => {
                        let pending = serde_json::to_value(PendingResult::from(property))?;
                        state.insert(PENDING_RESULT.to_string(), pending);
                    }
                    None => {
                        state.remove(PENDING_RESULT);
                    }
                }
                return Ok(Flow::Return(dc.begin_dialog(dialog_id, options)?));
            }
            Action::EndDialog(value) => {
                let scope = self.memory_scope(dc, plan);
                let result = match value {
                    Some(expression) => match expression.evaluate(&scope) {
                        Ok(value) => Some(value),
                        Err(error) => {
                            warn!(dialog_id = %self.id, %error, "end result failed to evaluate");
                            None
                        }
                    },
                    None => scope.get("dialog").and_then(|d| d.get("result")).cloned(),
                };
                plan.clear();
                self.save_plan(dc, plan)?;
                return Ok(Flow::Return(dc.end_dialog(result)?));
            }
            Action::CancelAllDialogs => {
                plan.clear();
                self.save_plan(dc, plan)?;
                return Ok(Flow::Return(dc.cancel_all_dialogs()?));
            }
            Action::RepeatDialog => {
                let options = dc
                    .active_dialog()
                    .and_then(|f| f.state.get(OPTIONS))
                    .cloned()
                    .filter(|v| !v.is_null());
                plan.clear();
                return Ok(Flow::Return(dc.replace_dialog(&self.id, options)?));
            }
            Action::EndTurn => {
                self.save_plan(dc, plan)?;
                return Ok(Flow::Return(DialogTurnResult::waiting()));
            }
        }
        Ok(Flow::Next)
    }

    /// Store a collaborator failure in turn memory and hand control to an
    /// `OnError` trigger, replacing the remaining plan
    fn route_failure(
        &self,
        dc: &mut DialogContext<'_>,
        failure: CollaboratorFailure,
        plan: &mut Vec<PlanFrame>,
    ) {
        dc.turn_mut()
            .turn_state_mut()
            .insert(TURN_ERROR.to_string(), failure.to_value());

        let handling_error = plan.iter().any(|frame| {
            self.triggers
                .get(frame.trigger)
                .is_some_and(|t| t.kind == TriggerKind::Error)
        });
        let handler = if handling_error {
            None
        } else {
            let scope = self.memory_scope(dc, plan);
            self.select_trigger(&TriggerEvent::Error, &scope)
        };

        match handler {
            Some(trigger) => {
                plan.clear();
                plan.push(PlanFrame::root(trigger));
            }
            None => {
                warn!(dialog_id = %self.id, message = %failure.message, "sendActivity skipped");
            }
        }
    }
}

/// Where a child's result goes once it ends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct PendingResult {
    scope: String,
    path: String,
}

impl From<&PropertyPath> for PendingResult {
    fn from(property: &PropertyPath) -> Self {
        let scope = match property.scope {
            PropertyScope::Dialog => "dialog",
            PropertyScope::Turn => "turn",
        };
        Self {
            scope: scope.to_string(),
            path: property.path.clone(),
        }
    }
}

impl PendingResult {
    fn property(&self) -> DialogResult<PropertyPath> {
        PropertyPath::parse(&format!("{}.{}", self.scope, self.path))
    }
}

/// Shape of `turn.recognized`
fn recognized_value(result: &RecognizerResult) -> Value {
    let mut entities = Map::new();
    for entity in &result.entities {
        let slot = entities
            .entry(entity.entity_type.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = slot {
            values.push(entity.value.clone());
        }
    }
    let intent = if result.is_none_intent() {
        Value::String(RecognizerResult::NONE_INTENT.to_string())
    } else {
        Value::String(result.top_intent.clone())
    };

    let mut recognized = Map::new();
    recognized.insert("text".to_string(), Value::String(result.text.clone()));
    recognized.insert("intent".to_string(), intent);
    recognized.insert("score".to_string(), Value::from(result.score));
    recognized.insert("entities".to_string(), Value::Object(entities));
    Value::Object(recognized)
}

impl Dialog for AdaptiveDialog {
    fn id(&self) -> &str {
        &self.id
    }

    fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        {
            let state = dc.active_state_mut()?;
            state.insert(OPTIONS.to_string(), options.unwrap_or(Value::Null));
            state.insert(VALUES.to_string(), Value::Object(Map::new()));
        }

        let scope = self.memory_scope(dc, &[]);
        let trigger = match self.select_trigger(&TriggerEvent::Begin, &scope) {
            Some(index) => Some(index),
            None => self.process_activity(dc)?,
        };
        self.run_plan(dc, trigger.map(PlanFrame::root).into_iter().collect())
    }

    /// A trigger fired by the new event runs ahead of any actions still
    /// pending from an earlier `EndTurn`.
    fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> DialogResult<DialogTurnResult> {
        let mut plan = self.load_plan(dc.active_dialog())?;
        if let Some(index) = self.process_activity(dc)? {
            plan.push(PlanFrame::root(index));
        }
        self.run_plan(dc, plan)
    }

    fn resume_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        _reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let pending = dc.active_state_mut()?.remove(PENDING_RESULT);
        if let Some(pending) = pending {
            let pending: PendingResult = serde_json::from_value(pending)
                .map_err(|e| DialogError::CorruptState(format!("{}: bad pending result: {e}", self.id)))?;
            let property = pending.property()?;
            self.write_property(dc, &property, result.unwrap_or(Value::Null))?;
        }
        let plan = self.load_plan(dc.active_dialog())?;
        self.run_plan(dc, plan)
    }

    fn validate_instance(&self, instance: &DialogInstance) -> DialogResult<()> {
        self.load_plan(Some(instance)).map(|_| ())
    }
}

impl std::fmt::Debug for AdaptiveDialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveDialog")
            .field("id", &self.id)
            .field("triggers", &self.triggers.len())
            .field("has_recognizer", &self.recognizer.is_some())
            .field("auto_end_dialog", &self.auto_end_dialog)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogs::DialogSet;
    use crate::turn::TurnContext;
    use crate::value_objects::{Activity, ChannelAccount, DialogTurnStatus};
    use serde_json::json;

    fn user() -> ChannelAccount {
        ChannelAccount::new("user", "User")
    }

    fn run(dialogs: &DialogSet, stack: &mut Vec<DialogInstance>, text: &str) -> (DialogTurnResult, Vec<String>) {
        let mut turn = TurnContext::new(Activity::message("conv", user(), text).with_id("m"));
        let result = {
            let mut dc = DialogContext::new(dialogs, stack, &mut turn);
            if dc.depth() == 0 {
                dc.begin_dialog("root", None).unwrap()
            } else {
                dc.continue_dialog().unwrap()
            }
        };
        let texts = turn
            .take_outbound()
            .into_iter()
            .filter_map(|a| a.text)
            .collect();
        (result, texts)
    }

    #[test]
    fn test_plan_survives_end_turn() {
        let root = AdaptiveDialog::new("root")
            .trigger(Trigger::on_begin_dialog().actions([
                Action::send("one"),
                Action::EndTurn,
                Action::set_property("dialog.answer", "turn.activity.text").unwrap(),
                Action::send("two"),
            ]))
            .trigger(
                Trigger::on_condition("text == 'help'")
                    .unwrap()
                    .action(Action::send("help text")),
            );
        let mut dialogs = DialogSet::new();
        dialogs.add(root).unwrap();
        let mut stack = Vec::new();

        let (result, texts) = run(&dialogs, &mut stack, "hi");
        assert_eq!(result.status, DialogTurnStatus::Waiting);
        assert_eq!(texts, vec!["one"]);

        // the interruption runs first, then the paused sequence finishes
        let (result, texts) = run(&dialogs, &mut stack, "help");
        assert_eq!(result.status, DialogTurnStatus::Waiting);
        assert_eq!(texts, vec!["help text", "two"]);
        assert_eq!(stack[0].state["values"]["answer"], json!("help"));
        assert_eq!(stack[0].state["plan"], json!([]));
    }

    #[test]
    fn test_if_condition_branches() {
        let root = AdaptiveDialog::new("root").trigger(Trigger::on_message().action(
            Action::if_condition(
                "text == 'left'",
                vec![Action::send("went left")],
                vec![Action::send("went right")],
            )
            .unwrap(),
        ));
        let mut dialogs = DialogSet::new();
        dialogs.add(root).unwrap();

        let mut stack = Vec::new();
        assert_eq!(run(&dialogs, &mut stack, "left").1, vec!["went left"]);
        assert_eq!(run(&dialogs, &mut stack, "up").1, vec!["went right"]);
    }

    #[test]
    fn test_auto_end_returns_dialog_result() {
        let root = AdaptiveDialog::new("root")
            .with_auto_end_dialog(true)
            .trigger(
                Trigger::on_begin_dialog()
                    .action(Action::set_property("dialog.result", "42").unwrap()),
            );
        let mut dialogs = DialogSet::new();
        dialogs.add(root).unwrap();
        let mut stack = Vec::new();

        let (result, _) = run(&dialogs, &mut stack, "hi");
        assert_eq!(result, DialogTurnResult::complete(Some(json!(42))));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_corrupt_plan_is_rejected() {
        let root = AdaptiveDialog::new("root").trigger(Trigger::on_message());
        let mut frame = DialogInstance::new("root");
        frame
            .state
            .insert("plan".to_string(), json!([{"trigger": 3, "next": 0}]));
        assert!(root.validate_instance(&frame).unwrap_err().is_corrupt_state());
    }

    #[test]
    fn test_out_of_range_cursors_are_rejected() {
        let root = AdaptiveDialog::new("root").trigger(Trigger::on_message().action(
            Action::for_each("turn.items", vec![Action::send("item")]).unwrap(),
        ));
        let plan_with = |plan: Value| {
            let mut frame = DialogInstance::new("root");
            frame.state.insert("plan".to_string(), plan);
            frame
        };

        let ok = plan_with(json!([
            {"trigger": 0, "next": 1},
            {"trigger": 0, "block": [0, 0], "next": 0, "foreach": {"items": [1, 2], "index": 1}}
        ]));
        assert!(root.validate_instance(&ok).is_ok());

        for bad in [
            json!([{"trigger": 0, "next": 2}]),
            json!([{"trigger": 0, "block": [0, 0], "next": 5,
                    "foreach": {"items": [], "index": u64::MAX}}]),
            json!([{"trigger": 0, "block": [0, 0], "next": 0,
                    "foreach": {"items": [1], "index": 1}}]),
        ] {
            let err = root.validate_instance(&plan_with(bad)).unwrap_err();
            assert!(err.is_corrupt_state());
        }
    }
}
