//! Dialog stack and context operations
//!
//! These tests drive `DialogContext` directly with a recording dialog so the
//! order of lifecycle calls can be checked:
//! - begin/replace with unknown ids
//! - end resuming the parent
//! - cancellation sweeps and their hooks
//! - cancellation reaching into a component's nested stack

use cim_dialog_engine::{
    Activity, ChannelAccount, ComponentDialog, Dialog, DialogContext, DialogError,
    DialogInstance, DialogReason, DialogResult, DialogSet, DialogTurnResult, DialogTurnStatus,
    Prompt, TurnContext,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

/// Waits on begin, ends with the message text on continue, logs everything
struct Recorder {
    id: String,
    log: Log,
    fail_hook: bool,
    child: Option<String>,
}

impl Recorder {
    fn new(id: &str, log: &Log) -> Self {
        Self {
            id: id.to_string(),
            log: Arc::clone(log),
            fail_hook: false,
            child: None,
        }
    }

    /// Begin `child` on top of this frame as part of beginning
    fn with_child(mut self, child: &str) -> Self {
        self.child = Some(child.to_string());
        self
    }

    fn failing(mut self) -> Self {
        self.fail_hook = true;
        self
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl Dialog for Recorder {
    fn id(&self) -> &str {
        &self.id
    }

    fn begin_dialog(
        &self,
        dc: &mut DialogContext<'_>,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.record(format!("{}:begin", self.id));
        if let Some(options) = options {
            dc.active_state_mut()?.insert("options".to_string(), options);
        }
        if let Some(child) = &self.child {
            return dc.begin_dialog(child, None);
        }
        Ok(DialogTurnResult::waiting())
    }

    fn continue_dialog(&self, dc: &mut DialogContext<'_>) -> DialogResult<DialogTurnResult> {
        let text = dc.turn().activity().text.clone();
        dc.end_dialog(text.map(Value::String))
    }

    fn resume_dialog(
        &self,
        _dc: &mut DialogContext<'_>,
        reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.record(format!(
            "{}:resume:{reason:?}:{}",
            self.id,
            result.unwrap_or(Value::Null)
        ));
        Ok(DialogTurnResult::waiting())
    }

    fn end_dialog(
        &self,
        _turn: &mut TurnContext,
        _instance: &mut DialogInstance,
        reason: DialogReason,
    ) -> DialogResult<()> {
        self.record(format!("{}:{reason:?}", self.id));
        if self.fail_hook {
            return Err(DialogError::Store("cleanup failed".to_string()));
        }
        Ok(())
    }
}

fn dialog_set(log: &Log, ids: &[&str]) -> DialogSet {
    let mut dialogs = DialogSet::new();
    for id in ids {
        dialogs.add(Recorder::new(id, log)).unwrap();
    }
    dialogs
}

fn turn(text: &str) -> TurnContext {
    TurnContext::new(Activity::message("conv-1", ChannelAccount::new("user", "User"), text))
}

fn ids(stack: &[DialogInstance]) -> Vec<&str> {
    stack.iter().map(|f| f.dialog_id.as_str()).collect()
}

#[test]
fn test_continue_on_empty_stack_reports_empty() {
    let log = Log::default();
    let dialogs = dialog_set(&log, &["a"]);
    let mut stack = Vec::new();
    let mut turn = turn("hi");

    let mut dc = DialogContext::new(&dialogs, &mut stack, &mut turn);
    let result = dc.continue_dialog().unwrap();

    assert_eq!(result.status, DialogTurnStatus::Empty);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_unknown_dialog_leaves_stack_unmodified() {
    let log = Log::default();
    let dialogs = dialog_set(&log, &["a"]);
    let mut stack = Vec::new();
    let mut turn = turn("hi");
    let mut dc = DialogContext::new(&dialogs, &mut stack, &mut turn);

    dc.begin_dialog("a", Some(json!({"k": 1}))).unwrap();
    let err = dc.begin_dialog("missing", None).unwrap_err();
    assert!(matches!(err, DialogError::UnknownDialog(ref id) if id == "missing"));
    assert_eq!(dc.depth(), 1);

    let err = dc.replace_dialog("missing", None).unwrap_err();
    assert!(matches!(err, DialogError::UnknownDialog(_)));
    assert_eq!(dc.depth(), 1);
    assert_eq!(dc.active_dialog().unwrap().state["options"], json!({"k": 1}));

    // the failed replace must not have run any end hook
    assert_eq!(*log.lock().unwrap(), vec!["a:begin"]);
}

#[test]
fn test_end_resumes_parent_with_result() {
    let log = Log::default();
    let dialogs = dialog_set(&log, &["outer", "inner"]);
    let mut stack = Vec::new();

    {
        let mut turn = turn("start");
        let mut dc = DialogContext::new(&dialogs, &mut stack, &mut turn);
        dc.begin_dialog("outer", None).unwrap();
        dc.begin_dialog("inner", None).unwrap();
    }
    assert_eq!(ids(&stack), vec!["outer", "inner"]);

    let mut turn = turn("done");
    let result = DialogContext::new(&dialogs, &mut stack, &mut turn)
        .continue_dialog()
        .unwrap();

    assert_eq!(result.status, DialogTurnStatus::Waiting);
    assert_eq!(ids(&stack), vec!["outer"]);
    assert_eq!(stack[0].result, Some(json!("done")));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "outer:begin",
            "inner:begin",
            "inner:EndCalled",
            "outer:resume:EndCalled:\"done\"",
        ]
    );
}

#[test]
fn test_end_of_root_completes() {
    let log = Log::default();
    let dialogs = dialog_set(&log, &["root"]);
    let mut stack = Vec::new();
    let mut turn = turn("bye");
    let mut dc = DialogContext::new(&dialogs, &mut stack, &mut turn);

    dc.begin_dialog("root", None).unwrap();
    let result = dc.continue_dialog().unwrap();

    assert_eq!(result, DialogTurnResult::complete(Some(json!("bye"))));
    assert_eq!(dc.depth(), 0);
}

#[test]
fn test_replace_swaps_active_frame() {
    let log = Log::default();
    let dialogs = dialog_set(&log, &["outer", "inner", "other"]);
    let mut stack = Vec::new();
    let mut turn = turn("hi");
    let mut dc = DialogContext::new(&dialogs, &mut stack, &mut turn);

    dc.begin_dialog("outer", None).unwrap();
    dc.begin_dialog("inner", None).unwrap();
    let result = dc.replace_dialog("other", Some(json!(7))).unwrap();

    assert!(result.is_waiting());
    assert_eq!(ids(dc.stack()), vec!["outer", "other"]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["outer:begin", "inner:begin", "inner:ReplaceCalled", "other:begin"]
    );
}

#[test]
fn test_cancel_all_sweeps_top_to_bottom() {
    let log = Log::default();
    let mut dialogs = DialogSet::new();
    dialogs.add(Recorder::new("outer", &log)).unwrap();
    // the inner hook fails; the sweep must still reach the outer frame
    dialogs.add(Recorder::new("inner", &log).failing()).unwrap();

    let mut stack = Vec::new();
    let mut turn = turn("hi");
    let mut dc = DialogContext::new(&dialogs, &mut stack, &mut turn);
    dc.begin_dialog("outer", None).unwrap();
    dc.begin_dialog("inner", None).unwrap();
    log.lock().unwrap().clear();

    let result = dc.cancel_all_dialogs().unwrap();

    assert_eq!(result.status, DialogTurnStatus::Cancelled);
    assert_eq!(dc.depth(), 0);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["inner:CancelCalled", "outer:CancelCalled"]
    );

    // nothing left to cancel
    assert_eq!(
        dc.cancel_all_dialogs().unwrap().status,
        DialogTurnStatus::Empty
    );
}

#[test]
fn test_cancel_until_keeps_target() {
    let log = Log::default();
    let dialogs = dialog_set(&log, &["a", "b", "c"]);
    let mut stack = Vec::new();
    let mut turn = turn("hi");
    let mut dc = DialogContext::new(&dialogs, &mut stack, &mut turn);
    for id in ["a", "b", "c"] {
        dc.begin_dialog(id, None).unwrap();
    }
    log.lock().unwrap().clear();

    let err = dc.cancel_until("zzz").unwrap_err();
    assert!(matches!(err, DialogError::NotOnStack(_)));
    assert_eq!(dc.depth(), 3);

    let result = dc.cancel_until("a").unwrap();
    assert_eq!(result.status, DialogTurnStatus::Cancelled);
    assert_eq!(ids(dc.stack()), vec!["a"]);
    assert_eq!(*log.lock().unwrap(), vec!["c:CancelCalled", "b:CancelCalled"]);
}

#[test]
fn test_duplicate_registration_fails() {
    let log = Log::default();
    let mut dialogs = dialog_set(&log, &["a"]);
    let err = dialogs.add(Recorder::new("a", &log)).unwrap_err();
    assert!(matches!(err, DialogError::DuplicateDialog(_)));
    assert_eq!(dialogs.ids(), vec!["a"]);
}

/// Outer `root` and `other` recorders plus a `wrap` component whose nested
/// `first` recorder begins `second` on top of itself
fn component_set(log: &Log) -> DialogSet {
    let wrap = ComponentDialog::new("wrap")
        .add_dialog(Recorder::new("first", log).with_child("second"))
        .and_then(|c| c.add_dialog(Recorder::new("second", log)))
        .unwrap();
    let mut dialogs = dialog_set(log, &["root", "other"]);
    dialogs.add(wrap).unwrap();
    dialogs
}

fn nested_ids(frame: &DialogInstance) -> Vec<&str> {
    frame.state["dialogs"]["dialogStack"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["dialogId"].as_str())
        .collect()
}

#[test]
fn test_cancel_all_reaches_nested_component_frames() {
    let log = Log::default();
    let dialogs = component_set(&log);
    let mut stack = Vec::new();
    let mut turn = turn("hi");
    let mut dc = DialogContext::new(&dialogs, &mut stack, &mut turn);

    dc.begin_dialog("root", None).unwrap();
    assert!(dc.begin_dialog("wrap", None).unwrap().is_waiting());
    assert_eq!(ids(dc.stack()), vec!["root", "wrap"]);
    assert_eq!(nested_ids(&dc.stack()[1]), vec!["first", "second"]);
    log.lock().unwrap().clear();

    let result = dc.cancel_all_dialogs().unwrap();

    assert_eq!(result.status, DialogTurnStatus::Cancelled);
    assert_eq!(dc.depth(), 0);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["second:CancelCalled", "first:CancelCalled", "root:CancelCalled"]
    );
}

#[test]
fn test_replacing_component_cancels_nested_frames() {
    let log = Log::default();
    let dialogs = component_set(&log);
    let mut stack = Vec::new();
    let mut turn = turn("hi");
    let mut dc = DialogContext::new(&dialogs, &mut stack, &mut turn);

    dc.begin_dialog("root", None).unwrap();
    dc.begin_dialog("wrap", None).unwrap();
    log.lock().unwrap().clear();

    let result = dc.replace_dialog("other", None).unwrap();

    assert!(result.is_waiting());
    assert_eq!(ids(dc.stack()), vec!["root", "other"]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["second:CancelCalled", "first:CancelCalled", "other:begin"]
    );
}

#[test]
fn test_component_resumed_from_above_reprompts() {
    let log = Log::default();
    let ask = ComponentDialog::new("ask")
        .add_dialog(Prompt::text("name"))
        .unwrap();
    let mut dialogs = dialog_set(&log, &["interrupt"]);
    dialogs.add(ask).unwrap();
    let mut stack = Vec::new();

    let mut first = turn("hi");
    {
        let mut dc = DialogContext::new(&dialogs, &mut stack, &mut first);
        dc.begin_dialog("ask", Some(json!({"prompt": "What's your name?"})))
            .unwrap();
        dc.begin_dialog("interrupt", None).unwrap();
    }
    assert_eq!(first.outbound().len(), 1);
    assert_eq!(ids(&stack), vec!["ask", "interrupt"]);

    // the interruption ends; the nested prompt is shown again
    let mut second = turn("ok");
    let result = DialogContext::new(&dialogs, &mut stack, &mut second)
        .continue_dialog()
        .unwrap();
    assert!(result.is_waiting());
    let texts: Vec<_> = second
        .outbound()
        .iter()
        .filter_map(|a| a.text.as_deref())
        .collect();
    assert_eq!(texts, vec!["What's your name?"]);
    assert_eq!(ids(&stack), vec!["ask"]);
    assert_eq!(nested_ids(&stack[0]), vec!["name"]);
    assert_eq!(*log.lock().unwrap(), vec!["interrupt:begin", "interrupt:EndCalled"]);

    // and still answers
    let mut third = turn("Ada");
    let result = DialogContext::new(&dialogs, &mut stack, &mut third)
        .continue_dialog()
        .unwrap();
    assert_eq!(result.status, DialogTurnStatus::Complete);
    assert_eq!(result.result, Some(json!("Ada")));
    assert!(stack.is_empty());
}
