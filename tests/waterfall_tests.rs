//! Waterfall sequencing through the turn host

use cim_dialog_engine::{
    Activity, ChannelAccount, DialogError, DialogSet, DialogTurnStatus, HostConfig, Prompt,
    PromptOptions, TurnHost, TurnOutput, WaterfallDialog,
};
use serde_json::{Value, json};

fn message(text: &str, id: &str) -> Activity {
    Activity::message("conv-1", ChannelAccount::new("user-1", "Traveller"), text)
        .with_id(id)
        .with_recipient(ChannelAccount::new("travel-bot", "Travel Bot"))
}

fn texts(output: &TurnOutput) -> Vec<&str> {
    output
        .outbound_events
        .iter()
        .filter_map(|a| a.text.as_deref())
        .collect()
}

fn booking_dialogs() -> DialogSet {
    let book = WaterfallDialog::new("book")
        .step(|step| {
            step.prompt(
                "text",
                PromptOptions::text("Where would you like to travel to?"),
            )
        })
        .step(|step| {
            let destination = step.result().cloned().unwrap_or(Value::Null);
            step.values_mut()?
                .insert("destination".to_string(), destination);
            step.prompt("text", PromptOptions::text("Where are you travelling from?"))
        })
        .step(|step| {
            let origin = step.result().cloned().unwrap_or(Value::Null);
            step.values_mut()?.insert("origin".to_string(), origin);
            let summary = format!(
                "Booking a trip from {} to {}.",
                step.value("origin").and_then(Value::as_str).unwrap_or("?"),
                step.value("destination").and_then(Value::as_str).unwrap_or("?"),
            );
            step.send_text(summary);
            let values = step.values_snapshot();
            step.end_dialog(Some(values))
        });

    let mut dialogs = DialogSet::new();
    dialogs.add(book).unwrap();
    dialogs.add(Prompt::text("text")).unwrap();
    dialogs
}

#[test]
fn test_three_step_booking() {
    let host = TurnHost::new(booking_dialogs(), "book").unwrap();

    let first = host.run(&message("hi", "m1"), &Value::Null).unwrap();
    assert_eq!(first.status, DialogTurnStatus::Waiting);
    assert_eq!(texts(&first), vec!["Where would you like to travel to?"]);

    let second = host.run(&message("Paris", "m2"), &first.new_state).unwrap();
    assert_eq!(second.status, DialogTurnStatus::Waiting);
    assert_eq!(texts(&second), vec!["Where are you travelling from?"]);
    assert_eq!(
        second.new_state["dialogStack"][0]["state"]["values"],
        json!({"destination": "Paris"})
    );

    let third = host.run(&message("London", "m3"), &second.new_state).unwrap();
    assert_eq!(third.status, DialogTurnStatus::Complete);
    assert_eq!(
        third.result,
        Some(json!({"destination": "Paris", "origin": "London"}))
    );
    assert_eq!(texts(&third), vec!["Booking a trip from London to Paris."]);
    assert_eq!(third.new_state, json!({"dialogStack": []}));

    let total = first.outbound_events.len() + second.outbound_events.len() + third.outbound_events.len();
    assert_eq!(total, 3);
}

#[test]
fn test_replies_are_addressed_to_sender() {
    let host = TurnHost::new(booking_dialogs(), "book").unwrap();
    let output = host.run(&message("hi", "m1"), &Value::Null).unwrap();

    let reply = &output.outbound_events[0];
    assert_eq!(reply.from.id, "travel-bot");
    assert_eq!(reply.recipient.as_ref().map(|r| r.id.as_str()), Some("user-1"));
    assert_eq!(reply.reply_to_id.as_deref(), Some("m1"));
    assert!(reply.id.is_some());
}

#[test]
fn test_chained_steps_run_in_one_turn() {
    let chain = WaterfallDialog::new("chain")
        .step(|step| step.next(Some(json!(1))))
        .step(|step| {
            let previous = step.result().and_then(Value::as_i64).unwrap_or(0);
            step.next(Some(json!(previous + 1)))
        })
        .step(|step| {
            let previous = step.result().and_then(Value::as_i64).unwrap_or(0);
            step.next(Some(json!(previous * 10)))
        });
    let mut dialogs = DialogSet::new();
    dialogs.add(chain).unwrap();
    let host = TurnHost::new(dialogs, "chain").unwrap();

    let output = host.run(&message("go", "m1"), &Value::Null).unwrap();

    // running past the last step ends with the last result
    assert_eq!(output.status, DialogTurnStatus::Complete);
    assert_eq!(output.result, Some(json!(20)));
    assert!(output.outbound_events.is_empty());
}

#[test]
fn test_waiting_step_receives_next_message() {
    let ask = WaterfallDialog::new("ask")
        .step(|step| {
            step.send_text("What is your name?");
            Ok(cim_dialog_engine::DialogTurnResult::waiting())
        })
        .step(|step| {
            let name = step.result_str().unwrap_or_default().to_uppercase();
            step.end_dialog(Some(json!(name)))
        });
    let mut dialogs = DialogSet::new();
    dialogs.add(ask).unwrap();
    let host = TurnHost::new(dialogs, "ask").unwrap();

    let first = host.run(&message("hello", "m1"), &Value::Null).unwrap();
    assert_eq!(first.new_state["dialogStack"][0]["state"]["stepIndex"], json!(0));

    let second = host.run(&message("ada", "m2"), &first.new_state).unwrap();
    assert_eq!(second.result, Some(json!("ADA")));
}

#[test]
fn test_non_message_activity_keeps_waiting() {
    let host = TurnHost::new(booking_dialogs(), "book").unwrap();
    let first = host.run(&message("hi", "m1"), &Value::Null).unwrap();

    let typing = Activity::new(
        cim_dialog_engine::ActivityType::Typing,
        "conv-1",
        ChannelAccount::new("user-1", "Traveller"),
    );
    let output = host.run(&typing, &first.new_state).unwrap();

    assert_eq!(output.status, DialogTurnStatus::Waiting);
    assert!(output.outbound_events.is_empty());
    assert_eq!(output.new_state, first.new_state);
}

#[test]
fn test_endless_chain_hits_step_limit() {
    let mut spin = WaterfallDialog::new("spin");
    for _ in 0..10 {
        spin = spin.step(|step| step.next(None));
    }
    let mut dialogs = DialogSet::new();
    dialogs.add(spin).unwrap();
    let config = HostConfig {
        max_chained_steps: 4,
        ..HostConfig::default()
    };
    let host = TurnHost::new(dialogs, "spin").unwrap().with_config(config);

    let err = host.run(&message("go", "m1"), &Value::Null).unwrap_err();
    assert!(matches!(
        err,
        DialogError::StepLimitExceeded { ref dialog_id, limit: 4 } if dialog_id == "spin"
    ));
}

#[test]
fn test_values_survive_turn_boundary() {
    let host = TurnHost::new(booking_dialogs(), "book").unwrap();
    let first = host.run(&message("hi", "m1"), &Value::Null).unwrap();
    let second = host.run(&message("Rome", "m2"), &first.new_state).unwrap();

    // the persisted state is plain JSON; round-trip it through a string
    let stored = serde_json::to_string(&second.new_state).unwrap();
    let reloaded: Value = serde_json::from_str(&stored).unwrap();
    let third = host.run(&message("Oslo", "m3"), &reloaded).unwrap();

    assert_eq!(
        third.result,
        Some(json!({"destination": "Rome", "origin": "Oslo"}))
    );
}
