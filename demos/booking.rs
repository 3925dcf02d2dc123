//! Travel booking demo
//!
//! This demonstrates:
//! - An adaptive root dialog routing intents with a regex recognizer
//! - A waterfall child collecting booking details through prompts
//! - Template rendering of replies
//! - Persisting state between turns through the scale-out runner

use std::sync::Arc;

use cim_dialog_engine::{
    Action, Activity, AdaptiveDialog, ChannelAccount, DialogSet, MemoryStore, Prompt,
    PromptOptions, RegexRecognizer, ScaleoutRunner, TemplateGenerator, Trigger, TurnHost,
    WaterfallDialog,
};
use serde_json::Value;

fn booking_dialogs() -> anyhow::Result<DialogSet> {
    let recognizer = RegexRecognizer::new()
        .intent("Book", r"(?i)\b(book|flight|trip)\b")?
        .intent("Help", r"(?i)\bhelp\b")?
        .intent("Cancel", r"(?i)\b(cancel|stop)\b")?;

    let root = AdaptiveDialog::new("root")
        .with_recognizer(recognizer)
        .trigger(Trigger::on_conversation_update().action(Action::for_each(
            "turn.activity.membersAdded",
            vec![Action::if_condition(
                "foreach.value.id != turn.activity.recipient.id",
                vec![Action::send("${Welcome}")],
                vec![],
            )?],
        )?))
        .trigger(Trigger::on_intent("Help").action(Action::send(
            "I can book flights. Say 'book a trip' to start or 'cancel' to stop.",
        )))
        .trigger(
            Trigger::on_intent("Cancel")
                .with_priority(10)
                .actions([Action::send("Okay, cancelled."), Action::CancelAllDialogs]),
        )
        .trigger(Trigger::on_intent("Book").actions([
            Action::begin_dialog("book").with_result_property("dialog.booking")?,
            Action::if_condition(
                "exists(dialog.booking)",
                vec![Action::send("${Booked}")],
                vec![Action::send("No booking made.")],
            )?,
        ]))
        .trigger(Trigger::on_unknown_intent().action(Action::send("Sorry, I didn't get that.")));

    let book = WaterfallDialog::new("book")
        .step(|step| step.prompt("text", PromptOptions::text("Where would you like to go?")))
        .step(|step| {
            let destination = step.result().cloned().unwrap_or(Value::Null);
            step.values_mut()?.insert("destination".to_string(), destination);
            step.prompt(
                "date",
                PromptOptions::text("When do you want to leave?")
                    .with_retry("Please give a date like 2026-11-02."),
            )
        })
        .step(|step| {
            let date = step.result().cloned().unwrap_or(Value::Null);
            step.values_mut()?.insert("date".to_string(), date);
            step.prompt(
                "confirm",
                PromptOptions::text("Shall I book it?").with_retry("Yes or no?"),
            )
        })
        .step(|step| {
            let confirmed = step.result().and_then(Value::as_bool).unwrap_or(false);
            let booking = confirmed.then(|| step.values_snapshot());
            step.end_dialog(booking)
        });

    let mut dialogs = DialogSet::new();
    dialogs.add(root)?;
    dialogs.add(book)?;
    dialogs.add(Prompt::text("text"))?;
    dialogs.add(Prompt::date_time("date"))?;
    dialogs.add(Prompt::confirm("confirm"))?;
    Ok(dialogs)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Dialog Engine Booking Demo ===\n");

    let generator = TemplateGenerator::new()
        .template("Welcome", "Welcome, {foreach.value.name}! Ask me for help any time.")
        .template(
            "Booked",
            "Booked a trip to {dialog.booking.destination} on {dialog.booking.date}.",
        );
    let host = TurnHost::new(booking_dialogs()?, "root")?.with_generator(generator);
    let store = MemoryStore::new();
    let runner = ScaleoutRunner::new(host, Arc::new(store.clone()));

    let user = ChannelAccount::new("user-1", "Alice");
    let bot = ChannelAccount::new("travel-bot", "Travel Bot");

    let join = Activity::conversation_update("demo", user.clone(), vec![user.clone()])
        .with_id("a0")
        .with_recipient(bot.clone());
    let script = ["help", "book a trip", "Lisbon", "next tuesday", "2026-11-02", "yes"];

    let mut inbound = vec![join];
    for (i, text) in script.iter().enumerate() {
        inbound.push(
            Activity::message("demo", user.clone(), *text)
                .with_id(format!("a{}", i + 1))
                .with_recipient(bot.clone()),
        );
    }

    for activity in &inbound {
        if let Some(text) = &activity.text {
            println!("User: {text}");
        }
        let output = runner.process(activity).await?;
        for reply in &output.outbound_events {
            if let Some(text) = &reply.text {
                println!("Bot:  {text}");
            }
        }
        println!("      [{:?}]\n", output.status);
    }

    println!("Stored conversations: {}", store.len().await);
    Ok(())
}
