//! Interactive chat loop and one-shot questions

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use chatline_core::{ChatSession, PendingReply, ReplyOutcome, StreamingClient};

use crate::render::{self, TerminalObserver};

const HELP: &str = "\
Commands:
  /new            start a new conversation
  /models         list installed models
  /model NAME     switch model
  /history        show this conversation
  /help           this text
  /quit           leave (also Ctrl-D)
Ctrl-C while an answer streams stops it and keeps what arrived.";

/// Wait for a reply, turning Ctrl-C into a stop
async fn await_reply(chat: &ChatSession, reply: PendingReply) -> Result<ReplyOutcome> {
    let saved = reply.wait();
    tokio::pin!(saved);
    loop {
        tokio::select! {
            outcome = &mut saved => return Ok(outcome?),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                chat.stop();
            }
        }
    }
}

/// Stream one answer to stdout; `false` if it failed
pub async fn ask(chat: &ChatSession, prompt: &str) -> Result<bool> {
    let reply = chat.send(prompt, TerminalObserver).await?;
    let outcome = await_reply(chat, reply).await?;
    Ok(render::outcome(&outcome, chat.client().base_url()))
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

pub async fn run(client: &StreamingClient, chat: &ChatSession) -> Result<()> {
    println!(
        "chatline {} - {} at {}",
        env!("CARGO_PKG_VERSION"),
        chat.model(),
        client.base_url()
    );
    println!("Type /help for commands.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();

        match input.split_once(' ').map_or((input, ""), |(c, rest)| (c, rest.trim())) {
            ("", _) => {}
            ("/quit" | "/exit", _) => break,
            ("/help", _) => println!("{HELP}"),
            ("/new", _) => {
                chat.new_conversation();
                println!("Started a new conversation.");
            }
            ("/models", _) => match client.list_model_info().await {
                Ok(models) => render::models(&models, Some(&chat.model())),
                Err(e) => eprintln!("error: {e}"),
            },
            ("/model", "") => println!("Current model: {}", chat.model()),
            ("/model", name) => {
                chat.set_model(name);
                println!("Switched to {name}.");
            }
            ("/history", _) => render::messages(&chat.history().await?),
            (command, _) if command.starts_with('/') => {
                println!("Unknown command {command}. Type /help for commands.");
            }
            _ => {
                let reply = chat.send(input, TerminalObserver).await?;
                let outcome = await_reply(chat, reply).await?;
                render::outcome(&outcome, client.base_url());
            }
        }
    }

    client.shutdown();
    tracing::info!(gate = ?client.gate_stats(), "Chat ended");
    Ok(())
}
