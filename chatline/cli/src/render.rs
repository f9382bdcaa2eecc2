//! Terminal output

use std::io::Write;

use chatline_core::backend::ModelInfo;
use chatline_core::store::Role;
use chatline_core::{
    Completion, CompletionReason, Conversation, GenerationObserver, Message, ReplyOutcome,
    StreamError,
};

/// Prints answer text as it streams
///
/// Terminal results are rendered from the [`ReplyOutcome`] instead, once the
/// reply has been saved.
pub struct TerminalObserver;

impl GenerationObserver for TerminalObserver {
    fn on_tokens(&mut self, batch: &str) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout (e.g. `| head`) is not worth failing the session for
        let _ = stdout.write_all(batch.as_bytes());
        let _ = stdout.flush();
    }

    fn on_complete(&mut self, _completion: &Completion) {}

    fn on_error(&mut self, _error: &StreamError) {}
}

pub fn offline_notice(base_url: &str) {
    eprintln!();
    eprintln!("  The Ollama service is not reachable at {base_url}.");
    eprintln!();
    eprintln!("  Start it with:    ollama serve");
    eprintln!("  or point chatline elsewhere with --url or OLLAMA_API_URL.");
    eprintln!();
}

/// Finish the answer line; `false` if the reply failed
pub fn outcome(outcome: &ReplyOutcome, base_url: &str) -> bool {
    println!();
    match outcome {
        ReplyOutcome::Completed { completion, .. } => {
            match completion.reason {
                CompletionReason::Finished | CompletionReason::EndOfStream => {}
                CompletionReason::Stalled => {
                    eprintln!("[the server went quiet; the answer may be incomplete]");
                }
                CompletionReason::Stopped => eprintln!("[stopped]"),
                CompletionReason::Superseded => eprintln!("[replaced by a newer request]"),
            }
            if let Some(rate) = completion.stats.as_ref().and_then(|s| s.tokens_per_second()) {
                tracing::debug!(
                    tokens = completion.token_count,
                    tokens_per_second = rate,
                    "Answer complete"
                );
            }
            true
        }
        ReplyOutcome::Failed { error, .. } if error.is_service_offline() => {
            offline_notice(base_url);
            false
        }
        ReplyOutcome::Failed { error, .. } => {
            eprintln!("error: {error}");
            false
        }
    }
}

fn human_size(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let gb = bytes as f64 / 1_000_000_000.0;
    if gb >= 1.0 {
        format!("{gb:.1} GB")
    } else {
        #[allow(clippy::cast_precision_loss)]
        let mb = bytes as f64 / 1_000_000.0;
        format!("{mb:.0} MB")
    }
}

pub fn models(models: &[ModelInfo], current: Option<&str>) {
    if models.is_empty() {
        println!("No models installed. Pull one with `ollama pull llama3.2`.");
        return;
    }
    for model in models {
        let marker = if current == Some(model.name.as_str()) {
            '*'
        } else {
            ' '
        };
        println!(
            "{marker} {:<32} {:>8} {:>10} {:>8}",
            model.name,
            model.parameter_size.as_deref().unwrap_or("-"),
            model.quantization_level.as_deref().unwrap_or("-"),
            model.size.map(human_size).unwrap_or_default(),
        );
    }
}

pub fn conversations(conversations: &[Conversation]) {
    if conversations.is_empty() {
        println!("No saved conversations.");
        return;
    }
    for c in conversations {
        println!(
            "{}  {}  {:>3} msgs  {:<16}  {}",
            c.id,
            c.updated_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M"),
            c.message_count,
            c.model,
            c.title
        );
    }
}

pub fn messages(messages: &[Message]) {
    for m in messages {
        let who = match m.role {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        let cut = if m.truncated { " (incomplete)" } else { "" };
        println!("{who}{cut}:");
        println!("{}", m.content);
        println!();
    }
}

pub fn transcript(conversation: &Conversation, history: &[Message]) {
    println!("# {} ({})", conversation.title, conversation.model);
    println!();
    messages(history);
}
