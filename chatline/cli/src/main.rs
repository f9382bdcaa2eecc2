//! Chatline - Terminal Chat for Local LLM Servers
//!
//! A small front end over `chatline-core`: streams answers from an Ollama
//! server into the terminal and keeps conversation history on disk.
//!
//! # Usage
//!
//! ```bash
//! # Interactive chat (default command)
//! chatline
//!
//! # One question, answer streamed to stdout
//! chatline ask "Why is the sky blue?"
//!
//! # Installed models and saved conversations
//! chatline models
//! chatline history
//!
//! # Another server, history kept in memory only
//! chatline --url http://gpu-box:11434 --ephemeral
//!
//! # Verbose logging (written to stderr)
//! RUST_LOG=debug chatline
//! ```

mod render;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use chatline_core::{
    load_config_from_path, select_model, AppStateFile, ChatSession, ChatStore, ClientConfig,
    ConfigOverrides, ConversationId, JsonFileStore, MemoryChatStore, StreamingClient,
};

/// Chatline - streaming chat with a local LLM server
#[derive(Parser, Debug)]
#[command(name = "chatline")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server base URL (overrides config file and OLLAMA_API_URL)
    #[arg(short = 'u', long, value_name = "URL")]
    url: Option<String>,

    /// Model to chat with (default: last used, then configured, then first installed)
    #[arg(short = 'm', long, value_name = "NAME")]
    model: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "CHATLINE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for conversation history and state
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Keep history in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Maximum concurrent non-streaming requests
    #[arg(long, value_name = "N")]
    max_concurrent: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHATLINE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat (the default)
    Chat {
        /// Continue a saved conversation
        #[arg(long, value_name = "ID")]
        resume: Option<String>,
    },
    /// List installed models
    Models,
    /// List saved conversations, or print one
    History {
        /// Conversation to print
        id: Option<String>,
    },
    /// Ask one question and stream the answer
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
}

/// Logs go to stderr so answers on stdout stay clean
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chatline={level},chatline_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = load_config_from_path(args.config.clone())
        .context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref url) = args.url {
        overrides = overrides.with_base_url(url.clone());
    }
    if let Some(ref model) = args.model {
        overrides = overrides.with_default_model(model.clone());
    }
    if let Some(ref dir) = args.data_dir {
        overrides = overrides.with_data_dir(dir.clone());
    }
    if let Some(n) = args.max_concurrent {
        overrides = overrides.with_max_concurrent(n);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line option")?;

    info!(
        source = ?config.source(),
        file = ?config.config_file_path(),
        base_url = %config.base_url,
        "Configuration loaded"
    );
    Ok(config)
}

/// Everything a command needs
struct App {
    config: ClientConfig,
    client: Arc<StreamingClient>,
    store: Arc<dyn ChatStore>,
    state_file: Option<AppStateFile>,
}

impl App {
    async fn open(config: ClientConfig, ephemeral: bool) -> Result<Self> {
        let client = Arc::new(StreamingClient::new(&config).context("Failed to create client")?);

        let data_dir = if ephemeral {
            None
        } else {
            let dir = config.resolved_data_dir();
            if dir.is_none() {
                warn!("No data directory available, history will not be saved");
            }
            dir
        };

        let (store, state_file) = match data_dir {
            Some(dir) => {
                let store: Arc<dyn ChatStore> = Arc::new(
                    JsonFileStore::open_in_dir(&dir)
                        .await
                        .with_context(|| format!("Failed to open history in {}", dir.display()))?,
                );
                (store, Some(AppStateFile::in_dir(&dir)))
            }
            None => {
                let store: Arc<dyn ChatStore> = Arc::new(MemoryChatStore::new());
                (store, None)
            }
        };

        Ok(Self {
            config,
            client,
            store,
            state_file,
        })
    }

    /// Fail with the offline notice unless the server answers
    async fn ensure_online(&self) -> Result<()> {
        if self.client.health_check().await {
            return Ok(());
        }
        render::offline_notice(self.client.base_url());
        anyhow::bail!("inference service unreachable at {}", self.client.base_url())
    }

    /// Model for a new chat
    async fn pick_model(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(model) = explicit {
            return Ok(model.to_string());
        }

        let available = self
            .client
            .list_models()
            .await
            .context("Failed to list models")?;
        let last_used = match self.state_file {
            Some(ref file) => file.load().await.last_used_model,
            None => None,
        };

        select_model(
            &available,
            last_used.as_deref(),
            self.config.default_model.as_deref(),
        )
        .context("No models installed. Pull one first, e.g. `ollama pull llama3.2`")
    }

    fn chat_session(&self, model: String) -> ChatSession {
        let session = ChatSession::new(Arc::clone(&self.client), Arc::clone(&self.store), model);
        match self.state_file {
            Some(ref file) => session.with_state_file(file.clone()),
            None => session,
        }
    }
}

async fn run(args: Args, config: ClientConfig) -> Result<()> {
    let app = App::open(config, args.ephemeral).await?;

    match args.command.unwrap_or(Command::Chat { resume: None }) {
        Command::Chat { resume } => {
            app.ensure_online().await?;
            let chat = app.chat_session(app.pick_model(args.model.as_deref()).await?);
            if let Some(id) = resume {
                chat.resume(&ConversationId(id))
                    .await
                    .context("Cannot resume conversation")?;
            }
            repl::run(&app.client, &chat).await
        }
        Command::Ask { prompt } => {
            app.ensure_online().await?;
            let chat = app.chat_session(app.pick_model(args.model.as_deref()).await?);
            let finished_ok = repl::ask(&chat, &prompt.join(" ")).await?;
            app.client.shutdown();
            if !finished_ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Models => {
            app.ensure_online().await?;
            let models = app
                .client
                .list_model_info()
                .await
                .context("Failed to list models")?;
            let last_used = match app.state_file {
                Some(ref file) => file.load().await.last_used_model,
                None => None,
            };
            render::models(&models, last_used.as_deref());
            Ok(())
        }
        Command::History { id: None } => {
            let conversations = app.store.list_conversations().await?;
            render::conversations(&conversations);
            Ok(())
        }
        Command::History { id: Some(id) } => {
            let id = ConversationId(id);
            let conversation = app
                .store
                .get_conversation(&id)
                .await?
                .with_context(|| format!("No conversation {id}"))?;
            let messages = app.store.list_messages(&id).await?;
            render::transcript(&conversation, &messages);
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    // The config file is read with blocking I/O, before any task runs
    let config = load_config(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(run(args, config))
}
