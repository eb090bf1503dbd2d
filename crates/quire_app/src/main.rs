mod clipboard;
mod output;
mod repl;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use quire_ai::service::{AiService, AiServiceConfig};
use quire_core::config::{QuireConfig, ReasoningEffort};
use quire_core::conversations::ConversationStore;
use quire_core::logging;
use quire_core::storage::LocalStore;
use quire_core::usage::UsageTracker;
use quire_ui::attachments::load_attachment;
use quire_ui::chat_service::ChatService;
use quire_ui::composer::Submission;
use quire_ui::export::export_conversation;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "quire", version, about = "Streaming chat client for OpenAI models")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat (the default)
    Chat,
    /// Send one message and print the reply
    Ask {
        /// Message text
        #[arg(required = true)]
        prompt: Vec<String>,
        /// File to attach; may be repeated
        #[arg(long = "attach", value_name = "PATH")]
        attach: Vec<PathBuf>,
    },
    /// List models grouped by provider
    Models,
    /// Manage stored conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationsCommand,
    },
    /// Write a conversation as a printable HTML document
    Export {
        /// Conversation id or id prefix (defaults to the active one)
        id: Option<String>,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Show message usage for this period
    Usage,
}

#[derive(Subcommand)]
enum ConversationsCommand {
    /// List conversations, most recent first
    List {
        /// Only show conversations matching this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Delete a conversation by id or id prefix
    Delete { id: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
    /// Store the OpenAI API key
    SetKey { key: String },
    /// Remove the stored OpenAI API key
    ClearKey,
    /// Set the active model
    Model { id: String },
    /// Sampling temperature, 0.0 to 2.0
    Temperature { value: f32 },
    /// Maximum tokens per reply
    MaxTokens { value: u32 },
    /// Reasoning effort for reasoning models: low, medium or high
    ReasoningEffort { value: String },
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn open_store() -> Result<Arc<LocalStore>> {
    QuireConfig::ensure_dirs()?;
    let path = QuireConfig::storage_path()?;
    let store = LocalStore::open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    info!("Opened store at {}", path.display());
    Ok(Arc::new(store))
}

fn build_ai(store: &LocalStore) -> Arc<AiService> {
    let config = QuireConfig::load(store);
    Arc::new(AiService::new(AiServiceConfig {
        openai_api_key: config.openai_api_key,
        ..AiServiceConfig::default()
    }))
}

fn build_chat(store: &Arc<LocalStore>) -> ChatService {
    ChatService::new(
        build_ai(store),
        Arc::clone(store),
        ConversationStore::new(Arc::clone(store)),
        UsageTracker::new(Arc::clone(store)),
    )
}

fn resolve_conversation_id(conversations: &ConversationStore, target: &str) -> Result<String> {
    let matches: Vec<String> = conversations
        .list()
        .into_iter()
        .filter(|s| s.id.starts_with(target))
        .map(|s| s.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(id.clone()),
        [] => bail!("No conversation matches '{target}'"),
        _ => bail!("'{target}' matches {} conversations", matches.len()),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn ask(store: &Arc<LocalStore>, prompt: Vec<String>, attach: Vec<PathBuf>) -> Result<()> {
    let mut attachments = Vec::with_capacity(attach.len());
    for path in &attach {
        attachments.push(load_attachment(path)?);
    }
    let submission = Submission {
        text: prompt.join(" "),
        attachments,
    };

    let mut service = build_chat(store);
    repl::ask(&mut service, submission)
        .await
        .map(|_| ())
        .map_err(|e| anyhow!(e.user_message()))
}

fn conversations(store: &Arc<LocalStore>, action: ConversationsCommand) -> Result<()> {
    let conversations = ConversationStore::new(Arc::clone(store));
    match action {
        ConversationsCommand::List { search } => {
            let summaries = match search {
                Some(q) => conversations.search(&q),
                None => conversations.list(),
            };
            output::print_conversations(&summaries, conversations.active_id().as_deref());
        }
        ConversationsCommand::Delete { id } => {
            let id = resolve_conversation_id(&conversations, &id)?;
            conversations.delete(&id)?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

fn export(store: &Arc<LocalStore>, id: Option<String>, out: Option<PathBuf>) -> Result<()> {
    let conversations = ConversationStore::new(Arc::clone(store));
    let id = match id {
        Some(target) => resolve_conversation_id(&conversations, &target)?,
        None => conversations
            .active_id()
            .context("No active conversation; pass an id")?,
    };
    let conversation = conversations
        .get(&id)
        .with_context(|| format!("Conversation {id} not found"))?;
    let html = export_conversation(&conversation);

    match out {
        Some(path) => {
            std::fs::write(&path, html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported to {}", path.display());
        }
        None => println!("{html}"),
    }
    Ok(())
}

fn config(store: &Arc<LocalStore>, action: ConfigCommand) -> Result<()> {
    let mut config = QuireConfig::load(store);
    match action {
        ConfigCommand::Show => {
            let key = config
                .openai_api_key
                .as_deref()
                .map_or_else(|| "(not set)".to_string(), output::mask_key);
            println!("OpenAI API key:   {key}");
            println!(
                "Model:            {} ({})",
                config.active_model.model, config.active_model.provider
            );
            println!("Temperature:      {}", config.temperature);
            println!("Max tokens:       {}", config.max_tokens);
            println!("Reasoning effort: {}", config.reasoning_effort.as_str());
            println!("Theme:            {}", config.theme.as_str());
            if let Some(system) = config.user.system_message() {
                println!("System message:   {system}");
            }
            if let Some(path) = store.path() {
                println!("Storage:          {}", path.display());
            }
        }
        ConfigCommand::SetKey { key } => {
            config.set_api_key(store, Some(&key))?;
            println!("API key saved.");
        }
        ConfigCommand::ClearKey => {
            config.set_api_key(store, None)?;
            println!("API key removed.");
        }
        ConfigCommand::Model { id } => {
            let ai = build_ai(store);
            let model = ai
                .find_model(&id)
                .with_context(|| format!("Model not available: {id}"))?;
            config.set_active_model(store, model.provider.id(), &model.id)?;
            println!("Now using {} ({}).", model.name, model.provider);
        }
        ConfigCommand::Temperature { value } => {
            config.set_temperature(store, value)?;
            println!("Temperature set to {value}.");
        }
        ConfigCommand::MaxTokens { value } => {
            config.set_max_tokens(store, value)?;
            println!("Max tokens set to {value}.");
        }
        ConfigCommand::ReasoningEffort { value } => {
            let effort: ReasoningEffort = value.parse()?;
            config.set_reasoning_effort(store, effort)?;
            println!("Reasoning effort set to {}.", effort.as_str());
        }
    }
    Ok(())
}

fn usage(store: &Arc<LocalStore>) -> Result<()> {
    let tracker = UsageTracker::new(Arc::clone(store));
    let counters = tracker.snapshot()?;
    output::print_usage(&counters, &tracker.formatted_reset_time()?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let store = open_store()?;
    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => repl::run(build_chat(&store)).await,
        Command::Ask { prompt, attach } => ask(&store, prompt, attach).await,
        Command::Models => {
            let ai = build_ai(&store);
            let active = QuireConfig::load(&store).active_model.model;
            output::print_models(&ai.grouped_models(), &active);
            Ok(())
        }
        Command::Conversations { action } => conversations(&store, action),
        Command::Export { id, output } => export(&store, id, output),
        Command::Config { action } => config(&store, action),
        Command::Usage => usage(&store),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Console logs go to stderr so streamed replies on stdout stay clean.
    let console_filter = if cli.verbose { "debug" } else { "warn" };
    let _log_guard = match logging::init_logging(console_filter) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging disabled: {e:#}");
            None
        }
    };
    info!("Quire v{} starting", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
