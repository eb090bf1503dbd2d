//! Interactive chat loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use quire_ai::stream::CancelHandle;
use quire_ai::types::FinishReason;
use quire_core::error_handler::QuireError;
use quire_ui::attachments::{format_file_size, load_attachment};
use quire_ui::chat_log::ChatLog;
use quire_ui::chat_service::{ChatService, ReplyOutcome};
use quire_ui::composer::Submission;
use quire_ui::export::export_html;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clipboard::SystemClipboard;
use crate::output::{self, StreamPrinter};

const HELP: &str = "\
Commands:
  /new                 start a new conversation
  /list [query]        list (or search) conversations
  /open <n|id>         open a conversation
  /delete <n|id>       delete a conversation
  /model [id]          list models, or switch to one
  /attach <path>       attach a file to the next message
  /detach <name>       remove a pending attachment
  /retry               resend the last failed message
  /copy                copy the last reply
  /copy-code [n]       copy the nth code block of the last reply
  /export [path]       write the conversation as HTML
  /usage               show message usage
  /help                show this help
  /quit                exit (Ctrl-D also works)
Ctrl-C stops a reply while it is streaming, and exits at the prompt.";

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Message(String),
    New,
    List(Option<String>),
    Open(String),
    Delete(String),
    Model(Option<String>),
    Attach(PathBuf),
    Detach(String),
    Retry,
    Copy,
    CopyCode(usize),
    Export(PathBuf),
    Usage,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };

        match (name, arg) {
            ("new", _) => Self::New,
            ("list", query) => Self::List(query.map(str::to_string)),
            ("open", Some(target)) => Self::Open(target.to_string()),
            ("delete", Some(target)) => Self::Delete(target.to_string()),
            ("model", model) => Self::Model(model.map(str::to_string)),
            ("attach", Some(path)) => Self::Attach(PathBuf::from(path)),
            ("detach", Some(name)) => Self::Detach(name.to_string()),
            ("retry", _) => Self::Retry,
            ("copy", _) => Self::Copy,
            ("copy-code", None) => Self::CopyCode(1),
            ("copy-code", Some(n)) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Self::CopyCode(n),
                _ => Self::Unknown(line.to_string()),
            },
            ("export", path) => {
                Self::Export(PathBuf::from(path.unwrap_or("conversation.html")))
            }
            ("usage", _) => Self::Usage,
            ("help", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

/// Ctrl-C routing for a whole session. Once tokio owns SIGINT it keeps it,
/// so a single listener either cancels the reply in flight or, when idle,
/// asks the loop to quit.
#[derive(Clone, Default)]
struct Interrupts {
    streaming: Arc<Mutex<Option<CancelHandle>>>,
    quit: Arc<Notify>,
}

impl Interrupts {
    fn install() -> (Self, JoinHandle<()>) {
        let interrupts = Self::default();
        let listener = interrupts.clone();
        let task = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                listener.interrupt();
            }
        });
        (interrupts, task)
    }

    /// Returns `true` if a streaming reply was cancelled.
    fn interrupt(&self) -> bool {
        match self.streaming.lock().take() {
            Some(cancel) => {
                info!("Interrupted; cancelling reply");
                cancel.cancel();
                true
            }
            None => {
                self.quit.notify_one();
                false
            }
        }
    }

    fn begin(&self, cancel: CancelHandle) {
        *self.streaming.lock() = Some(cancel);
    }

    fn end(&self) {
        self.streaming.lock().take();
    }

    async fn quit_requested(&self) {
        self.quit.notified().await;
    }
}

enum Outgoing {
    Composed,
    Submission(Submission),
    Retry(String),
}

/// Send and stream the reply to stdout, then print any warnings or errors
/// the exchange produced.
async fn stream_reply(
    service: &mut ChatService,
    interrupts: &Interrupts,
    outgoing: Outgoing,
) -> Result<ReplyOutcome, QuireError> {
    let cancel = CancelHandle::new();
    interrupts.begin(cancel.clone());
    let before = service.log().len();
    let mut printer = StreamPrinter::new();

    let on_update = |_: &ChatLog, text: &str| {
        if let Some(suffix) = printer.advance(text) {
            output::write_flush(suffix);
        }
    };
    let result = match outgoing {
        Outgoing::Composed => service.send_composed(cancel, on_update).await,
        Outgoing::Submission(submission) => service.send(submission, cancel, on_update).await,
        Outgoing::Retry(id) => service.retry(&id, cancel, on_update).await,
    };
    interrupts.end();

    match &result {
        Ok(outcome) => {
            if let Some(rest) = printer.finish(&outcome.text) {
                output::write_flush(&rest);
            }
            if !printer.is_empty() {
                println!();
            }
            if outcome.finish == FinishReason::Cancelled {
                println!("[stopped]");
            }
            println!();
            output::print_notices(service.log(), before);
        }
        Err(e) => {
            if !printer.is_empty() {
                println!();
            }
            if output::print_notices(service.log(), before) == 0 {
                eprintln!("{}", e.user_message());
            }
        }
    }
    result
}

/// One-shot send used by `quire ask`.
pub async fn ask(
    service: &mut ChatService,
    submission: Submission,
) -> Result<ReplyOutcome, QuireError> {
    let (interrupts, listener) = Interrupts::install();
    let result = stream_reply(service, &interrupts, Outgoing::Submission(submission)).await;
    listener.abort();
    result
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Resolve a list position (1-based) or id prefix to a conversation id.
fn resolve_conversation(service: &ChatService, target: &str) -> Option<String> {
    let summaries = service.conversations();
    if let Ok(n) = target.parse::<usize>() {
        return summaries.get(n.checked_sub(1)?).map(|s| s.id.clone());
    }
    summaries
        .into_iter()
        .find(|s| s.id.starts_with(target))
        .map(|s| s.id)
}

pub async fn run(mut service: ChatService) -> Result<()> {
    println!("quire: chatting with {}. Type /help for commands.", service.current_model());
    if !service.log().is_empty() {
        println!();
        output::print_log(service.log(), 0);
    }

    let (interrupts, listener) = Interrupts::install();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        output::write_flush("> ");
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupts.quit_requested() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Message(text) => {
                service.composer_mut().set_input(text);
                let _ = stream_reply(&mut service, &interrupts, Outgoing::Composed).await;
            }
            ReplCommand::New => {
                service.new_chat();
                println!("Started a new conversation.");
            }
            ReplCommand::List(query) => {
                let summaries = match query {
                    Some(q) => service.search_conversations(&q),
                    None => service.conversations(),
                };
                output::print_conversations(&summaries, service.conversation_id());
            }
            ReplCommand::Open(target) => match resolve_conversation(&service, &target) {
                Some(id) => match service.open_conversation(&id) {
                    Ok(()) => output::print_log(service.log(), 0),
                    Err(e) => eprintln!("{}", e.user_message()),
                },
                None => eprintln!("No conversation matches '{target}'."),
            },
            ReplCommand::Delete(target) => match resolve_conversation(&service, &target) {
                Some(id) => match service.delete_conversation(&id) {
                    Ok(_) => println!("Deleted."),
                    Err(e) => eprintln!("{}", e.user_message()),
                },
                None => eprintln!("No conversation matches '{target}'."),
            },
            ReplCommand::Model(None) => {
                output::print_models(&service.ai().grouped_models(), service.current_model());
            }
            ReplCommand::Model(Some(model)) => match service.select_model(&model) {
                Ok(()) => println!("Now using {model}."),
                Err(e) => eprintln!("{}", e.user_message()),
            },
            ReplCommand::Attach(path) => match load_attachment(&path) {
                Ok(attachment) => {
                    println!(
                        "Attached {} ({}).",
                        attachment.name,
                        format_file_size(attachment.size)
                    );
                    service.composer_mut().add_attachment(attachment);
                }
                Err(e) => eprintln!("{e}"),
            },
            ReplCommand::Detach(name) => {
                if !service.composer_mut().remove_attachment(&name) {
                    eprintln!("No pending attachment named '{name}'.");
                }
            }
            ReplCommand::Retry => match service.log().last_retryable().map(str::to_string) {
                Some(id) => {
                    let _ = stream_reply(&mut service, &interrupts, Outgoing::Retry(id)).await;
                }
                None => eprintln!("Nothing to retry."),
            },
            ReplCommand::Copy => {
                let Some(id) = service.log().last_bot().map(|e| e.id().to_string()) else {
                    eprintln!("No reply to copy.");
                    continue;
                };
                match service.copy_message(&id, &mut SystemClipboard) {
                    Ok(true) => println!("Copied!"),
                    Ok(false) => eprintln!("No reply to copy."),
                    Err(e) => eprintln!("{e:#}"),
                }
            }
            ReplCommand::CopyCode(n) => {
                let Some(id) = service.log().last_bot().map(|e| e.id().to_string()) else {
                    eprintln!("No reply to copy from.");
                    continue;
                };
                match service.copy_code(&id, n - 1, &mut SystemClipboard) {
                    Ok(true) => println!("Copied code block {n}."),
                    Ok(false) => eprintln!("The last reply has no code block {n}."),
                    Err(e) => eprintln!("{e:#}"),
                }
            }
            ReplCommand::Export(path) => {
                match std::fs::write(&path, export_html(service.log())) {
                    Ok(()) => println!("Exported to {}.", path.display()),
                    Err(e) => {
                        warn!("Export to {} failed: {e}", path.display());
                        eprintln!("Export failed: {e}");
                    }
                }
            }
            ReplCommand::Usage => match (service.usage(), service.formatted_reset_time()) {
                (Ok(counters), Ok(reset)) => output::print_usage(&counters, &reset),
                (Err(e), _) | (_, Err(e)) => eprintln!("{}", e.user_message()),
            },
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(line) => eprintln!("Unknown command: {line} (try /help)"),
        }
    }
    listener.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            ReplCommand::parse("  hello there "),
            ReplCommand::Message("hello there".into())
        );
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(ReplCommand::parse("/new"), ReplCommand::New);
        assert_eq!(ReplCommand::parse("/list"), ReplCommand::List(None));
        assert_eq!(
            ReplCommand::parse("/list rust  "),
            ReplCommand::List(Some("rust".into()))
        );
        assert_eq!(ReplCommand::parse("/open 2"), ReplCommand::Open("2".into()));
        assert_eq!(ReplCommand::parse("/model"), ReplCommand::Model(None));
        assert_eq!(
            ReplCommand::parse("/model gpt-4o"),
            ReplCommand::Model(Some("gpt-4o".into()))
        );
        assert_eq!(
            ReplCommand::parse("/attach my notes.txt"),
            ReplCommand::Attach(PathBuf::from("my notes.txt"))
        );
        assert_eq!(ReplCommand::parse("/quit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("/exit"), ReplCommand::Quit);
    }

    #[test]
    fn copy_code_index() {
        assert_eq!(ReplCommand::parse("/copy-code"), ReplCommand::CopyCode(1));
        assert_eq!(ReplCommand::parse("/copy-code 3"), ReplCommand::CopyCode(3));
        assert!(matches!(
            ReplCommand::parse("/copy-code 0"),
            ReplCommand::Unknown(_)
        ));
    }

    #[test]
    fn export_has_a_default_path() {
        assert_eq!(
            ReplCommand::parse("/export"),
            ReplCommand::Export(PathBuf::from("conversation.html"))
        );
    }

    #[test]
    fn interrupt_cancels_only_the_reply_in_flight() {
        let interrupts = Interrupts::default();
        let first = CancelHandle::new();
        interrupts.begin(first.clone());
        assert!(interrupts.interrupt());
        assert!(first.is_cancelled());

        // The handle is consumed; a second Ctrl-C no longer targets it.
        assert!(!interrupts.interrupt());

        let second = CancelHandle::new();
        interrupts.begin(second.clone());
        interrupts.end();
        assert!(!interrupts.interrupt());
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn idle_interrupt_requests_quit() {
        let interrupts = Interrupts::default();
        assert!(!interrupts.interrupt());
        tokio::time::timeout(
            std::time::Duration::from_millis(100),
            interrupts.quit_requested(),
        )
        .await
        .expect("quit was not requested");
    }

    #[tokio::test]
    async fn streaming_interrupt_does_not_request_quit() {
        let interrupts = Interrupts::default();
        interrupts.begin(CancelHandle::new());
        assert!(interrupts.interrupt());
        let quit = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            interrupts.quit_requested(),
        )
        .await;
        assert!(quit.is_err());
    }

    #[test]
    fn missing_arguments_are_unknown() {
        assert!(matches!(ReplCommand::parse("/open"), ReplCommand::Unknown(_)));
        assert!(matches!(ReplCommand::parse("/bogus"), ReplCommand::Unknown(_)));
    }
}
