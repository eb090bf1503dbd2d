use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use quire_ai::model_registry::models_for_provider;
use quire_ai::stream::{CancelHandle, CompletionStream, StreamEvent};
use quire_ai::types::{
    Attachment, CompletionRequest, CompletionResult, FinishReason, ModelInfo, ProviderKind,
};
use quire_ai::{AiProvider, AiService, ProviderError};
use quire_core::config::{QuireConfig, ReasoningEffort};
use quire_core::conversations::ConversationStore;
use quire_core::error_handler::{QuireError, STANDARD_LIMIT_MESSAGE};
use quire_core::storage::LocalStore;
use quire_core::usage::{UsageCounters, UsageTier, UsageTracker};
use quire_ui::chat_log::{ChatLog, ERROR_PREFIX, ElementKind};
use quire_ui::chat_service::ChatService;
use quire_ui::clipboard::MemoryClipboard;
use quire_ui::composer::Submission;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Scripted provider
// ---------------------------------------------------------------------------

enum Script {
    /// Stream these deltas, then end normally.
    Reply(Vec<&'static str>),
    /// Stream these deltas, then report an error.
    FailMidway(Vec<&'static str>, ProviderError),
    /// Refuse before streaming.
    Reject(ProviderError),
    /// Stream these deltas and keep the connection open until cancelled.
    Stall(Vec<&'static str>),
}

struct ScriptedProvider {
    script: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn deltas(parts: Vec<&'static str>) -> Vec<StreamEvent> {
    parts
        .into_iter()
        .map(|p| StreamEvent::Delta(p.to_string()))
        .collect()
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    fn models(&self) -> Vec<ModelInfo> {
        models_for_provider(ProviderKind::OpenAI)
            .into_iter()
            .cloned()
            .collect()
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        cancel: CancelHandle,
    ) -> Result<CompletionStream, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Reply(vec!["ok"]));

        match next {
            Script::Reply(parts) => {
                let mut events = deltas(parts);
                events.push(StreamEvent::Done { usage: None });
                Ok(
                    CompletionStream::from_events(events, &request.model, ProviderKind::OpenAI)
                        .with_cancel(cancel),
                )
            }
            Script::FailMidway(parts, err) => {
                let mut events = deltas(parts);
                events.push(StreamEvent::Error(err));
                Ok(
                    CompletionStream::from_events(events, &request.model, ProviderKind::OpenAI)
                        .with_cancel(cancel),
                )
            }
            Script::Reject(err) => Err(err),
            Script::Stall(parts) => {
                let (tx, rx) = mpsc::channel(8);
                for event in deltas(parts) {
                    tx.try_send(event).unwrap();
                }
                let held = cancel.clone();
                tokio::spawn(async move {
                    held.cancelled().await;
                    drop(tx);
                });
                Ok(CompletionStream::new(
                    rx,
                    cancel,
                    &request.model,
                    ProviderKind::OpenAI,
                ))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Fixture {
    store: Arc<LocalStore>,
    provider: Arc<ScriptedProvider>,
    service: ChatService,
}

fn service_over(store: &Arc<LocalStore>, provider: &Arc<ScriptedProvider>) -> ChatService {
    let dyn_provider: Arc<dyn AiProvider> = provider.clone();
    let ai = Arc::new(AiService::with_providers(vec![dyn_provider]));
    ChatService::new(
        ai,
        Arc::clone(store),
        ConversationStore::new(Arc::clone(store)),
        UsageTracker::new(Arc::clone(store)),
    )
}

fn fixture(script: Vec<Script>) -> Fixture {
    let store = Arc::new(LocalStore::in_memory(5 * 1024 * 1024));
    let provider = Arc::new(ScriptedProvider::new(script));
    let service = service_over(&store, &provider);
    Fixture {
        store,
        provider,
        service,
    }
}

fn set_usage(store: &Arc<LocalStore>, standard: u32, premium: u32) {
    let counters = UsageCounters {
        standard,
        premium,
        ..UsageCounters::fresh(Utc::now())
    };
    UsageTracker::new(Arc::clone(store))
        .replace(&counters)
        .unwrap();
}

fn usage(store: &Arc<LocalStore>) -> UsageCounters {
    UsageTracker::new(Arc::clone(store)).snapshot().unwrap()
}

fn ignore(_: &ChatLog, _: &str) {}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_each_increment_rerenders_the_reply() {
    let mut f = fixture(vec![Script::Reply(vec!["Hello", " **world**"])]);
    let mut seen: Vec<(String, String, bool)> = Vec::new();

    let outcome = f
        .service
        .send(Submission::text("hi"), CancelHandle::new(), |log, text| {
            let bot = log.last().unwrap();
            let copy_visible = bot.copy_button().is_some_and(|b| b.visible);
            seen.push((text.to_string(), bot.content_html().to_string(), copy_visible));
        })
        .await
        .unwrap();

    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "Hello");
    assert!(seen[0].1.contains("Hello"));
    assert_eq!(seen[1].0, "Hello **world**");
    assert!(seen[1].1.contains("<strong>world</strong>"));
    assert!(seen.iter().all(|(_, _, copy_visible)| !copy_visible));

    assert_eq!(outcome.text, "Hello **world**");
    assert_eq!(outcome.finish, FinishReason::Done);

    let log = f.service.log();
    assert_eq!(log.len(), 2);
    assert_eq!(log.elements()[0].kind(), ElementKind::User);
    let bot = log.last().unwrap();
    assert_eq!(bot.kind(), ElementKind::Bot);
    assert!(!bot.is_streaming());
    assert!(bot.copy_button().unwrap().visible);
    assert!(!f.service.composer().is_disabled());
    assert!(!f.service.is_streaming());
}

#[tokio::test]
async fn test_empty_submission_is_rejected_before_sending() {
    let mut f = fixture(vec![]);

    let err = f
        .service
        .send(Submission::text("   \n"), CancelHandle::new(), ignore)
        .await
        .unwrap_err();

    assert_eq!(err, QuireError::EmptySubmission);
    assert!(f.provider.requests().is_empty());
    assert!(f.service.log().is_empty());
    assert!(f.service.conversations().is_empty());
}

#[tokio::test]
async fn test_empty_composer_is_rejected() {
    let mut f = fixture(vec![]);
    f.service.composer_mut().set_input("  ");

    let err = f
        .service
        .send_composed(CancelHandle::new(), ignore)
        .await
        .unwrap_err();

    assert_eq!(err, QuireError::EmptySubmission);
    assert!(f.provider.requests().is_empty());
}

#[tokio::test]
async fn test_composer_content_is_sent_and_cleared() {
    let mut f = fixture(vec![Script::Reply(vec!["sure"])]);
    f.service.composer_mut().set_input("  tell me more  ");

    f.service
        .send_composed(CancelHandle::new(), ignore)
        .await
        .unwrap();

    assert_eq!(f.provider.requests()[0].message, "tell me more");
    assert!(f.service.composer().input().is_empty());
}

#[test]
fn test_second_submission_while_streaming_is_busy() {
    let mut f = fixture(vec![]);
    let _pending = f
        .service
        .begin_submission(Submission::text("one"), CancelHandle::new())
        .unwrap();

    let err = f
        .service
        .begin_submission(Submission::text("two"), CancelHandle::new())
        .unwrap_err();
    assert_eq!(err, QuireError::Busy);
    assert!(f.service.composer().is_disabled());
}

#[test]
fn test_split_submission_flow() {
    let mut f = fixture(vec![]);
    let pending = f
        .service
        .begin_submission(Submission::text("hi"), CancelHandle::new())
        .unwrap();

    let mut clipboard = MemoryClipboard::new();
    assert!(f.service.is_streaming());
    assert!(!f.service.copy_message(&pending.element_id, &mut clipboard).unwrap());

    let element_id = pending.element_id.clone();
    let result = CompletionResult {
        text: "done".into(),
        model: "gpt-4.1-mini".into(),
        provider: ProviderKind::OpenAI,
        usage: None,
        finish: FinishReason::Done,
    };
    f.service.finish_reply(pending, Ok(result)).unwrap();

    assert!(f.service.copy_message(&element_id, &mut clipboard).unwrap());
    assert_eq!(clipboard.contents(), Some("done"));
    assert_eq!(usage(&f.store).standard, 1);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_history_is_persisted_and_sent() {
    let mut f = fixture(vec![
        Script::Reply(vec!["one"]),
        Script::Reply(vec!["two"]),
    ]);

    f.service
        .send(Submission::text("first"), CancelHandle::new(), ignore)
        .await
        .unwrap();
    let outcome = f
        .service
        .send(Submission::text("second"), CancelHandle::new(), ignore)
        .await
        .unwrap();

    let requests = f.provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].history.is_empty());
    let second = &requests[1];
    assert_eq!(second.message, "second");
    assert_eq!(second.history.len(), 2);
    assert_eq!(second.history[0].content.as_text(), "first");
    assert_eq!(second.history[1].content.as_text(), "one");
    assert_eq!(second.options.temperature, Some(0.7));
    assert_eq!(second.options.max_tokens, Some(2048));
    assert_eq!(second.options.reasoning_effort, None);

    let conversation = f.service.current_conversation().unwrap();
    assert_eq!(conversation.id, outcome.conversation_id);
    let texts: Vec<&str> = conversation.messages.iter().map(|m| m.text()).collect();
    assert_eq!(texts, vec!["first", "one", "second", "two"]);
    assert_eq!(conversation.messages[3].model.as_deref(), Some("gpt-4.1-mini"));
    assert_eq!(f.service.conversations().len(), 1);
}

#[tokio::test]
async fn test_active_conversation_is_restored_on_startup() {
    let mut f = fixture(vec![Script::Reply(vec!["stored reply"])]);
    let outcome = f
        .service
        .send(Submission::text("remember me"), CancelHandle::new(), ignore)
        .await
        .unwrap();

    let reopened = service_over(&f.store, &f.provider);
    assert_eq!(reopened.conversation_id(), Some(outcome.conversation_id.as_str()));
    assert_eq!(reopened.log().len(), 2);
    assert!(reopened.log().to_html().contains("stored reply"));
}

#[tokio::test]
async fn test_new_chat_open_and_delete() {
    let mut f = fixture(vec![Script::Reply(vec!["a"]), Script::Reply(vec!["b"])]);
    let first = f
        .service
        .send(Submission::text("first chat"), CancelHandle::new(), ignore)
        .await
        .unwrap();

    f.service.new_chat();
    assert!(f.service.log().is_empty());
    assert_eq!(f.service.conversation_id(), None);

    let second = f
        .service
        .send(Submission::text("second chat"), CancelHandle::new(), ignore)
        .await
        .unwrap();
    assert_ne!(first.conversation_id, second.conversation_id);
    assert_eq!(f.service.conversations().len(), 2);

    f.service.open_conversation(&first.conversation_id).unwrap();
    assert!(f.service.log().to_html().contains("first chat"));

    assert!(f.service.delete_conversation(&first.conversation_id).unwrap());
    assert_eq!(f.service.conversation_id(), Some(second.conversation_id.as_str()));
    assert!(f.service.log().to_html().contains("second chat"));

    assert!(f.service.delete_conversation(&second.conversation_id).unwrap());
    assert_eq!(f.service.conversation_id(), None);
    assert!(f.service.log().is_empty());
    assert!(matches!(
        f.service.open_conversation("missing"),
        Err(QuireError::Internal(_))
    ));
}

#[tokio::test]
async fn test_attachments_are_sent_and_referenced() {
    let mut f = fixture(vec![Script::Reply(vec!["read it"])]);
    let attachment = Attachment {
        id: "a1".into(),
        name: "notes.txt".into(),
        mime_type: "text/plain".into(),
        size: 5,
        data_url: "data:text/plain;base64,aGVsbG8=".into(),
        text_content: Some("hello".into()),
    };
    let submission = Submission {
        text: "summarize".into(),
        attachments: vec![attachment],
    };

    f.service
        .send(submission, CancelHandle::new(), ignore)
        .await
        .unwrap();

    assert_eq!(f.provider.requests()[0].options.attachments.len(), 1);
    let conversation = f.service.current_conversation().unwrap();
    let refs = conversation.messages[0].content.attachments();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].name, "notes.txt");
    assert!(f.service.log().elements()[0]
        .content_html()
        .contains("[Attached 1 file]"));
}

// ---------------------------------------------------------------------------
// Models and usage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_select_model_persists_and_routes_usage() {
    let mut f = fixture(vec![Script::Reply(vec!["premium answer"])]);
    f.service.select_model("gpt-4.1").unwrap();
    assert_eq!(QuireConfig::load(&f.store).active_model.model, "gpt-4.1");

    f.service
        .send(Submission::text("hi"), CancelHandle::new(), ignore)
        .await
        .unwrap();

    let counters = usage(&f.store);
    assert_eq!(counters.premium, 1);
    assert_eq!(counters.standard, 0);
    assert_eq!(f.provider.requests()[0].model, "gpt-4.1");

    assert!(matches!(
        f.service.select_model("no-such-model"),
        Err(QuireError::Config(_))
    ));
    assert_eq!(f.service.current_model(), "gpt-4.1");
}

#[tokio::test]
async fn test_reasoning_model_carries_effort() {
    let mut f = fixture(vec![Script::Reply(vec!["thought"])]);
    f.service.select_model("o4-mini").unwrap();

    f.service
        .send(Submission::text("think"), CancelHandle::new(), ignore)
        .await
        .unwrap();

    assert_eq!(
        f.provider.requests()[0].options.reasoning_effort,
        Some(ReasoningEffort::Medium)
    );
}

#[tokio::test]
async fn test_usage_warning_is_shown_once() {
    let mut f = fixture(vec![]);
    set_usage(&f.store, 1349, 0);

    for text in ["one", "two"] {
        f.service
            .send(Submission::text(text), CancelHandle::new(), ignore)
            .await
            .unwrap();
    }

    let warnings = f
        .service
        .log()
        .elements()
        .iter()
        .filter(|e| e.kind() == ElementKind::Warning)
        .count();
    assert_eq!(warnings, 1);
    assert_eq!(usage(&f.store).standard, 1351);
    assert!(!f.service.composer().is_disabled());

    let warning_html = f
        .service
        .log()
        .elements()
        .iter()
        .find(|e| e.kind() == ElementKind::Warning)
        .unwrap()
        .to_html();
    assert!(warning_html.contains("1350 of 1500 standard messages"));
    assert!(warning_html.contains("Dismiss"));
}

#[tokio::test]
async fn test_reaching_the_limit_disables_the_composer() {
    let mut f = fixture(vec![]);
    set_usage(&f.store, 1499, 0);

    f.service
        .send(Submission::text("last one"), CancelHandle::new(), ignore)
        .await
        .unwrap();

    assert!(f.service.composer().is_disabled());
    assert_eq!(f.service.composer().placeholder(), STANDARD_LIMIT_MESSAGE);

    let err = f
        .service
        .send(Submission::text("one more"), CancelHandle::new(), ignore)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        QuireError::UsageLimit {
            tier: UsageTier::Standard
        }
    );
    assert_eq!(f.provider.requests().len(), 1);
    assert_eq!(usage(&f.store).standard, 1500);
}

#[tokio::test]
async fn test_limit_applies_per_tier() {
    let mut f = fixture(vec![Script::Reply(vec!["standard still works"])]);
    set_usage(&f.store, 0, 100);

    f.service.select_model("gpt-4o").unwrap();
    assert!(f.service.composer().is_disabled());

    f.service.select_model("gpt-4.1-mini").unwrap();
    assert!(!f.service.composer().is_disabled());
    f.service
        .send(Submission::text("hi"), CancelHandle::new(), ignore)
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_transport_error_offers_retry() {
    let mut f = fixture(vec![
        Script::FailMidway(vec!["Par"], ProviderError::Network("connection reset".into())),
        Script::Reply(vec!["Recovered"]),
    ]);

    let err = f
        .service
        .send(Submission::text("question"), CancelHandle::new(), ignore)
        .await
        .unwrap_err();
    assert!(matches!(err, QuireError::Transport(_)));

    let failed = f.service.log().last().unwrap();
    assert_eq!(failed.kind(), ElementKind::Error);
    assert!(failed.can_retry());
    assert!(failed.content_html().contains(ERROR_PREFIX));
    assert!(failed.content_html().contains("Network error: connection reset"));
    assert!(failed.content_html().contains("retry-btn"));
    assert_eq!(usage(&f.store).standard, 0);
    assert!(!f.service.composer().is_disabled());

    let failed_id = f.service.log().last_retryable().unwrap().to_string();
    let outcome = f
        .service
        .retry(&failed_id, CancelHandle::new(), ignore)
        .await
        .unwrap();

    assert_eq!(outcome.text, "Recovered");
    assert!(f.service.log().get(&failed_id).is_none());
    let requests = f.provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].message, "question");
    assert_eq!(usage(&f.store).standard, 1);
}

#[tokio::test]
async fn test_missing_credential_has_no_retry() {
    let mut f = fixture(vec![Script::Reject(ProviderError::MissingCredential {
        provider: "OpenAI".into(),
    })]);

    let err = f
        .service
        .send(Submission::text("hi"), CancelHandle::new(), ignore)
        .await
        .unwrap_err();
    assert!(matches!(err, QuireError::Config(_)));

    let failed = f.service.log().last().unwrap();
    assert_eq!(failed.kind(), ElementKind::Error);
    assert!(!failed.can_retry());
    assert!(failed.content_html().contains("API key is not configured"));
    assert!(!failed.content_html().contains("retry-btn"));
    assert!(f.service.log().last_retryable().is_none());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancel_keeps_partial_text() {
    let mut f = fixture(vec![Script::Stall(vec!["Partial answer"])]);
    let cancel = CancelHandle::new();
    let trigger = cancel.clone();

    let outcome = f
        .service
        .send(Submission::text("long question"), cancel, |_, _| trigger.cancel())
        .await
        .unwrap();

    assert_eq!(outcome.finish, FinishReason::Cancelled);
    assert_eq!(outcome.text, "Partial answer");

    let bot = f.service.log().last().unwrap();
    assert_eq!(bot.kind(), ElementKind::Bot);
    assert!(!bot.is_streaming());
    assert!(bot.copy_button().unwrap().visible);

    let conversation = f.service.current_conversation().unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[1].text(), "Partial answer");
    assert_eq!(usage(&f.store).standard, 0);
    assert!(!f.service.composer().is_disabled());
}

#[tokio::test]
async fn test_cancel_before_any_text_drops_the_placeholder() {
    let mut f = fixture(vec![Script::Stall(vec![])]);
    let cancel = CancelHandle::new();
    cancel.cancel();

    let outcome = f
        .service
        .send(Submission::text("never mind"), cancel, ignore)
        .await
        .unwrap();

    assert_eq!(outcome.finish, FinishReason::Cancelled);
    assert!(outcome.text.is_empty());
    assert_eq!(f.service.log().len(), 1);
    assert_eq!(f.service.log().last().unwrap().kind(), ElementKind::User);
    assert_eq!(f.service.current_conversation().unwrap().messages.len(), 1);
}

// ---------------------------------------------------------------------------
// Copy controls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_copy_message_and_code() {
    let mut f = fixture(vec![Script::Reply(vec![
        "Here you go:\n\n```rust\n",
        "fn main() { println!(\"<hi>\"); }\n```",
    ])]);

    let outcome = f
        .service
        .send(Submission::text("code please"), CancelHandle::new(), ignore)
        .await
        .unwrap();

    let mut clipboard = MemoryClipboard::new();
    assert!(f.service.copy_message(&outcome.element_id, &mut clipboard).unwrap());
    assert_eq!(clipboard.contents(), Some(outcome.text.as_str()));

    assert!(f.service.copy_code(&outcome.element_id, 0, &mut clipboard).unwrap());
    assert_eq!(
        clipboard.contents(),
        Some("fn main() { println!(\"<hi>\"); }")
    );
    assert!(!f.service.copy_code(&outcome.element_id, 1, &mut clipboard).unwrap());

    assert_eq!(f.service.toggle_code_collapse(&outcome.element_id, 0), Some(true));
    assert_eq!(f.service.toggle_code_collapse(&outcome.element_id, 0), Some(false));

    let html = f.service.log().to_html();
    assert!(html.contains("&lt;hi&gt;"));
    assert!(!html.contains("<hi>"));
}
