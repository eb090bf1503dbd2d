//! Chat service: the bridge between the conversation view and the AI
//! backend.
//!
//! `ChatService` owns the on-screen [`ChatLog`] and the [`Composer`], and
//! drives one submission at a time through [`AiService`]. Its collaborators
//! (AI service, local store, conversation store, usage tracker) are passed
//! in by the caller.
//!
//! [`ChatService::begin_submission`] validates a submission, persists the
//! user message and adds the elements. [`ChatService::finish_reply`]
//! finalizes the reply or turns it into an error element.
//! [`ChatService::send`] runs both around the stream.

use std::sync::Arc;

use quire_ai::providers::ProviderError;
use quire_ai::service::AiService;
use quire_ai::stream::CancelHandle;
use quire_ai::types::{
    ChatMessage, CompletionOptions, CompletionRequest, CompletionResult, FinishReason, MessageRole,
};
use quire_core::config::QuireConfig;
use quire_core::conversations::{
    Conversation, ConversationStore, ConversationSummary, StoredMessage,
};
use quire_core::error_handler::{QuireError, classify_error};
use quire_core::storage::LocalStore;
use quire_core::usage::{UsageCounters, UsageStatus, UsageTier, UsageTracker};
use tracing::{error, info, warn};

use crate::chat_log::ChatLog;
use crate::clipboard::Clipboard;
use crate::composer::{Composer, Submission};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A reply that has been started but not finished.
#[derive(Debug, Clone)]
pub struct PendingReply {
    pub element_id: String,
    pub conversation_id: String,
    pub request: CompletionRequest,
    pub tier: UsageTier,
    pub cancel: CancelHandle,
    submission: Submission,
}

/// How a successful reply ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyOutcome {
    pub element_id: String,
    pub conversation_id: String,
    pub text: String,
    pub model: String,
    pub finish: FinishReason,
}

// ---------------------------------------------------------------------------
// ChatService
// ---------------------------------------------------------------------------

pub struct ChatService {
    ai: Arc<AiService>,
    store: Arc<LocalStore>,
    conversations: ConversationStore,
    usage: UsageTracker,
    config: QuireConfig,
    log: ChatLog,
    composer: Composer,
    conversation_id: Option<String>,
    /// Element id of the reply currently streaming.
    streaming: Option<String>,
    /// At most one usage warning per session.
    usage_warning_shown: bool,
}

impl ChatService {
    /// Build the service and show the active conversation, if any.
    pub fn new(
        ai: Arc<AiService>,
        store: Arc<LocalStore>,
        conversations: ConversationStore,
        usage: UsageTracker,
    ) -> Self {
        let config = QuireConfig::load(&store);
        let mut service = Self {
            ai,
            store,
            conversations,
            usage,
            config,
            log: ChatLog::new(),
            composer: Composer::new(),
            conversation_id: None,
            streaming: None,
            usage_warning_shown: false,
        };
        if let Some(active) = service.conversations.active() {
            service.log.render_history(&active);
            service.conversation_id = Some(active.id);
        }
        service.check_usage();
        service
    }

    // -- Accessors ----------------------------------------------------------

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn config(&self) -> &QuireConfig {
        &self.config
    }

    pub fn ai(&self) -> &AiService {
        &self.ai
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn current_model(&self) -> &str {
        &self.config.active_model.model
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.conversations.list()
    }

    pub fn search_conversations(&self, query: &str) -> Vec<ConversationSummary> {
        self.conversations.search(query)
    }

    pub fn current_conversation(&self) -> Option<Conversation> {
        self.conversation_id
            .as_deref()
            .and_then(|id| self.conversations.get(id))
    }

    pub fn usage(&self) -> Result<UsageCounters, QuireError> {
        self.usage.snapshot().map_err(|e| classify_error(&e))
    }

    pub fn formatted_reset_time(&self) -> Result<String, QuireError> {
        self.usage.formatted_reset_time().map_err(|e| classify_error(&e))
    }

    /// Re-read settings from the store after they changed elsewhere.
    pub fn reload_config(&mut self) {
        self.config = QuireConfig::load(&self.store);
        self.check_usage();
    }

    // -- Model selection ----------------------------------------------------

    /// Make `model` the active model. Unknown models are refused.
    pub fn select_model(&mut self, model: &str) -> Result<(), QuireError> {
        let info = self
            .ai
            .find_model(model)
            .ok_or_else(|| QuireError::Config(format!("Model not available: {model}")))?;
        self.config
            .set_active_model(&self.store, info.provider.id(), &info.id)
            .map_err(|e| classify_error(&e))?;
        self.check_usage();
        Ok(())
    }

    // -- Conversations ------------------------------------------------------

    /// Clear the view. The conversation itself is created on the first send.
    pub fn new_chat(&mut self) {
        self.conversation_id = None;
        self.log.clear();
        self.check_usage();
    }

    pub fn open_conversation(&mut self, id: &str) -> Result<(), QuireError> {
        let conversation = self
            .conversations
            .get(id)
            .ok_or_else(|| QuireError::Internal(format!("Conversation {id} not found")))?;
        self.conversations
            .set_active(id)
            .map_err(|e| classify_error(&e))?;
        self.log.render_history(&conversation);
        self.conversation_id = Some(conversation.id);
        info!(
            "Opened conversation {id} ({} messages)",
            conversation.messages.len()
        );
        Ok(())
    }

    /// Delete a conversation. Deleting the one on screen switches to the
    /// store's new active conversation, or to a fresh chat.
    pub fn delete_conversation(&mut self, id: &str) -> Result<bool, QuireError> {
        let deleted = self
            .conversations
            .delete(id)
            .map_err(|e| classify_error(&e))?;
        if deleted && self.conversation_id.as_deref() == Some(id) {
            match self.conversations.active_id() {
                Some(next) => self.open_conversation(&next)?,
                None => self.new_chat(),
            }
        }
        Ok(deleted)
    }

    // -- Sending ------------------------------------------------------------

    /// Take the composer's content and send it.
    pub async fn send_composed<F>(
        &mut self,
        cancel: CancelHandle,
        on_update: F,
    ) -> Result<ReplyOutcome, QuireError>
    where
        F: FnMut(&ChatLog, &str),
    {
        if self.streaming.is_some() {
            return Err(QuireError::Busy);
        }
        let submission = self
            .composer
            .take_submission()
            .ok_or(QuireError::EmptySubmission)?;
        self.send(submission, cancel, on_update).await
    }

    /// Send a submission and stream the reply into the log. `on_update`
    /// sees the log and the cumulative formatted text after every
    /// increment.
    pub async fn send<F>(
        &mut self,
        submission: Submission,
        cancel: CancelHandle,
        mut on_update: F,
    ) -> Result<ReplyOutcome, QuireError>
    where
        F: FnMut(&ChatLog, &str),
    {
        let pending = self.begin_submission(submission, cancel)?;
        let ai = Arc::clone(&self.ai);

        let result = match ai
            .stream_completion(&pending.request, pending.cancel.clone())
            .await
        {
            Ok(stream) => {
                stream
                    .collect_with(|text| {
                        self.log.update_bot(&pending.element_id, text);
                        on_update(&self.log, text);
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        self.finish_reply(pending, result)
    }

    /// Resend the submission held by a retryable error element.
    pub async fn retry<F>(
        &mut self,
        element_id: &str,
        cancel: CancelHandle,
        on_update: F,
    ) -> Result<ReplyOutcome, QuireError>
    where
        F: FnMut(&ChatLog, &str),
    {
        if self.streaming.is_some() {
            return Err(QuireError::Busy);
        }
        let submission = self
            .log
            .take_retry(element_id)
            .ok_or_else(|| QuireError::Internal("Nothing to retry".into()))?;
        info!("Retrying message");
        self.send(submission, cancel, on_update).await
    }

    /// Validate a submission, persist the user message and add the user
    /// and placeholder elements. Nothing is sent over the network here.
    pub fn begin_submission(
        &mut self,
        submission: Submission,
        cancel: CancelHandle,
    ) -> Result<PendingReply, QuireError> {
        if self.streaming.is_some() {
            return Err(QuireError::Busy);
        }
        if submission.is_empty() {
            return Err(QuireError::EmptySubmission);
        }

        let model = self.current_model().to_string();
        let tier = self.ai.model_tier(&model);
        if self
            .usage
            .is_limit_reached(tier)
            .map_err(|e| classify_error(&e))?
        {
            let err = QuireError::UsageLimit { tier };
            self.composer.disable(err.user_message());
            self.log.push_error(&err);
            warn!("{tier} usage limit reached; not sending");
            return Err(err);
        }

        let text = submission.text.trim().to_string();
        self.log.push_user(&text, &submission.attachments);

        let (conversation, history) = match self.persist_user_message(&model, &submission, &text) {
            Ok(saved) => saved,
            Err(err) => {
                self.log.push_error(&err);
                return Err(err);
            }
        };

        let element_id = self.log.push_bot_placeholder();
        self.streaming = Some(element_id.clone());
        self.composer.lock();

        let is_reasoning = self.ai.find_model(&model).is_some_and(|m| m.is_reasoning);
        let request = CompletionRequest {
            model: model.clone(),
            message: text,
            history,
            options: CompletionOptions {
                temperature: Some(self.config.temperature),
                max_tokens: Some(self.config.max_tokens),
                system_message: self.config.user.system_message(),
                attachments: submission.attachments.clone(),
                reasoning_effort: is_reasoning.then_some(self.config.reasoning_effort),
            },
        };

        info!(
            "Sending message (model={model}, attachments={})",
            submission.attachments.len()
        );
        Ok(PendingReply {
            element_id,
            conversation_id: conversation.id,
            request,
            tier,
            cancel,
            submission,
        })
    }

    /// Append the user message to the current conversation, creating it
    /// first if needed. Returns the conversation and the history that
    /// precedes the new message.
    fn persist_user_message(
        &mut self,
        model: &str,
        submission: &Submission,
        text: &str,
    ) -> Result<(Conversation, Vec<ChatMessage>), QuireError> {
        let existing = self
            .conversation_id
            .as_deref()
            .and_then(|id| self.conversations.get(id));
        let conversation = match existing {
            Some(c) => c,
            None => {
                let created = self
                    .conversations
                    .create(model)
                    .map_err(|e| classify_error(&e))?;
                self.conversation_id = Some(created.id.clone());
                created
            }
        };

        let history = conversation
            .messages
            .iter()
            .map(|m| ChatMessage::new(MessageRole::from_stored(&m.role), m.text()))
            .collect();

        let refs = submission.attachments.iter().map(|a| a.to_ref()).collect();
        let updated = self
            .conversations
            .append_message(&conversation.id, StoredMessage::user(text, refs))
            .map_err(|e| classify_error(&e))?;
        Ok((updated, history))
    }

    /// Finalize a reply: persist it, count usage and reveal the copy control
    /// on success; turn the element into an error otherwise.
    pub fn finish_reply(
        &mut self,
        pending: PendingReply,
        result: Result<CompletionResult, ProviderError>,
    ) -> Result<ReplyOutcome, QuireError> {
        self.streaming = None;

        let outcome = match result {
            Ok(done) => self.finalize_success(&pending, done),
            Err(e) => {
                let err = QuireError::from(e);
                error!("Completion failed: {err}");
                self.log
                    .fail_bot(&pending.element_id, &err, Some(pending.submission.clone()));
                Err(err)
            }
        };

        self.check_usage();
        outcome
    }

    fn finalize_success(
        &mut self,
        pending: &PendingReply,
        done: CompletionResult,
    ) -> Result<ReplyOutcome, QuireError> {
        let outcome = ReplyOutcome {
            element_id: pending.element_id.clone(),
            conversation_id: pending.conversation_id.clone(),
            text: done.text.clone(),
            model: done.model.clone(),
            finish: done.finish,
        };

        if done.finish == FinishReason::Cancelled && done.text.is_empty() {
            self.log.remove(&pending.element_id);
            info!("Reply cancelled before any text arrived");
            return Ok(outcome);
        }

        self.log.finish_bot(&pending.element_id, &done.text);

        let stored = StoredMessage::assistant(&done.text, &done.model);
        if let Err(e) = self
            .conversations
            .append_message(&pending.conversation_id, stored)
        {
            let err = classify_error(&e);
            warn!("Failed to save reply: {e:#}");
            self.log.push_error(&err);
            return Err(err);
        }

        if done.finish == FinishReason::Cancelled {
            info!("Reply cancelled; kept {} chars", done.text.len());
            return Ok(outcome);
        }

        if let Err(e) = self.usage.record(pending.tier) {
            warn!("Failed to record usage: {e:#}");
        }
        info!("Reply finished ({:?}, {} chars)", done.finish, done.text.len());
        Ok(outcome)
    }

    // -- Usage --------------------------------------------------------------

    fn current_tier(&self) -> UsageTier {
        self.ai.model_tier(self.current_model())
    }

    /// Warn once per session when the current model's tier is at or above
    /// the warning threshold, and disable the composer at the limit.
    pub fn check_usage(&mut self) {
        let tier = self.current_tier();
        let counters = match self.usage.snapshot() {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not read usage counters: {e:#}");
                return;
            }
        };

        match counters.status(tier) {
            UsageStatus::LimitReached => {
                self.composer
                    .disable(QuireError::UsageLimit { tier }.user_message());
            }
            UsageStatus::Warning { used, limit } => {
                if !self.usage_warning_shown {
                    let reset = quire_core::usage::format_reset_time(counters.reset_at);
                    self.log.push_usage_warning(tier, used, limit, &reset);
                    self.usage_warning_shown = true;
                }
                if self.streaming.is_none() && self.composer.is_disabled() {
                    self.composer.enable();
                }
            }
            UsageStatus::Ok => {
                if self.streaming.is_none() && self.composer.is_disabled() {
                    self.composer.enable();
                }
            }
        }
    }

    // -- Copy controls ------------------------------------------------------

    /// Copy a finished message's text. Returns `false` if the message has
    /// no visible copy control.
    pub fn copy_message(
        &self,
        element_id: &str,
        clipboard: &mut dyn Clipboard,
    ) -> anyhow::Result<bool> {
        match self.log.copy_message_text(element_id) {
            Some(text) => {
                clipboard.set_text(&text)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn copy_code(
        &self,
        element_id: &str,
        index: usize,
        clipboard: &mut dyn Clipboard,
    ) -> anyhow::Result<bool> {
        match self.log.copy_code(element_id, index) {
            Some(code) => {
                clipboard.set_text(&code)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn toggle_code_collapse(&mut self, element_id: &str, index: usize) -> Option<bool> {
        self.log.toggle_code_collapse(element_id, index)
    }

    pub fn dismiss_warning(&mut self, element_id: &str) -> bool {
        self.log.dismiss(element_id)
    }
}
