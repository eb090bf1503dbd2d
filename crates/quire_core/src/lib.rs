pub mod config;
pub mod conversations;
pub mod error_handler;
pub mod logging;
pub mod storage;
pub mod usage;

pub use config::{ActiveModel, QuireConfig, ReasoningEffort, Theme, UserPreferences, VisualPreferences};
pub use conversations::{
    AttachmentRef, Conversation, ConversationStore, ConversationSummary, StoredContent,
    StoredMessage, format_relative_date, generate_title,
};
pub use error_handler::{ErrorCategory, QuireError, classify_error};
pub use storage::{LocalStore, StorageError};
pub use usage::{UsageCounters, UsageStatus, UsageTier, UsageTracker};
