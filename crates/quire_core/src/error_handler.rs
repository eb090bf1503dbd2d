use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageError;
use crate::usage::UsageTier;

pub const STORAGE_LIMIT_MESSAGE: &str =
    "Storage limit reached. Please delete some older conversations to continue.";
pub const PREMIUM_LIMIT_MESSAGE: &str = "You've reached your premium message limit. Please try a standard model or wait until your usage resets.";
pub const STANDARD_LIMIT_MESSAGE: &str =
    "You've reached your message limit for this period. Please wait until your usage resets.";

/// Top-level application error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuireError {
    /// Missing credential or invalid setting.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP or network failure talking to a provider.
    #[error("{0}")]
    Transport(String),

    #[error("{tier} message limit reached")]
    UsageLimit { tier: UsageTier },

    #[error("Storage quota exceeded")]
    StorageQuota,

    #[error("Nothing to send")]
    EmptySubmission,

    #[error("A response is already streaming")]
    Busy,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classification of errors for logging and user display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Invalid or missing configuration.
    Configuration,
    /// Network connectivity or provider HTTP failure.
    Transport,
    /// The user exhausted a usage tier.
    UsageLimit,
    /// Local storage is full.
    Storage,
    /// The request was rejected before it was sent.
    Input,
    Internal,
}

impl QuireError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::UsageLimit { .. } => ErrorCategory::UsageLimit,
            Self::StorageQuota => ErrorCategory::Storage,
            Self::EmptySubmission | Self::Busy => ErrorCategory::Input,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Only transport failures are worth resubmitting unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Text shown inside the conversation for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => msg.clone(),
            Self::Transport(msg) => msg.clone(),
            Self::UsageLimit { tier: UsageTier::Premium } => PREMIUM_LIMIT_MESSAGE.into(),
            Self::UsageLimit { tier: UsageTier::Standard } => STANDARD_LIMIT_MESSAGE.into(),
            Self::StorageQuota => STORAGE_LIMIT_MESSAGE.into(),
            Self::EmptySubmission => "Type a message or attach a file first.".into(),
            Self::Busy => "Please wait for the current response to finish.".into(),
            Self::Internal(_) => "An unexpected error occurred.".into(),
        }
    }
}

impl From<StorageError> for QuireError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::QuotaExceeded { .. } => Self::StorageQuota,
            StorageError::Io(msg) => Self::Internal(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Error classification for anyhow::Error
// ---------------------------------------------------------------------------

/// Map an arbitrary `anyhow::Error` onto the taxonomy. Known error types
/// anywhere in the chain win; otherwise the message is matched against
/// known patterns.
pub fn classify_error(error: &anyhow::Error) -> QuireError {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<QuireError>() {
            return e.clone();
        }
        if let Some(StorageError::QuotaExceeded { .. }) = cause.downcast_ref::<StorageError>() {
            return QuireError::StorageQuota;
        }
    }

    let msg = error.to_string();
    let lower = msg.to_lowercase();

    if lower.contains("quota") {
        QuireError::StorageQuota
    } else if lower.contains("premium message limit") {
        QuireError::UsageLimit { tier: UsageTier::Premium }
    } else if lower.contains("message limit") {
        QuireError::UsageLimit { tier: UsageTier::Standard }
    } else if lower.contains("api key") || lower.contains("config") {
        QuireError::Config(msg)
    } else if lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("dns")
        || lower.contains("api error")
    {
        QuireError::Transport(msg)
    } else {
        QuireError::Internal(msg)
    }
}
