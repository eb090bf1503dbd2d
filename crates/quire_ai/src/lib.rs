pub mod formatting;
pub mod model_registry;
pub mod providers;
pub mod service;
pub mod stream;
pub mod types;

// Re-export core types at crate root for convenience.
pub use formatting::format_api_response;
pub use providers::{AiProvider, ProviderError};
pub use service::{AiService, AiServiceConfig, ProviderModels};
pub use stream::{CancelHandle, CompletionStream, StreamBuffer, StreamEvent};
pub use types::*;
