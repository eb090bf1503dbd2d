//! Static model catalog.
//!
//! Provides lookup helpers for model resolution by id, provider, or tier.

use once_cell::sync::Lazy;
use quire_core::usage::UsageTier;

use crate::types::{ModelInfo, ProviderKind};

fn model(
    id: &str,
    name: &str,
    description: &str,
    provider: ProviderKind,
    max_tokens: u32,
    tier: UsageTier,
) -> ModelInfo {
    ModelInfo {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        provider,
        max_tokens,
        tier,
        is_reasoning: false,
    }
}

// ---------------------------------------------------------------------------
// Registry data
// ---------------------------------------------------------------------------

/// Every model shown in the picker, in display order.
pub static MODEL_REGISTRY: Lazy<Vec<ModelInfo>> = Lazy::new(|| {
    vec![
        // ---- OpenAI ----
        model(
            "gpt-4.1",
            "GPT-4.1",
            "Advanced AI assistant with extensive reasoning and knowledge",
            ProviderKind::OpenAI,
            1_000_000,
            UsageTier::Premium,
        ),
        model(
            "gpt-4.1-mini",
            "GPT-4.1 Mini",
            "Lighter version of GPT-4.1 with improved performance over Nano for complex tasks",
            ProviderKind::OpenAI,
            32_000,
            UsageTier::Standard,
        ),
        model(
            "gpt-4o",
            "GPT-4o",
            "Optimized version of GPT-4 with improved performance",
            ProviderKind::OpenAI,
            128_000,
            UsageTier::Premium,
        ),
        ModelInfo {
            is_reasoning: true,
            ..model(
                "o4-mini",
                "o4-Mini",
                "Reasoning model with advanced problem-solving capabilities",
                ProviderKind::OpenAI,
                32_000,
                UsageTier::Premium,
            )
        },
        model(
            "gpt-4.5-preview",
            "GPT-4.5 Preview",
            "Next-generation GPT model with enhanced capabilities and improved reasoning",
            ProviderKind::OpenAI,
            200_000,
            UsageTier::Premium,
        ),
        // ---- Anthropic ----
        model(
            "claude-3-opus",
            "Claude 3 Opus",
            "Anthropic's most capable model with superior reasoning and instruction following abilities.",
            ProviderKind::Anthropic,
            200_000,
            UsageTier::Premium,
        ),
        model(
            "claude-3-sonnet",
            "Claude 3 Sonnet",
            "Balanced Claude model with strong performance and faster response times than Opus.",
            ProviderKind::Anthropic,
            200_000,
            UsageTier::Premium,
        ),
        // ---- Google ----
        model(
            "gemini-2.5-pro",
            "Gemini 2.5 Pro",
            "Google's most capable model, excelling at complex reasoning, coding, and creative generation.",
            ProviderKind::Google,
            65_000,
            UsageTier::Premium,
        ),
    ]
});

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

/// Exact id lookup.
pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    let id = id.trim();
    MODEL_REGISTRY.iter().find(|m| m.id == id)
}

/// Resolve a model by exact id or case-insensitive id/name substring.
pub fn resolve_model(input: &str) -> Option<&'static ModelInfo> {
    if let Some(m) = find_model(input) {
        return Some(m);
    }
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    MODEL_REGISTRY
        .iter()
        .find(|m| m.id.contains(&needle) || m.name.to_lowercase().contains(&needle))
}

pub fn models_for_provider(provider: ProviderKind) -> Vec<&'static ModelInfo> {
    MODEL_REGISTRY
        .iter()
        .filter(|m| m.provider == provider)
        .collect()
}

pub fn models_for_tier(tier: UsageTier) -> Vec<&'static ModelInfo> {
    MODEL_REGISTRY.iter().filter(|m| m.tier == tier).collect()
}

/// Usage tier charged for a model. Unknown ids count as standard.
pub fn model_tier(id: &str) -> UsageTier {
    find_model(id).map_or(UsageTier::Standard, |m| m.tier)
}
