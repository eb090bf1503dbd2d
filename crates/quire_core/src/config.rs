use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::storage::LocalStore;

// Storage keys. Kept stable so existing stores keep loading.
pub const KEY_OPENAI_API_KEY: &str = "openai_api_key";
pub const KEY_ACTIVE_MODEL: &str = "active_model";
pub const KEY_TEMPERATURE: &str = "temperature";
pub const KEY_MAX_TOKENS: &str = "max_tokens";
pub const KEY_REASONING_EFFORT: &str = "reasoning_effort";
pub const KEY_THEME: &str = "theme";
pub const KEY_VISUAL_PREFERENCES: &str = "visual_preferences";
pub const KEY_USER_PREFERENCES: &str = "user_preferences";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const MAX_TOKENS_CEILING: u32 = 1_000_000;

// ---------------------------------------------------------------------------
// Setting value types
// ---------------------------------------------------------------------------

/// How hard a reasoning model should think before answering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningEffort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => bail!("Unknown reasoning effort '{other}' (expected low, medium or high)"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

/// The provider + model pair the composer sends to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveModel {
    pub provider: String,
    pub model: String,
}

impl Default for ActiveModel {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4.1-mini".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisualPreferences {
    pub boring_theme: bool,
    pub hide_personal_info: bool,
    pub main_font: String,
    pub code_font: String,
}

impl Default for VisualPreferences {
    fn default() -> Self {
        Self {
            boring_theme: false,
            hide_personal_info: false,
            main_font: "Inter".into(),
            code_font: "Fira Code".into(),
        }
    }
}

/// Free-form customization the user gives about themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserPreferences {
    pub name: String,
    pub occupation: String,
    pub traits: String,
    pub additional_info: String,
}

impl UserPreferences {
    /// Compose a system message from the non-empty fields, or `None` when
    /// the user has not customized anything.
    pub fn system_message(&self) -> Option<String> {
        let mut lines = Vec::new();
        if !self.name.trim().is_empty() {
            lines.push(format!("The user's name is {}.", self.name.trim()));
        }
        if !self.occupation.trim().is_empty() {
            lines.push(format!("The user works as: {}.", self.occupation.trim()));
        }
        if !self.traits.trim().is_empty() {
            lines.push(format!("Respond with these traits: {}.", self.traits.trim()));
        }
        if !self.additional_info.trim().is_empty() {
            lines.push(format!("Additional context: {}", self.additional_info.trim()));
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

// ---------------------------------------------------------------------------
// QuireConfig
// ---------------------------------------------------------------------------

/// Typed view over the settings kept in the [`LocalStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuireConfig {
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    pub active_model: ActiveModel,
    pub temperature: f32,
    pub max_tokens: u32,
    pub reasoning_effort: ReasoningEffort,
    pub theme: Theme,
    pub visual: VisualPreferences,
    pub user: UserPreferences,
}

impl Default for QuireConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            active_model: ActiveModel::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            reasoning_effort: ReasoningEffort::default(),
            theme: Theme::default(),
            visual: VisualPreferences::default(),
            user: UserPreferences::default(),
        }
    }
}

impl QuireConfig {
    /// Returns the base directory: `~/.quire/`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".quire"))
    }

    /// Returns the key-value store path: `~/.quire/storage.json`
    pub fn storage_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("storage.json"))
    }

    /// Returns the logs directory: `~/.quire/logs/`
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    /// Ensures all required directories exist.
    pub fn ensure_dirs() -> Result<()> {
        for dir in [Self::base_dir()?, Self::logs_dir()?] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Read every setting from `store`. Missing or malformed values fall
    /// back to their defaults.
    pub fn load(store: &LocalStore) -> Self {
        let defaults = Self::default();

        let openai_api_key = store
            .get(KEY_OPENAI_API_KEY)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let temperature = match store.get(KEY_TEMPERATURE) {
            Some(raw) => match raw.trim().parse::<f32>() {
                Ok(t) if validate_temperature(t).is_ok() => t,
                _ => {
                    warn!("Ignoring stored temperature '{raw}'");
                    defaults.temperature
                }
            },
            None => defaults.temperature,
        };

        let max_tokens = match store.get(KEY_MAX_TOKENS) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if validate_max_tokens(n).is_ok() => n,
                _ => {
                    warn!("Ignoring stored max_tokens '{raw}'");
                    defaults.max_tokens
                }
            },
            None => defaults.max_tokens,
        };

        let reasoning_effort = match store.get(KEY_REASONING_EFFORT) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{e}");
                defaults.reasoning_effort
            }),
            None => defaults.reasoning_effort,
        };

        let theme = match store.get(KEY_THEME).as_deref() {
            Some("light") => Theme::Light,
            Some("dark") | None => Theme::Dark,
            Some(other) => {
                warn!("Ignoring stored theme '{other}'");
                Theme::Dark
            }
        };

        Self {
            openai_api_key,
            active_model: store.get_json(KEY_ACTIVE_MODEL).unwrap_or(defaults.active_model),
            temperature,
            max_tokens,
            reasoning_effort,
            theme,
            visual: store.get_json(KEY_VISUAL_PREFERENCES).unwrap_or(defaults.visual),
            user: store.get_json(KEY_USER_PREFERENCES).unwrap_or(defaults.user),
        }
    }

    /// Write every non-secret setting back to `store`. The API key is
    /// written separately through [`QuireConfig::set_api_key`].
    pub fn save(&self, store: &LocalStore) -> Result<()> {
        store.set_json(KEY_ACTIVE_MODEL, &self.active_model)?;
        store.set(KEY_TEMPERATURE, &self.temperature.to_string())?;
        store.set(KEY_MAX_TOKENS, &self.max_tokens.to_string())?;
        store.set(KEY_REASONING_EFFORT, self.reasoning_effort.as_str())?;
        store.set(KEY_THEME, self.theme.as_str())?;
        store.set_json(KEY_VISUAL_PREFERENCES, &self.visual)?;
        store.set_json(KEY_USER_PREFERENCES, &self.user)?;
        info!("Saved settings");
        Ok(())
    }

    /// Store (or, for an empty value, remove) the OpenAI API key.
    pub fn set_api_key(&mut self, store: &LocalStore, key: Option<&str>) -> Result<()> {
        match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(k) => {
                store.set(KEY_OPENAI_API_KEY, k)?;
                self.openai_api_key = Some(k.to_string());
                info!("OpenAI API key updated");
            }
            None => {
                store.remove(KEY_OPENAI_API_KEY)?;
                self.openai_api_key = None;
                info!("OpenAI API key removed");
            }
        }
        Ok(())
    }

    pub fn set_temperature(&mut self, store: &LocalStore, temperature: f32) -> Result<()> {
        validate_temperature(temperature)?;
        store.set(KEY_TEMPERATURE, &temperature.to_string())?;
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_max_tokens(&mut self, store: &LocalStore, max_tokens: u32) -> Result<()> {
        validate_max_tokens(max_tokens)?;
        store.set(KEY_MAX_TOKENS, &max_tokens.to_string())?;
        self.max_tokens = max_tokens;
        Ok(())
    }

    pub fn set_reasoning_effort(&mut self, store: &LocalStore, effort: ReasoningEffort) -> Result<()> {
        store.set(KEY_REASONING_EFFORT, effort.as_str())?;
        self.reasoning_effort = effort;
        Ok(())
    }

    pub fn set_active_model(&mut self, store: &LocalStore, provider: &str, model: &str) -> Result<()> {
        let active = ActiveModel {
            provider: provider.to_string(),
            model: model.to_string(),
        };
        store.set_json(KEY_ACTIVE_MODEL, &active)?;
        info!("Active model set to {provider}/{model}");
        self.active_model = active;
        Ok(())
    }

    /// Whether a credential is configured for `provider`.
    pub fn has_api_key(&self, provider: &str) -> bool {
        match provider {
            "openai" => self.openai_api_key.is_some(),
            _ => false,
        }
    }
}

pub fn validate_temperature(temperature: f32) -> Result<()> {
    if !(0.0..=2.0).contains(&temperature) {
        bail!("Temperature must be between 0.0 and 2.0, got {temperature}");
    }
    Ok(())
}

pub fn validate_max_tokens(max_tokens: u32) -> Result<()> {
    if max_tokens == 0 || max_tokens > MAX_TOKENS_CEILING {
        bail!("Max tokens must be between 1 and {MAX_TOKENS_CEILING}, got {max_tokens}");
    }
    Ok(())
}
