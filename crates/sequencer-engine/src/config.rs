use std::env;
use std::time::Duration;

use sequencer_contracts::EditError;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_FAL_QUEUE_BASE: &str = "https://queue.fal.run";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_SUGGEST_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_QUEUE_MODEL: &str = "fal-ai/flux-pro/kontext/max";

const GEMINI_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "API_KEY", "GOOGLE_API_KEY"];
const FAL_KEY_VARS: [&str; 2] = ["FAL_KEY", "FAL_API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: String,
    pub edit_model: String,
    pub suggest_model: String,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn from_env() -> Result<Self, EditError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EditError> {
        let api_key = first_non_empty(&lookup, &GEMINI_KEY_VARS)
            .ok_or_else(|| EditError::MissingApiKey(GEMINI_KEY_VARS.join(" or ")))?;
        Ok(Self {
            api_base: base_url(&lookup, "GEMINI_API_BASE", DEFAULT_GEMINI_API_BASE),
            api_key,
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            suggest_model: DEFAULT_SUGGEST_MODEL.to_string(),
            request_timeout: Duration::from_secs(120),
        })
    }

    pub fn with_edit_model(mut self, model: impl Into<String>) -> Self {
        self.edit_model = model.into();
        self
    }

    pub fn with_suggest_model(mut self, model: impl Into<String>) -> Self {
        self.suggest_model = model.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FalConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl FalConfig {
    pub fn from_env() -> Result<Self, EditError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EditError> {
        let api_key = first_non_empty(&lookup, &FAL_KEY_VARS)
            .ok_or_else(|| EditError::MissingApiKey(FAL_KEY_VARS.join(" or ")))?;
        Ok(Self {
            base_url: base_url(&lookup, "FAL_QUEUE_BASE", DEFAULT_FAL_QUEUE_BASE),
            api_key,
            request_timeout: Duration::from_secs(60),
        })
    }
}

fn first_non_empty(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn base_url(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
