use std::env;
use std::path::PathBuf;

use crate::credentials::{raw_credential_from_env, CredentialStatus};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_DATA_DIR: &str = ".imagine";

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Raw key as configured; may be malformed.
    pub api_key: Option<String>,
    pub api_base: String,
    pub image_model: Option<String>,
    pub text_model: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: None,
            text_model: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: raw_credential_from_env(),
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            image_model: non_empty_env("IMAGINE_IMAGE_MODEL"),
            text_model: non_empty_env("IMAGINE_TEXT_MODEL"),
        }
    }

    pub fn with_models(mut self, image_model: Option<String>, text_model: Option<String>) -> Self {
        if image_model.is_some() {
            self.image_model = image_model;
        }
        if text_model.is_some() {
            self.text_model = text_model;
        }
        self
    }

    pub fn credential_status(&self) -> CredentialStatus {
        CredentialStatus::inspect(self.api_key.as_deref())
    }

    /// Key as sent on the wire.
    pub fn api_key_trimmed(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

pub fn data_dir_from_env() -> PathBuf {
    non_empty_env("IMAGINE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
