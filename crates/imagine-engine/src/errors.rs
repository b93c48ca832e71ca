//! Backend failure taxonomy.
//!
//! Raw backend failures are normalized once into an [`ErrorTriple`] at the
//! backend boundary and classified into an [`ApiError`]. Nothing downstream
//! re-parses error text.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorTriple {
    pub code: Option<u16>,
    pub status: Option<String>,
    pub message: String,
}

impl ErrorTriple {
    /// Builds a triple from a non-success HTTP response.
    pub fn from_http(status_code: u16, body: &str) -> Self {
        let mut triple = Self::from_raw_message(body);
        if triple.code.is_none() {
            triple.code = Some(status_code);
        }
        if triple.message.trim().is_empty() {
            triple.message = format!("HTTP {status_code}");
        }
        triple
    }

    /// Extracts `{"error": {"code", "status", "message"}}` when the text
    /// embeds it; otherwise keeps the text verbatim as the message.
    pub fn from_raw_message(raw: &str) -> Self {
        let fallback = Self {
            code: None,
            status: None,
            message: raw.to_string(),
        };
        let Some(start) = raw.find('{') else {
            return fallback;
        };
        let Ok(parsed) = serde_json::from_str::<Value>(&raw[start..]) else {
            return fallback;
        };
        let Some(error) = parsed.get("error").and_then(Value::as_object) else {
            return fallback;
        };

        let code = error
            .get("code")
            .and_then(|value| match value {
                Value::Number(number) => number.as_u64(),
                Value::String(text) => text.trim().parse::<u64>().ok(),
                _ => None,
            })
            .and_then(|code| u16::try_from(code).ok());
        let reason = error
            .get("details")
            .and_then(Value::as_array)
            .and_then(|details| {
                details
                    .iter()
                    .find_map(|detail| detail.get("reason").and_then(Value::as_str))
            });
        let status = reason
            .or_else(|| error.get("status").and_then(Value::as_str))
            .map(str::to_string);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(error.clone()).to_string());

        Self {
            code,
            status,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    MissingCredential,
    QuotaExceeded,
    AuthRejected,
    BackendOverloaded,
    Unclassified,
}

impl ApiKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiKind::MissingCredential => "missing_credential",
            ApiKind::QuotaExceeded => "quota_exceeded",
            ApiKind::AuthRejected => "auth_rejected",
            ApiKind::BackendOverloaded => "backend_overloaded",
            ApiKind::Unclassified => "unclassified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("API key missing: set API_KEY (or GEMINI_API_KEY / GOOGLE_API_KEY) before generating")]
    MissingCredential,
    #[error("quota exceeded (429): the backend is throttling this key, retry after a short wait. Details: {message}")]
    QuotaExceeded { message: String },
    #[error("credential rejected (403): invalid key or permission denied. Details: {message}")]
    AuthRejected { message: String },
    #[error("backend overloaded (503): the model is busy, try again in a moment. Details: {message}")]
    BackendOverloaded { message: String },
    #[error("API error: {message}")]
    Unclassified { message: String },
}

impl ApiError {
    pub fn unclassified(message: impl Into<String>) -> Self {
        ApiError::Unclassified {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ApiKind {
        match self {
            ApiError::MissingCredential => ApiKind::MissingCredential,
            ApiError::QuotaExceeded { .. } => ApiKind::QuotaExceeded,
            ApiError::AuthRejected { .. } => ApiKind::AuthRejected,
            ApiError::BackendOverloaded { .. } => ApiKind::BackendOverloaded,
            ApiError::Unclassified { .. } => ApiKind::Unclassified,
        }
    }

    /// Retrying by hand may succeed later. Nothing retries automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::QuotaExceeded { .. } | ApiError::BackendOverloaded { .. }
        )
    }

    /// The backend's own message, where there is one.
    pub fn backend_message(&self) -> &str {
        match self {
            ApiError::MissingCredential => "",
            ApiError::QuotaExceeded { message }
            | ApiError::AuthRejected { message }
            | ApiError::BackendOverloaded { message }
            | ApiError::Unclassified { message } => message,
        }
    }

    /// Finds a classified error anywhere in an `anyhow` chain.
    pub fn find(err: &anyhow::Error) -> Option<&ApiError> {
        err.chain().find_map(|cause| cause.downcast_ref::<ApiError>())
    }
}

pub fn classify(triple: &ErrorTriple) -> ApiError {
    let message = triple.message.clone();
    let status = triple
        .status
        .as_deref()
        .unwrap_or_default()
        .to_ascii_uppercase();
    let text = triple.message.as_str();

    if triple.code == Some(429)
        || status == "RESOURCE_EXHAUSTED"
        || status == "RATE_LIMIT_EXCEEDED"
        || text.contains("429")
        || text.contains("RESOURCE_EXHAUSTED")
    {
        return ApiError::QuotaExceeded { message };
    }

    if matches!(triple.code, Some(401 | 403))
        || matches!(
            status.as_str(),
            "PERMISSION_DENIED" | "UNAUTHENTICATED" | "API_KEY_INVALID"
        )
        || text.contains("API_KEY_INVALID")
        || text.contains("API Key not found")
        || text.contains("API key not valid")
        || text.contains("403")
    {
        return ApiError::AuthRejected { message };
    }

    if triple.code == Some(503)
        || status == "UNAVAILABLE"
        || text.contains("503")
        || text.to_ascii_lowercase().contains("overloaded")
    {
        return ApiError::BackendOverloaded { message };
    }

    ApiError::Unclassified { message }
}
