//! The one remote operation the tool needs: "generate content".
//!
//! A request is a model id, an ordered list of text and inline-image parts,
//! and an optional image output configuration. Failures leave this module
//! already classified.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use imagine_contracts::options::AspectRatio;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::errors::{classify, ApiError, ErrorTriple};
use crate::prompts::ANALYSIS_DELIMITER;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Base64 body without any data-URI header.
    InlineImage { mime_type: String, data: String },
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        ContentPart::Text(value.into())
    }

    fn to_json(&self) -> Value {
        match self {
            ContentPart::Text(text) => json!({ "text": text }),
            ContentPart::InlineImage { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": data,
                }
            }),
        }
    }

    fn from_json(part: &Value) -> Option<Self> {
        if let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        {
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                return None;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            return Some(ContentPart::InlineImage {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            });
        }
        part.get("text")
            .and_then(Value::as_str)
            .map(|text| ContentPart::Text(text.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
    /// Set for image-producing calls only.
    pub aspect_ratio: Option<AspectRatio>,
}

impl ContentRequest {
    pub fn to_payload(&self) -> Value {
        let parts = self.parts.iter().map(ContentPart::to_json).collect::<Vec<_>>();
        let mut payload = Map::new();
        payload.insert("contents".to_string(), json!([{ "parts": parts }]));
        if let Some(aspect_ratio) = self.aspect_ratio {
            payload.insert(
                "generationConfig".to_string(),
                json!({ "imageConfig": { "aspectRatio": aspect_ratio.as_str() } }),
            );
        }
        Value::Object(payload)
    }

    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, ContentPart::InlineImage { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentResponse {
    pub parts: Vec<ContentPart>,
}

impl ContentResponse {
    /// Reads the first candidate only.
    pub fn from_payload(payload: &Value) -> Self {
        let parts = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| parts.iter().filter_map(ContentPart::from_json).collect())
            .unwrap_or_default();
        Self { parts }
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::InlineImage { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Base64 bodies of every inline image, in response order.
    pub fn images(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::InlineImage { data, .. } => Some(data.as_str()),
                ContentPart::Text(_) => None,
            })
            .collect()
    }
}

pub trait Backend: Send + Sync {
    fn name(&self) -> &str;
    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse, ApiError>;
}

pub struct GeminiBackend {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse, ApiError> {
        let endpoint = self.endpoint_for_model(&request.model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request.to_payload())
            .send()
            .map_err(|err| {
                // The URL carries the key as a query parameter.
                let err = anyhow::Error::new(err.without_url())
                    .context(format!("Gemini request failed ({endpoint})"));
                ApiError::unclassified(error_chain_text(&err, 2000))
            })?;

        let status = response.status();
        let body = response.text().map_err(|err| {
            let err = anyhow::Error::new(err.without_url())
                .context("Gemini response body unreadable");
            ApiError::unclassified(error_chain_text(&err, 2000))
        })?;
        if !status.is_success() {
            return Err(classify(&ErrorTriple::from_http(status.as_u16(), &body)));
        }
        let payload: Value = serde_json::from_str(&body).map_err(|err| {
            ApiError::unclassified(format!("Gemini returned invalid JSON: {err}"))
        })?;
        if payload.get("error").is_some() {
            return Err(classify(&ErrorTriple::from_raw_message(&body)));
        }
        Ok(ContentResponse::from_payload(&payload))
    }
}

/// Offline backend. Image calls return one solid-color PNG whose color is
/// derived from the request text; text calls answer without the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunBackend;

impl DryrunBackend {
    const LONG_SIDE: u32 = 512;

    fn dimensions(aspect_ratio: AspectRatio) -> (u32, u32) {
        let ratio = aspect_ratio.ratio();
        if ratio >= 1.0 {
            let height = (Self::LONG_SIDE as f64 / ratio).round() as u32;
            (Self::LONG_SIDE, height.max(1))
        } else {
            let width = (Self::LONG_SIDE as f64 * ratio).round() as u32;
            (width.max(1), Self::LONG_SIDE)
        }
    }
}

impl Backend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse, ApiError> {
        let prompt = request
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::InlineImage { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let Some(aspect_ratio) = request.aspect_ratio else {
            let text = if request.has_image() {
                format!(
                    "[Dryrun description of the attached image, {} parts]\n{ANALYSIS_DELIMITER}\n[blurry, low resolution]",
                    request.parts.len()
                )
            } else {
                "Connected".to_string()
            };
            return Ok(ContentResponse {
                parts: vec![ContentPart::Text(text)],
            });
        };

        let (width, height) = Self::dimensions(aspect_ratio);
        let (r, g, b) = color_from_prompt(&prompt);
        let image = RgbImage::from_pixel(width, height, Rgb([r, g, b]));
        let mut encoded = Cursor::new(Vec::new());
        image
            .write_to(&mut encoded, ImageFormat::Png)
            .map_err(|err| ApiError::unclassified(format!("dryrun image encode failed: {err}")))?;
        Ok(ContentResponse {
            parts: vec![ContentPart::InlineImage {
                mime_type: "image/png".to_string(),
                data: BASE64.encode(encoded.into_inner()),
            }],
        })
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out = value.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_uri::{image_dimensions, png_data_uri};

    #[test]
    fn request_payload_carries_parts_in_order_and_image_config() {
        let request = ContentRequest {
            model: "gemini-2.5-flash-image".to_string(),
            parts: vec![
                ContentPart::text("draw a fox"),
                ContentPart::InlineImage {
                    mime_type: "image/png".to_string(),
                    data: "QUJD".to_string(),
                },
            ],
            aspect_ratio: Some(AspectRatio::Portrait9x16),
        };
        let payload = request.to_payload();
        assert_eq!(payload["contents"][0]["parts"][0]["text"], "draw a fox");
        assert_eq!(
            payload["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(
            payload["generationConfig"]["imageConfig"]["aspectRatio"],
            "9:16"
        );

        let text_only = ContentRequest {
            aspect_ratio: None,
            ..request
        };
        assert!(text_only.to_payload().get("generationConfig").is_none());
    }

    #[test]
    fn response_reads_first_candidate_parts() {
        let payload = json!({
            "candidates": [
                {"content": {"parts": [
                    {"text": "here you go"},
                    {"inlineData": {"mimeType": "image/png", "data": "AAA"}},
                    {"inline_data": {"mime_type": "image/jpeg", "data": "BBB"}},
                    {"inlineData": {"data": ""}}
                ]}},
                {"content": {"parts": [{"inlineData": {"data": "CCC"}}]}}
            ]
        });
        let response = ContentResponse::from_payload(&payload);
        assert_eq!(response.text(), "here you go");
        assert_eq!(response.images(), vec!["AAA", "BBB"]);

        let empty = ContentResponse::from_payload(&json!({}));
        assert!(empty.parts.is_empty());
    }

    #[test]
    fn endpoint_accepts_bare_and_prefixed_model_names() {
        let backend = GeminiBackend::new("https://example.test/v1beta/", "key");
        assert_eq!(
            backend.endpoint_for_model("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            backend.endpoint_for_model("models/gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn dryrun_images_follow_aspect_ratio_and_prompt() -> anyhow::Result<()> {
        let request = |text: &str| ContentRequest {
            model: "dryrun-image-1".to_string(),
            parts: vec![ContentPart::text(text)],
            aspect_ratio: Some(AspectRatio::Portrait9x16),
        };
        let first = DryrunBackend.generate_content(&request("a red kite"))?;
        let again = DryrunBackend.generate_content(&request("a red kite"))?;
        let other = DryrunBackend.generate_content(&request("a blue kite"))?;
        assert_eq!(first, again);
        assert_ne!(first, other);

        let image = png_data_uri(first.images()[0]);
        assert_eq!(image_dimensions(&image), Some((288, 512)));
        Ok(())
    }

    #[test]
    fn dryrun_text_answers_split_analysis_for_images() -> anyhow::Result<()> {
        let ping = DryrunBackend.generate_content(&ContentRequest {
            model: "dryrun-vision-1".to_string(),
            parts: vec![ContentPart::text("say connected")],
            aspect_ratio: None,
        })?;
        assert_eq!(ping.text(), "Connected");

        let analysis = DryrunBackend.generate_content(&ContentRequest {
            model: "dryrun-vision-1".to_string(),
            parts: vec![
                ContentPart::InlineImage {
                    mime_type: "image/png".to_string(),
                    data: "QUJD".to_string(),
                },
                ContentPart::text("describe"),
            ],
            aspect_ratio: None,
        })?;
        assert!(analysis.text().contains(ANALYSIS_DELIMITER));
        Ok(())
    }

    #[test]
    fn error_chain_text_preserves_nested_contexts() {
        let err = anyhow::anyhow!("socket closed")
            .context("Gemini request failed (https://example.test)");
        assert_eq!(
            error_chain_text(&err, 512),
            "Gemini request failed (https://example.test) | caused by: socket closed"
        );
        assert_eq!(truncate_text("abcdef", 3), "abc...");
    }
}
