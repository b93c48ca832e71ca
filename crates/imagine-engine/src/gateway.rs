//! API gateway adapter.
//!
//! Wraps the backend boundary for the four operations. Every failure is
//! classified once (at the backend) and reported here as an `api_error`
//! event before it is returned.
//!
//! Multi-image generation fans out one request per image and waits for all
//! of them. The call is fail-fast: if any sub-request fails, the first
//! failure in issue order is returned and no partial gallery is produced.

use std::sync::Arc;
use std::thread;

use imagine_contracts::events::EventWriter;
use imagine_contracts::garments::GarmentRequest;
use imagine_contracts::models::{
    ModelSelector, ModelSpec, CAPABILITY_IMAGE, CAPABILITY_VISION, PASSTHROUGH_PROVIDER,
};
use imagine_contracts::options::AspectRatio;
use imagine_contracts::panels::clamp_count;
use serde_json::json;

use crate::backend::{
    Backend, ContentPart, ContentRequest, ContentResponse, DryrunBackend, GeminiBackend,
};
use crate::config::GatewayConfig;
use crate::data_uri::png_data_uri;
use crate::errors::ApiError;
use crate::map_object;
use crate::prompts::{
    analysis_prompt, edit_prompt, generation_prompt, swap_prompt, AssembledPrompt, EditFields,
    GenerationFields, ANALYSIS_DELIMITER,
};

const CONNECTION_PROMPT: &str = "Reply with only the word \"Connected\".";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnalysisResult {
    pub positive: String,
    pub negative: String,
}

/// Splits analysis text on the delimiter. Without a delimiter the whole raw
/// text is the positive half.
pub fn parse_analysis(text: &str) -> AnalysisResult {
    let Some((positive, rest)) = text.split_once(ANALYSIS_DELIMITER) else {
        return AnalysisResult {
            positive: text.to_string(),
            negative: String::new(),
        };
    };
    let negative = rest.split(ANALYSIS_DELIMITER).next().unwrap_or_default();
    AnalysisResult {
        positive: strip_brackets(positive),
        negative: strip_brackets(negative),
    }
}

fn strip_brackets(section: &str) -> String {
    section.replace(['[', ']'], "").trim().to_string()
}

/// A backend plus the model it is called with.
#[derive(Clone)]
pub struct Route {
    pub backend: Arc<dyn Backend>,
    pub model: String,
}

impl Route {
    pub fn new(backend: Arc<dyn Backend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }
}

#[derive(Clone)]
pub struct Gateway {
    image: Route,
    vision: Route,
    events: Option<EventWriter>,
    notes: Vec<String>,
}

impl Gateway {
    pub fn new(image: Route, vision: Route) -> Self {
        Self {
            image,
            vision,
            events: None,
            notes: Vec::new(),
        }
    }

    /// Both routes on the offline backend.
    pub fn offline() -> Self {
        let backend: Arc<dyn Backend> = Arc::new(DryrunBackend);
        Self::new(
            Route::new(backend.clone(), "dryrun-image-1"),
            Route::new(backend, "dryrun-vision-1"),
        )
    }

    /// Resolves both models and builds their backends. A model served by
    /// the remote backend needs a credential; its absence fails here,
    /// before any call is attempted.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ApiError> {
        let selector = ModelSelector::new(None);
        let mut notes = Vec::new();
        let image_spec = resolve_model(
            &selector,
            config.image_model.as_deref(),
            CAPABILITY_IMAGE,
            &mut notes,
        )?;
        let vision_spec = resolve_model(
            &selector,
            config.text_model.as_deref(),
            CAPABILITY_VISION,
            &mut notes,
        )?;
        let mut gateway = Self::new(
            Route::new(backend_for(&image_spec, config)?, image_spec.name),
            Route::new(backend_for(&vision_spec, config)?, vision_spec.name),
        );
        gateway.notes = notes;
        Ok(gateway)
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn image_model(&self) -> &str {
        &self.image.model
    }

    pub fn vision_model(&self) -> &str {
        &self.vision.model
    }

    /// Model fallbacks taken while resolving the configuration.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Issues `count` independent requests in parallel, at most four.
    /// Images come back grouped by request, in issue order.
    pub fn generate(
        &self,
        fields: &GenerationFields,
        aspect_ratio: AspectRatio,
        count: u32,
    ) -> Result<Vec<String>, ApiError> {
        let prompt = generation_prompt(fields);
        let request = self.image_request(&prompt, aspect_ratio);
        let count = clamp_count(count) as usize;
        let backend = &*self.image.backend;
        let request = &request;

        let outcomes: Vec<Result<ContentResponse, ApiError>> = thread::scope(|scope| {
            let handles = (0..count)
                .map(|_| scope.spawn(move || backend.generate_content(request)))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(ApiError::unclassified("generation worker panicked"))
                    })
                })
                .collect()
        });

        let mut images = Vec::new();
        for outcome in outcomes {
            let response = outcome.map_err(|err| self.report("generate", err))?;
            images.extend(response.images().into_iter().map(png_data_uri));
        }
        Ok(images)
    }

    pub fn analyze(&self, image: &str) -> Result<AnalysisResult, ApiError> {
        let prompt = analysis_prompt(image);
        let request = ContentRequest {
            model: self.vision.model.clone(),
            parts: prompt.to_parts(),
            aspect_ratio: None,
        };
        let response = self
            .vision
            .backend
            .generate_content(&request)
            .map_err(|err| self.report("analyze", err))?;
        Ok(parse_analysis(&response.text()))
    }

    pub fn edit_with_mask(
        &self,
        image: &str,
        mask: Option<&str>,
        fields: &EditFields,
        aspect_ratio: AspectRatio,
    ) -> Result<Vec<String>, ApiError> {
        let prompt = edit_prompt(fields, image, mask);
        self.single_image_call("edit", &prompt, aspect_ratio)
    }

    pub fn swap_garments(
        &self,
        image: &str,
        garments: &[GarmentRequest],
        aspect_ratio: AspectRatio,
    ) -> Result<Vec<String>, ApiError> {
        let prompt = swap_prompt(image, garments);
        self.single_image_call("swap", &prompt, aspect_ratio)
    }

    /// Minimal text round trip on the analysis model.
    pub fn test_connection(&self) -> Result<String, ApiError> {
        let request = ContentRequest {
            model: self.vision.model.clone(),
            parts: vec![ContentPart::text(CONNECTION_PROMPT)],
            aspect_ratio: None,
        };
        let response = self
            .vision
            .backend
            .generate_content(&request)
            .map_err(|err| self.report("test_connection", err))?;
        Ok(response.text().trim().to_string())
    }

    fn image_request(&self, prompt: &AssembledPrompt, aspect_ratio: AspectRatio) -> ContentRequest {
        ContentRequest {
            model: self.image.model.clone(),
            parts: prompt.to_parts(),
            aspect_ratio: Some(aspect_ratio),
        }
    }

    fn single_image_call(
        &self,
        operation: &str,
        prompt: &AssembledPrompt,
        aspect_ratio: AspectRatio,
    ) -> Result<Vec<String>, ApiError> {
        let request = self.image_request(prompt, aspect_ratio);
        let response = self
            .image
            .backend
            .generate_content(&request)
            .map_err(|err| self.report(operation, err))?;
        Ok(response.images().into_iter().map(png_data_uri).collect())
    }

    fn report(&self, operation: &str, err: ApiError) -> ApiError {
        if let Some(events) = self.events.as_ref() {
            // Logging is best-effort; the classified error is what matters.
            let _ = events.emit(
                "api_error",
                map_object(json!({
                    "operation": operation,
                    "kind": err.kind().as_str(),
                    "retryable": err.is_retryable(),
                    "message": err.backend_message(),
                })),
            );
        }
        err
    }
}

/// Registered models go through the selector. Unregistered names are
/// passed straight to the remote backend.
fn resolve_model(
    selector: &ModelSelector,
    requested: Option<&str>,
    capability: &str,
    notes: &mut Vec<String>,
) -> Result<ModelSpec, ApiError> {
    let selection = selector
        .select(requested, capability)
        .map_err(ApiError::unclassified)?;
    notes.extend(selection.note());
    Ok(selection.model)
}

fn backend_for(spec: &ModelSpec, config: &GatewayConfig) -> Result<Arc<dyn Backend>, ApiError> {
    match spec.provider.as_str() {
        "dryrun" => Ok(Arc::new(DryrunBackend)),
        PASSTHROUGH_PROVIDER => {
            let api_key = config
                .api_key_trimmed()
                .ok_or(ApiError::MissingCredential)?;
            Ok(Arc::new(GeminiBackend::new(config.api_base.clone(), api_key)))
        }
        other => Err(ApiError::unclassified(format!(
            "no backend for provider '{other}' (model '{}')",
            spec.name
        ))),
    }
}
