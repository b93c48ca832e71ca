use std::path::Path;

use anyhow::{bail, Context, Result};
use imagine_contracts::images::GeneratedImage;
use imagine_contracts::panels::{clamp_count, clamp_influence, CreatorState};
use imagine_contracts::transfer::{TransferPayload, TransferSlot};
use serde_json::json;

use super::PanelTarget;
use crate::data_uri::{image_dimensions, write_data_uri_to_file};
use crate::gateway::Gateway;
use crate::prompts::{generation_task, GenerationFields};
use crate::workspace::Workspace;

const VARIATION_STYLE_INFLUENCE: f32 = 0.8;

pub struct CreatorPanel {
    workspace: Workspace,
    gateway: Gateway,
    state: CreatorState,
}

impl CreatorPanel {
    /// A pending prompt transfer wins over the saved form: it resets the
    /// form and fills in whichever halves are non-empty.
    pub fn mount(workspace: Workspace, gateway: Gateway) -> Result<Self> {
        let pending = workspace.transfers().consume(TransferSlot::PendingPrompt)?;
        let state = match pending {
            Some(TransferPayload::Prompt { positive, negative }) => {
                workspace.emit(
                    "transfer_consumed",
                    json!({ "slot": TransferSlot::PendingPrompt.key() }),
                );
                let mut state = CreatorState::default();
                if !positive.trim().is_empty() {
                    state.prompt = positive;
                }
                if !negative.trim().is_empty() {
                    state.neg_prompt = negative;
                }
                workspace.panels().save(&state)?;
                state
            }
            _ => workspace.panels().load_or_default::<CreatorState>()?,
        };
        Ok(Self {
            workspace,
            gateway,
            state,
        })
    }

    pub fn state(&self) -> &CreatorState {
        &self.state
    }

    /// Applies a form edit and persists the result.
    pub fn update(&mut self, edit: impl FnOnce(&mut CreatorState)) -> Result<()> {
        edit(&mut self.state);
        self.state.style_influence = clamp_influence(self.state.style_influence);
        self.state.pose_influence = clamp_influence(self.state.pose_influence);
        self.state.count = clamp_count(self.state.count);
        self.workspace.panels().save(&self.state)
    }

    /// Generates `count` images and records each one in the history with its
    /// decoded size and the prompt that produced it.
    pub fn generate(&mut self) -> Result<Vec<GeneratedImage>> {
        if self.state.prompt.trim().is_empty() {
            bail!("enter a prompt before generating");
        }
        let fields = GenerationFields::from(&self.state);
        let aspect_ratio = self.state.aspect_ratio;
        let count = clamp_count(self.state.count);
        self.workspace.emit(
            "generation_started",
            json!({
                "model": self.gateway.image_model(),
                "aspect_ratio": aspect_ratio.as_str(),
                "count": count,
                "has_reference": fields.ref_image.is_some(),
                "has_pose": fields.pose_image.is_some(),
            }),
        );

        let urls = self
            .gateway
            .generate(&fields, aspect_ratio, count)
            .context("generation failed")?;
        let recorded_prompt = generation_task(&self.state.view, &self.state.prompt);

        let mut saved = Vec::with_capacity(urls.len());
        for url in urls {
            let Some((width, height)) = image_dimensions(&url) else {
                self.workspace.emit(
                    "image_rejected",
                    json!({ "reason": "payload does not decode as an image", "chars": url.len() }),
                );
                continue;
            };
            let image = GeneratedImage::new(url, recorded_prompt.clone(), width, height);
            if !self.workspace.images().add(image.clone()) {
                bail!("failed to save generated image {} to the history", image.id);
            }
            self.workspace.emit(
                "image_saved",
                json!({ "id": image.id, "width": width, "height": height }),
            );
            saved.push(image);
        }
        self.workspace.emit(
            "generation_finished",
            json!({ "requested": count, "images": saved.len() }),
        );
        if saved.is_empty() {
            bail!("the backend returned no decodable images");
        }
        // Newest first, like the history listing.
        saved.reverse();
        Ok(saved)
    }

    pub fn history(&self) -> Result<Vec<GeneratedImage>> {
        self.workspace.images().list()
    }

    pub fn delete(&self, id: &str) -> bool {
        let deleted = self.workspace.images().delete(id);
        self.workspace
            .emit("image_deleted", json!({ "id": id, "ok": deleted }));
        deleted
    }

    /// Seeds the form from a history image: it becomes the style reference
    /// and its first sentence the new prompt.
    pub fn variation(&mut self, id: &str) -> Result<()> {
        let image = self.require_image(id)?;
        let prompt = variation_prompt(&image.prompt);
        self.update(|state| {
            state.ref_image = Some(image.url);
            state.style_influence = VARIATION_STYLE_INFLUENCE;
            state.prompt = prompt;
        })
    }

    pub fn send_to(&self, target: PanelTarget, id: &str) -> Result<()> {
        let image = self.require_image(id)?;
        let slot = target.slot();
        self.workspace.transfers().publish(
            slot,
            &TransferPayload::Image {
                data_uri: image.url,
            },
        )?;
        self.workspace.emit(
            "transfer_published",
            json!({ "slot": slot.key(), "id": id }),
        );
        Ok(())
    }

    pub fn export(&self, id: &str, path: &Path) -> Result<()> {
        let image = self.require_image(id)?;
        write_data_uri_to_file(&image.url, path)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.state = CreatorState::default();
        self.workspace.panels().clear::<CreatorState>()
    }

    fn require_image(&self, id: &str) -> Result<GeneratedImage> {
        self.workspace
            .images()
            .get(id)?
            .with_context(|| format!("no image with id '{id}' in the history"))
    }
}

fn variation_prompt(recorded: &str) -> String {
    let body = recorded
        .strip_prefix("Mandatory view: ")
        .and_then(|rest| rest.split_once(". "))
        .map(|(_, tail)| tail)
        .unwrap_or(recorded);
    let first = body.split('.').next().unwrap_or_default().trim();
    format!("Variation of: {first}")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use imagine_contracts::options::{AspectRatio, ViewAngle};

    use super::*;
    use crate::backend::{Backend, ContentPart, ContentRequest, ContentResponse};
    use crate::errors::ApiError;
    use crate::gateway::Route;

    fn mounted(temp: &tempfile::TempDir) -> Result<CreatorPanel> {
        CreatorPanel::mount(Workspace::open(temp.path())?, Gateway::offline())
    }

    #[test]
    fn generate_records_each_image_with_real_dimensions() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut panel = mounted(&temp)?;
        panel.update(|state| {
            state.prompt = "a glass teapot".to_string();
            state.view = ViewAngle::Side;
            state.aspect_ratio = AspectRatio::Square;
            state.count = 2;
        })?;

        let images = panel.generate()?;
        assert_eq!(images.len(), 2);
        assert_ne!(images[0].id, images[1].id);
        assert!(images
            .iter()
            .all(|image| image.width == 512 && image.height == 512));
        assert_eq!(images[0].prompt, "Mandatory view: Side. a glass teapot.");
        assert!(images[0].url.starts_with("data:image/png;base64,"));

        let history = panel.history()?;
        assert_eq!(
            history.iter().map(|image| &image.id).collect::<Vec<_>>(),
            images.iter().map(|image| &image.id).collect::<Vec<_>>()
        );
        Ok(())
    }

    /// Returns one payload per call that is valid base64 but not an image.
    struct UndecodableBackend;

    impl Backend for UndecodableBackend {
        fn name(&self) -> &str {
            "undecodable"
        }

        fn generate_content(&self, _request: &ContentRequest) -> Result<ContentResponse, ApiError> {
            Ok(ContentResponse {
                parts: vec![ContentPart::InlineImage {
                    mime_type: "image/png".to_string(),
                    data: "SU1H".to_string(),
                }],
            })
        }
    }

    #[test]
    fn generate_clamps_count_to_four() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut panel = mounted(&temp)?;
        panel.update(|state| {
            state.prompt = "a paper crane".to_string();
            state.count = 100_000;
        })?;
        assert_eq!(panel.state().count, 4);

        let images = panel.generate()?;
        assert_eq!(images.len(), 4);
        Ok(())
    }

    #[test]
    fn undecodable_payloads_are_not_recorded() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let backend: Arc<dyn Backend> = Arc::new(UndecodableBackend);
        let gateway = Gateway::new(
            Route::new(backend.clone(), "image-model"),
            Route::new(backend, "vision-model"),
        );
        let workspace = Workspace::open(temp.path())?;
        let events = workspace.events().clone();
        let mut panel = CreatorPanel::mount(workspace, gateway)?;
        panel.update(|state| state.prompt = "a paper crane".to_string())?;

        assert!(panel.generate().is_err());
        assert!(panel.history()?.is_empty());
        assert!(events
            .event_types()?
            .contains(&"image_rejected".to_string()));
        Ok(())
    }

    #[test]
    fn generate_requires_a_prompt() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut panel = mounted(&temp)?;
        assert!(panel.generate().is_err());
        assert!(panel.history()?.is_empty());
        Ok(())
    }

    #[test]
    fn form_state_survives_remount() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut panel = mounted(&temp)?;
        panel.update(|state| {
            state.prompt = "neon koi".to_string();
            state.style_influence = 7.0;
            state.count = 0;
        })?;
        drop(panel);

        let panel = mounted(&temp)?;
        assert_eq!(panel.state().prompt, "neon koi");
        assert_eq!(panel.state().style_influence, 2.0);
        assert_eq!(panel.state().count, 1);
        Ok(())
    }

    #[test]
    fn pending_prompt_transfer_resets_form_once() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut panel = mounted(&temp)?;
        panel.update(|state| {
            state.prompt = "old".to_string();
            state.neg_prompt = "old negative".to_string();
            state.count = 3;
        })?;
        drop(panel);

        let workspace = Workspace::open(temp.path())?;
        workspace.transfers().publish(
            TransferSlot::PendingPrompt,
            &TransferPayload::Prompt {
                positive: "A cat".to_string(),
                negative: String::new(),
            },
        )?;
        let panel = CreatorPanel::mount(workspace.clone(), Gateway::offline())?;
        assert_eq!(panel.state().prompt, "A cat");
        assert_eq!(panel.state().neg_prompt, "");
        assert_eq!(panel.state().count, 1);
        assert!(!workspace.transfers().is_pending(TransferSlot::PendingPrompt)?);
        Ok(())
    }

    #[test]
    fn variation_reuses_image_as_reference() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut panel = mounted(&temp)?;
        panel.update(|state| state.prompt = "a red fox. Snowy forest".to_string())?;
        let id = panel.generate()?[0].id.clone();

        panel.variation(&id)?;
        assert_eq!(panel.state().prompt, "Variation of: a red fox");
        assert_eq!(panel.state().style_influence, 0.8);
        assert!(panel.state().ref_image.is_some());
        assert!(panel.variation("missing").is_err());
        Ok(())
    }

    #[test]
    fn delete_export_and_send() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut panel = mounted(&temp)?;
        panel.update(|state| state.prompt = "a kite".to_string())?;
        let id = panel.generate()?[0].id.clone();

        let out = temp.path().join("exports/kite.png");
        panel.export(&id, &out)?;
        assert!(out.exists());

        panel.send_to(PanelTarget::Editor, &id)?;
        assert!(panel
            .workspace
            .transfers()
            .is_pending(TransferSlot::Editor)?);

        assert!(panel.delete(&id));
        assert!(panel.delete(&id));
        assert!(panel.history()?.is_empty());
        Ok(())
    }

    #[test]
    fn variation_prompt_skips_view_prefix() {
        assert_eq!(
            variation_prompt("Mandatory view: 3/4. a lamp. warm light."),
            "Variation of: a lamp"
        );
        assert_eq!(variation_prompt("plain prompt"), "Variation of: plain prompt");
    }
}
