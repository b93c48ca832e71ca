use anyhow::{bail, Context, Result};
use imagine_contracts::options::AspectRatio;
use imagine_contracts::panels::{BrushMode, EditorState};
use imagine_contracts::transfer::TransferSlot;
use serde_json::json;

use super::image_payload;
use crate::data_uri::image_dimensions;
use crate::gateway::Gateway;
use crate::mask::{MaskCompositor, MaskStroke};
use crate::prompts::EditFields;
use crate::workspace::Workspace;

pub struct EditorPanel {
    workspace: Workspace,
    gateway: Gateway,
    state: EditorState,
    mask: MaskCompositor,
    result: Option<String>,
}

impl EditorPanel {
    pub fn mount(workspace: Workspace, gateway: Gateway) -> Result<Self> {
        let state = workspace.panels().load_or_default::<EditorState>()?;
        let transferred = image_payload(workspace.transfers().consume(TransferSlot::Editor)?);
        let mut panel = Self {
            workspace,
            gateway,
            state,
            mask: MaskCompositor::new(),
            result: None,
        };
        panel.mask.set_mode(panel.state.brush_mode);
        panel.mask.set_brush_radius(panel.state.brush_radius);

        if let Some(image) = transferred {
            panel.workspace.emit(
                "transfer_consumed",
                json!({ "slot": TransferSlot::Editor.key() }),
            );
            panel.load_image(image)?;
        } else if let Some((width, height)) =
            panel.state.image.as_deref().and_then(image_dimensions)
        {
            panel.mask.load_base(width, height);
        }
        Ok(panel)
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn mask(&self) -> &MaskCompositor {
        &self.mask
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Replaces the base image. The mask starts over at the image's native
    /// size and the aspect ratio defaults to the closest supported one.
    pub fn load_image(&mut self, image: String) -> Result<()> {
        let (width, height) =
            image_dimensions(&image).context("editor image could not be decoded")?;
        self.mask.load_base(width, height);
        self.result = None;
        self.state.image = Some(image);
        self.state.aspect_ratio = AspectRatio::nearest(width, height);
        self.workspace.panels().save(&self.state)
    }

    /// Applies a form edit and persists the result.
    pub fn update(&mut self, edit: impl FnOnce(&mut EditorState)) -> Result<()> {
        edit(&mut self.state);
        self.mask.set_mode(self.state.brush_mode);
        self.mask.set_brush_radius(self.state.brush_radius);
        self.state.brush_radius = self.mask.brush_radius();
        self.workspace.panels().save(&self.state)
    }

    pub fn set_brush_mode(&mut self, mode: BrushMode) -> Result<()> {
        self.update(|state| state.brush_mode = mode)
    }

    pub fn set_brush_radius(&mut self, radius: f32) -> Result<()> {
        self.update(|state| state.brush_radius = radius)
    }

    pub fn set_display_size(&mut self, width: u32, height: u32) {
        self.mask.set_display_size(width, height);
    }

    pub fn begin_stroke(&mut self, point: (f32, f32)) {
        self.mask.begin_stroke(point);
    }

    pub fn extend_stroke(&mut self, point: (f32, f32)) {
        self.mask.extend_stroke(point);
    }

    pub fn end_stroke(&mut self) {
        self.mask.end_stroke();
    }

    /// Replays recorded strokes, then restores the panel's brush settings.
    pub fn apply_strokes(&mut self, strokes: &[MaskStroke]) {
        for stroke in strokes {
            self.mask.apply(stroke);
        }
        self.mask.set_mode(self.state.brush_mode);
        self.mask.set_brush_radius(self.state.brush_radius);
    }

    pub fn clear_mask(&mut self) {
        self.mask.clear();
    }

    /// Edits with the painted mask. A mask with no painted pixels left is
    /// treated as no mask, which means a whole-image edit.
    pub fn edit(&mut self) -> Result<String> {
        let mask = if self.mask.has_mask() && self.mask.painted_pixels() > 0 {
            self.mask.to_data_uri()?
        } else {
            None
        };
        self.edit_with_mask(mask.as_deref())
    }

    /// Edits with an externally supplied mask image, or none.
    pub fn edit_with_mask(&mut self, mask: Option<&str>) -> Result<String> {
        let Some(image) = self.state.image.as_deref() else {
            bail!("load an image before editing");
        };
        if self.state.prompt.trim().is_empty() {
            bail!("describe the edit before running it");
        }
        let fields = EditFields::from(&self.state);
        let images = self
            .gateway
            .edit_with_mask(image, mask, &fields, self.state.aspect_ratio)
            .context("edit failed")?;
        self.workspace.emit(
            "edit_finished",
            json!({
                "model": self.gateway.image_model(),
                "masked": mask.is_some(),
                "aspect_ratio": self.state.aspect_ratio.as_str(),
                "images": images.len(),
            }),
        );
        let Some(first) = images.into_iter().next() else {
            bail!("the backend returned no edited image");
        };
        self.result = Some(first.clone());
        Ok(first)
    }

    pub fn discard_result(&mut self) {
        self.result = None;
    }

    pub fn clear(&mut self) -> Result<()> {
        self.state = EditorState::default();
        self.mask = MaskCompositor::new();
        self.result = None;
        self.workspace.panels().clear::<EditorState>()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;
    use crate::backend::{Backend, ContentPart, ContentRequest, ContentResponse, DryrunBackend};
    use crate::data_uri::encode_data_uri;
    use crate::errors::ApiError;
    use crate::gateway::Route;

    /// Dryrun backend that remembers how many images each request carried.
    #[derive(Default)]
    struct CountingBackend {
        inline_images: Mutex<Vec<usize>>,
    }

    impl Backend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse, ApiError> {
            let count = request
                .parts
                .iter()
                .filter(|part| matches!(part, ContentPart::InlineImage { .. }))
                .count();
            if let Ok(mut seen) = self.inline_images.lock() {
                seen.push(count);
            }
            DryrunBackend.generate_content(request)
        }
    }

    fn png(width: u32, height: u32) -> Result<String> {
        let mut out = Cursor::new(Vec::new());
        RgbaImage::from_pixel(width, height, Rgba([9, 9, 9, 255]))
            .write_to(&mut out, ImageFormat::Png)?;
        Ok(encode_data_uri("image/png", &out.into_inner()))
    }

    fn counting_gateway() -> (Arc<CountingBackend>, Gateway) {
        let backend = Arc::new(CountingBackend::default());
        let gateway = Gateway::new(
            Route::new(backend.clone(), "dryrun-image-1"),
            Route::new(backend.clone(), "dryrun-vision-1"),
        );
        (backend, gateway)
    }

    #[test]
    fn loading_an_image_sizes_mask_and_aspect_ratio() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut panel = EditorPanel::mount(Workspace::open(temp.path())?, Gateway::offline())?;
        panel.load_image(png(90, 160)?)?;
        assert_eq!(panel.mask().surface().dimensions(), (90, 160));
        assert_eq!(panel.state().aspect_ratio, AspectRatio::Portrait9x16);
        assert!(!panel.mask().has_mask());
        assert!(panel.load_image("not an image".to_string()).is_err());
        Ok(())
    }

    #[test]
    fn edit_requires_image_and_prompt() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut panel = EditorPanel::mount(Workspace::open(temp.path())?, Gateway::offline())?;
        assert!(panel.edit().is_err());
        panel.load_image(png(32, 32)?)?;
        assert!(panel.edit().is_err());
        Ok(())
    }

    #[test]
    fn painted_mask_is_sent_and_erased_mask_is_not() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let (backend, gateway) = counting_gateway();
        let mut panel = EditorPanel::mount(Workspace::open(temp.path())?, gateway)?;
        panel.load_image(png(64, 64)?)?;
        panel.update(|state| state.prompt = "add a moon".to_string())?;

        panel.apply_strokes(&[MaskStroke {
            mode: BrushMode::Paint,
            radius: Some(4.0),
            points: vec![[10.0, 10.0], [20.0, 20.0]],
        }]);
        let edited = panel.edit()?;
        assert_eq!(panel.result(), Some(edited.as_str()));

        panel.apply_strokes(&[MaskStroke {
            mode: BrushMode::Erase,
            radius: Some(12.0),
            points: vec![[10.0, 10.0], [20.0, 20.0]],
        }]);
        assert!(panel.mask().has_mask());
        panel.edit()?;

        let seen = backend
            .inline_images
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .clone();
        assert_eq!(seen, vec![2, 1]);
        Ok(())
    }

    #[test]
    fn transferred_image_replaces_saved_one() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let workspace = Workspace::open(temp.path())?;
        let mut panel = EditorPanel::mount(workspace.clone(), Gateway::offline())?;
        panel.load_image(png(40, 30)?)?;
        panel.set_brush_radius(25.0)?;
        drop(panel);

        let incoming = png(160, 90)?;
        workspace.transfers().publish(
            TransferSlot::Editor,
            &imagine_contracts::transfer::TransferPayload::Image {
                data_uri: incoming.clone(),
            },
        )?;
        let panel = EditorPanel::mount(workspace.clone(), Gateway::offline())?;
        assert_eq!(panel.state().image.as_deref(), Some(incoming.as_str()));
        assert_eq!(panel.state().aspect_ratio, AspectRatio::Landscape16x9);
        assert_eq!(panel.state().brush_radius, 25.0);
        assert_eq!(panel.mask().surface().dimensions(), (160, 90));
        Ok(())
    }
}
