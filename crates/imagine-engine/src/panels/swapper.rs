use anyhow::{bail, Context, Result};
use imagine_contracts::options::AspectRatio;
use imagine_contracts::panels::SwapperState;
use imagine_contracts::transfer::TransferSlot;
use serde_json::json;

use super::image_payload;
use crate::data_uri::image_dimensions;
use crate::gateway::Gateway;
use crate::workspace::Workspace;

pub struct SwapperPanel {
    workspace: Workspace,
    gateway: Gateway,
    state: SwapperState,
    result: Option<String>,
}

impl SwapperPanel {
    pub fn mount(workspace: Workspace, gateway: Gateway) -> Result<Self> {
        let state = workspace.panels().load_or_default::<SwapperState>()?;
        let transferred = image_payload(workspace.transfers().consume(TransferSlot::Swapper)?);
        let mut panel = Self {
            workspace,
            gateway,
            state,
            result: None,
        };
        if let Some(image) = transferred {
            panel.workspace.emit(
                "transfer_consumed",
                json!({ "slot": TransferSlot::Swapper.key() }),
            );
            panel.set_main_image(image)?;
        }
        Ok(panel)
    }

    pub fn state(&self) -> &SwapperState {
        &self.state
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn set_main_image(&mut self, image: String) -> Result<()> {
        if image_dimensions(&image).is_none() {
            bail!("photo could not be decoded as an image");
        }
        self.state.main_image = Some(image);
        self.result = None;
        self.save()
    }

    /// Flips a garment on or off; `None` when the id is unknown.
    pub fn toggle(&mut self, id: &str) -> Result<Option<bool>> {
        let toggled = self.state.garments.toggle(id);
        if toggled.is_some() {
            self.save()?;
        }
        Ok(toggled)
    }

    pub fn set_active(&mut self, id: &str, active: bool) -> Result<bool> {
        let found = self.state.garments.set_active(id, active);
        self.save_if(found)
    }

    pub fn set_description(&mut self, id: &str, description: &str) -> Result<bool> {
        let found = self.state.garments.set_description(id, description);
        self.save_if(found)
    }

    pub fn set_reference(&mut self, id: &str, reference: Option<String>) -> Result<bool> {
        let found = self.state.garments.set_reference(id, reference);
        self.save_if(found)
    }

    /// Runs the try-on on the main photo for every active garment.
    pub fn swap(&mut self) -> Result<String> {
        let Some(image) = self.state.main_image.as_deref() else {
            bail!("load a photo before swapping garments");
        };
        let requests = self.state.garments.requests();
        if requests.is_empty() {
            bail!("select at least one garment");
        }
        let (width, height) =
            image_dimensions(image).context("photo could not be decoded as an image")?;
        let aspect_ratio = swap_aspect_ratio(width, height);
        let images = self
            .gateway
            .swap_garments(image, &requests, aspect_ratio)
            .context("garment swap failed")?;
        self.workspace.emit(
            "swap_finished",
            json!({
                "model": self.gateway.image_model(),
                "garments": requests.len(),
                "aspect_ratio": aspect_ratio.as_str(),
                "images": images.len(),
            }),
        );
        let Some(first) = images.into_iter().next() else {
            bail!("the backend returned no image for the swap");
        };
        self.result = Some(first.clone());
        Ok(first)
    }

    pub fn discard_result(&mut self) {
        self.result = None;
    }

    pub fn clear(&mut self) -> Result<()> {
        self.state = SwapperState::default();
        self.result = None;
        self.workspace.panels().clear::<SwapperState>()
    }

    fn save(&self) -> Result<()> {
        self.workspace.panels().save(&self.state)
    }

    fn save_if(&self, changed: bool) -> Result<bool> {
        if changed {
            self.save()?;
        }
        Ok(changed)
    }
}

/// Square-ish photos stay square, phone portraits stay 9:16, anything else
/// goes out as 3:4.
fn swap_aspect_ratio(width: u32, height: u32) -> AspectRatio {
    if width == 0 || height == 0 {
        return AspectRatio::Portrait3x4;
    }
    let ratio = width as f64 / height as f64;
    if (ratio - 1.0).abs() < 0.1 {
        AspectRatio::Square
    } else if (ratio - 0.5625).abs() < 0.1 {
        AspectRatio::Portrait9x16
    } else {
        AspectRatio::Portrait3x4
    }
}
