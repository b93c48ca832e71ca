use std::str::FromStr;

use anyhow::{bail, Context, Result};
use imagine_contracts::panels::AnalystState;
use imagine_contracts::transfer::{TransferPayload, TransferSlot};
use serde_json::json;

use super::image_payload;
use crate::gateway::{AnalysisResult, Gateway};
use crate::workspace::Workspace;

/// Which half of an analysis to hand to the creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSelection {
    Positive,
    Negative,
    Both,
}

impl FromStr for PromptSelection {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(PromptSelection::Positive),
            "negative" => Ok(PromptSelection::Negative),
            "both" => Ok(PromptSelection::Both),
            other => Err(format!(
                "unknown selection '{other}' (expected positive, negative or both)"
            )),
        }
    }
}

pub struct AnalystPanel {
    workspace: Workspace,
    gateway: Gateway,
    state: AnalystState,
}

impl AnalystPanel {
    pub fn mount(workspace: Workspace, gateway: Gateway) -> Result<Self> {
        let state = workspace.panels().load_or_default::<AnalystState>()?;
        let transferred = image_payload(workspace.transfers().consume(TransferSlot::Analyst)?);
        let mut panel = Self {
            workspace,
            gateway,
            state,
        };
        if let Some(image) = transferred {
            panel.workspace.emit(
                "transfer_consumed",
                json!({ "slot": TransferSlot::Analyst.key() }),
            );
            panel.set_image(image)?;
        }
        Ok(panel)
    }

    pub fn state(&self) -> &AnalystState {
        &self.state
    }

    /// A new image invalidates the previous analysis.
    pub fn set_image(&mut self, image: String) -> Result<()> {
        self.state = AnalystState {
            image: Some(image),
            positive: String::new(),
            negative: String::new(),
        };
        self.workspace.panels().save(&self.state)
    }

    pub fn analyze(&mut self) -> Result<AnalysisResult> {
        let Some(image) = self.state.image.as_deref() else {
            bail!("load an image before analyzing");
        };
        let result = self.gateway.analyze(image).context("analysis failed")?;
        self.state.positive = result.positive.clone();
        self.state.negative = result.negative.clone();
        self.workspace.panels().save(&self.state)?;
        self.workspace.emit(
            "analysis_finished",
            json!({
                "model": self.gateway.vision_model(),
                "positive_chars": result.positive.chars().count(),
                "negative_chars": result.negative.chars().count(),
            }),
        );
        Ok(result)
    }

    /// Leaves the chosen prompt text for the creator's next mount.
    pub fn transfer_to_creator(&self, selection: PromptSelection) -> Result<()> {
        let (positive, negative) = match selection {
            PromptSelection::Positive => (self.state.positive.clone(), String::new()),
            PromptSelection::Negative => (String::new(), self.state.negative.clone()),
            PromptSelection::Both => (self.state.positive.clone(), self.state.negative.clone()),
        };
        if positive.trim().is_empty() && negative.trim().is_empty() {
            bail!("nothing to transfer: run an analysis first");
        }
        self.workspace.transfers().publish(
            TransferSlot::PendingPrompt,
            &TransferPayload::Prompt { positive, negative },
        )?;
        self.workspace.emit(
            "transfer_published",
            json!({ "slot": TransferSlot::PendingPrompt.key() }),
        );
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.state = AnalystState::default();
        self.workspace.panels().clear::<AnalystState>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panels::{CreatorPanel, PanelTarget};

    const IMAGE: &str = "data:image/png;base64,QUJD";

    #[test]
    fn analysis_is_persisted_and_cleared() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let workspace = Workspace::open(temp.path())?;
        let mut panel = AnalystPanel::mount(workspace.clone(), Gateway::offline())?;
        assert!(panel.analyze().is_err());

        panel.set_image(IMAGE.to_string())?;
        let result = panel.analyze()?;
        assert!(!result.positive.is_empty());
        assert_eq!(result.negative, "blurry, low resolution");

        let remounted = AnalystPanel::mount(workspace.clone(), Gateway::offline())?;
        assert_eq!(remounted.state().positive, result.positive);
        assert_eq!(remounted.state().image.as_deref(), Some(IMAGE));

        panel.clear()?;
        let cleared = AnalystPanel::mount(workspace, Gateway::offline())?;
        assert_eq!(cleared.state(), &AnalystState::default());
        Ok(())
    }

    #[test]
    fn history_image_arrives_through_transfer() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let workspace = Workspace::open(temp.path())?;
        let mut creator = CreatorPanel::mount(workspace.clone(), Gateway::offline())?;
        creator.update(|state| state.prompt = "a compass".to_string())?;
        let image = creator.generate()?.remove(0);
        creator.send_to(PanelTarget::Analyst, &image.id)?;

        let panel = AnalystPanel::mount(workspace.clone(), Gateway::offline())?;
        assert_eq!(panel.state().image.as_deref(), Some(image.url.as_str()));
        assert!(!workspace.transfers().is_pending(TransferSlot::Analyst)?);
        Ok(())
    }

    #[test]
    fn selected_half_reaches_the_creator() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let workspace = Workspace::open(temp.path())?;
        let mut panel = AnalystPanel::mount(workspace.clone(), Gateway::offline())?;
        assert!(panel.transfer_to_creator(PromptSelection::Both).is_err());

        panel.set_image(IMAGE.to_string())?;
        let result = panel.analyze()?;
        panel.transfer_to_creator(PromptSelection::Negative)?;

        let creator = CreatorPanel::mount(workspace.clone(), Gateway::offline())?;
        assert_eq!(creator.state().prompt, "");
        assert_eq!(creator.state().neg_prompt, result.negative);
        assert!("Both".parse::<PromptSelection>().is_ok());
        Ok(())
    }
}
