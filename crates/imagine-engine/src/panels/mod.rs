//! Panel controllers: one per use case, each owning its persisted form
//! state and driving the gateway and durable stores through a shared
//! [`Workspace`](crate::workspace::Workspace).

mod analyst;
mod creator;
mod editor;
mod swapper;

use std::fmt;
use std::str::FromStr;

use imagine_contracts::transfer::{TransferPayload, TransferSlot};

pub use analyst::{AnalystPanel, PromptSelection};
pub use creator::CreatorPanel;
pub use editor::EditorPanel;
pub use swapper::SwapperPanel;

/// Panels that accept an image handed over from the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelTarget {
    Analyst,
    Editor,
    Swapper,
}

impl PanelTarget {
    pub fn slot(self) -> TransferSlot {
        match self {
            PanelTarget::Analyst => TransferSlot::Analyst,
            PanelTarget::Editor => TransferSlot::Editor,
            PanelTarget::Swapper => TransferSlot::Swapper,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PanelTarget::Analyst => "analyst",
            PanelTarget::Editor => "editor",
            PanelTarget::Swapper => "swapper",
        }
    }
}

impl fmt::Display for PanelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PanelTarget {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "analyst" => Ok(PanelTarget::Analyst),
            "editor" => Ok(PanelTarget::Editor),
            "swapper" => Ok(PanelTarget::Swapper),
            other => Err(format!(
                "unknown panel '{other}' (expected analyst, editor or swapper)"
            )),
        }
    }
}

fn image_payload(payload: Option<TransferPayload>) -> Option<String> {
    match payload? {
        TransferPayload::Image { data_uri } if !data_uri.trim().is_empty() => Some(data_uri),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_parse_and_map_to_slots() {
        assert_eq!("Editor".parse::<PanelTarget>(), Ok(PanelTarget::Editor));
        assert_eq!(PanelTarget::Swapper.slot(), TransferSlot::Swapper);
        assert!("creator".parse::<PanelTarget>().is_err());
    }

    #[test]
    fn only_image_payloads_seed_panels() {
        assert_eq!(
            image_payload(Some(TransferPayload::Image {
                data_uri: "data:image/png;base64,QUJD".to_string()
            })),
            Some("data:image/png;base64,QUJD".to_string())
        );
        assert_eq!(
            image_payload(Some(TransferPayload::Prompt {
                positive: "a".to_string(),
                negative: String::new(),
            })),
            None
        );
        assert_eq!(image_payload(None), None);
    }
}
