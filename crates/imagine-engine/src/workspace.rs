use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use imagine_contracts::events::EventWriter;
use imagine_contracts::images::ImageStore;
use imagine_contracts::local::LocalStore;
use imagine_contracts::panels::PanelStateStore;
use imagine_contracts::transfer::TransferChannel;
use serde_json::{json, Value};

use crate::map_object;

pub const IMAGES_FILE: &str = "images.json";
pub const LOCAL_FILE: &str = "local.json";
pub const EVENTS_FILE: &str = "events.jsonl";

/// Process-wide durable state, opened once and handed to each panel.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    images: ImageStore,
    transfers: TransferChannel,
    panels: PanelStateStore,
    events: EventWriter,
}

impl Workspace {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create data directory {}", root.display()))?;
        let images = ImageStore::open(root.join(IMAGES_FILE))?;
        let local = LocalStore::new(root.join(LOCAL_FILE));
        let session_id = uuid::Uuid::new_v4().to_string();
        let events = EventWriter::new(root.join(EVENTS_FILE), session_id);
        events.emit(
            "session_started",
            map_object(json!({
                "data_dir": root.to_string_lossy(),
                "images": images.len(),
            })),
        )?;
        Ok(Self {
            transfers: TransferChannel::new(local.clone()),
            panels: PanelStateStore::new(local),
            root,
            images,
            events,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn transfers(&self) -> &TransferChannel {
        &self.transfers
    }

    pub fn panels(&self) -> &PanelStateStore {
        &self.panels
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    /// Best-effort event; a log write failure never fails the operation.
    pub fn emit(&self, event_type: &str, payload: Value) {
        let _ = self.events.emit(event_type, map_object(payload));
    }

    pub fn close(self) -> Result<()> {
        self.events.emit(
            "session_closed",
            map_object(json!({ "images": self.images.len() })),
        )?;
        Ok(())
    }
}
