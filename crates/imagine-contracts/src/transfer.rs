//! One-shot hand-off of a prompt or image between panels.
//!
//! Each slot holds at most one pending payload. A second publish before the
//! receiver consumes overwrites the first.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::local::LocalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferSlot {
    /// Analyst → Creator prompt fields.
    PendingPrompt,
    /// Creator → Analyst seed image.
    Analyst,
    /// Creator → Editor seed image.
    Editor,
    /// Creator → Swapper seed image.
    Swapper,
}

impl TransferSlot {
    pub fn key(self) -> &'static str {
        match self {
            TransferSlot::PendingPrompt => "transfer_pending",
            TransferSlot::Analyst => "analyst_transfer",
            TransferSlot::Editor => "editor_transfer",
            TransferSlot::Swapper => "swapper_transfer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferPayload {
    Prompt { positive: String, negative: String },
    Image { data_uri: String },
}

#[derive(Debug, Clone)]
pub struct TransferChannel {
    store: LocalStore,
}

impl TransferChannel {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub fn publish(&self, slot: TransferSlot, payload: &TransferPayload) -> anyhow::Result<()> {
        self.store.set(slot.key(), serde_json::to_value(payload)?)
    }

    /// Returns the pending payload at most once. A payload that no longer
    /// decodes is dropped and reported as nothing pending.
    pub fn consume(&self, slot: TransferSlot) -> anyhow::Result<Option<TransferPayload>> {
        let Some(raw) = self.store.take(slot.key())? else {
            return Ok(None);
        };
        Ok(decode_payload(raw))
    }

    pub fn is_pending(&self, slot: TransferSlot) -> anyhow::Result<bool> {
        Ok(self.store.get(slot.key())?.is_some())
    }
}

fn decode_payload(raw: Value) -> Option<TransferPayload> {
    match raw {
        // Image slots may hold a bare data URI.
        Value::String(data_uri) => Some(TransferPayload::Image { data_uri }),
        other => serde_json::from_value(other).ok(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn channel(dir: &std::path::Path) -> TransferChannel {
        TransferChannel::new(LocalStore::new(dir.join("local.json")))
    }

    #[test]
    fn consume_delivers_exactly_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let transfers = channel(temp.path());
        let payload = TransferPayload::Prompt {
            positive: "A cat".to_string(),
            negative: "no dogs".to_string(),
        };
        transfers.publish(TransferSlot::PendingPrompt, &payload)?;

        assert!(transfers.is_pending(TransferSlot::PendingPrompt)?);
        assert_eq!(
            transfers.consume(TransferSlot::PendingPrompt)?,
            Some(payload)
        );
        assert_eq!(transfers.consume(TransferSlot::PendingPrompt)?, None);
        Ok(())
    }

    #[test]
    fn second_publish_overwrites_first() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let transfers = channel(temp.path());
        let first = TransferPayload::Image {
            data_uri: "data:image/png;base64,AAA".to_string(),
        };
        let second = TransferPayload::Image {
            data_uri: "data:image/png;base64,BBB".to_string(),
        };
        transfers.publish(TransferSlot::Editor, &first)?;
        transfers.publish(TransferSlot::Editor, &second)?;

        assert_eq!(transfers.consume(TransferSlot::Editor)?, Some(second));
        assert_eq!(transfers.consume(TransferSlot::Editor)?, None);
        Ok(())
    }

    #[test]
    fn slots_are_independent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let transfers = channel(temp.path());
        let image = TransferPayload::Image {
            data_uri: "data:image/png;base64,AAA".to_string(),
        };
        transfers.publish(TransferSlot::Swapper, &image)?;

        assert_eq!(transfers.consume(TransferSlot::Analyst)?, None);
        assert_eq!(transfers.consume(TransferSlot::Swapper)?, Some(image));
        Ok(())
    }

    #[test]
    fn bare_string_reads_as_image_and_garbage_is_dropped() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalStore::new(temp.path().join("local.json"));
        let transfers = TransferChannel::new(store.clone());

        store.set("analyst_transfer", json!("data:image/png;base64,QQ=="))?;
        assert_eq!(
            transfers.consume(TransferSlot::Analyst)?,
            Some(TransferPayload::Image {
                data_uri: "data:image/png;base64,QQ==".to_string()
            })
        );

        store.set("transfer_pending", json!({"kind": "mystery"}))?;
        assert_eq!(transfers.consume(TransferSlot::PendingPrompt)?, None);
        assert_eq!(store.get("transfer_pending")?, None);
        Ok(())
    }
}
