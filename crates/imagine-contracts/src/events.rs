use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Keys every event carries. The writer owns them; payload entries with the
/// same name are dropped.
pub const RESERVED_KEYS: [&str; 4] = ["type", "session_id", "seq", "ts"];

/// Session log for one workspace, one compact JSON object per line in
/// `events.jsonl`.
///
/// `seq` counts events within the session, so concurrent emitters (the
/// parallel generation workers) can still be ordered after the fact. Inline
/// image payloads are replaced with their length before they hit the disk.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    next_seq: Mutex<u64>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                next_seq: Mutex::new(0),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut seq = self
            .inner
            .next_seq
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;

        let mut event = Map::new();
        event.insert("type".to_string(), Value::from(event_type));
        event.insert("session_id".to_string(), Value::from(self.session_id()));
        event.insert("seq".to_string(), Value::from(*seq));
        event.insert("ts".to_string(), Value::from(now_utc_iso()));
        for (key, value) in payload {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                event.insert(key, redact_inline_images(value));
            }
        }

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?
            .write_all(line.as_bytes())?;
        *seq += 1;

        Ok(Value::Object(event))
    }

    /// Reads back every event type written so far, in order.
    pub fn event_types(&self) -> anyhow::Result<Vec<String>> {
        let raw = match std::fs::read_to_string(&self.inner.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect())
    }
}

fn redact_inline_images(value: Value) -> Value {
    match value {
        Value::String(text) if text.starts_with("data:") => {
            Value::from(format!("<data uri, {} chars>", text.len()))
        }
        Value::Array(items) => Value::Array(items.into_iter().map(redact_inline_images).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, redact_inline_images(value)))
                .collect(),
        ),
        other => other,
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
