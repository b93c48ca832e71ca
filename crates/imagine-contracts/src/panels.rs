//! Per-panel form snapshots, persisted on every change and reloaded on mount.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::garments::GarmentSet;
use crate::local::LocalStore;
use crate::options::{AspectRatio, BackgroundMode, LogoStyle, MaterialTag, StyleTag, ViewAngle};

/// Bounds for style and pose influence weights.
pub const INFLUENCE_MIN: f32 = 0.0;
pub const INFLUENCE_MAX: f32 = 2.0;

pub fn clamp_influence(value: f32) -> f32 {
    if value.is_nan() {
        return 0.5;
    }
    value.clamp(INFLUENCE_MIN, INFLUENCE_MAX)
}

/// Images produced by one generation request.
pub const MIN_COUNT: u32 = 1;
pub const MAX_COUNT: u32 = 4;

pub fn clamp_count(count: u32) -> u32 {
    count.clamp(MIN_COUNT, MAX_COUNT)
}

pub trait PanelSnapshot: Serialize + DeserializeOwned + Default {
    const KEY: &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatorState {
    pub prompt: String,
    pub neg_prompt: String,
    pub ref_image: Option<String>,
    pub pose_image: Option<String>,
    pub style_influence: f32,
    pub pose_influence: f32,
    pub view: ViewAngle,
    pub materials: Vec<MaterialTag>,
    pub styles: Vec<StyleTag>,
    pub logo_styles: Vec<LogoStyle>,
    pub background: BackgroundMode,
    pub aspect_ratio: AspectRatio,
    pub count: u32,
}

impl Default for CreatorState {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            neg_prompt: String::new(),
            ref_image: None,
            pose_image: None,
            style_influence: 0.5,
            pose_influence: 0.5,
            view: ViewAngle::Frontal,
            materials: Vec::new(),
            styles: Vec::new(),
            logo_styles: Vec::new(),
            background: BackgroundMode::Neutral,
            aspect_ratio: AspectRatio::Portrait9x16,
            count: 1,
        }
    }
}

impl PanelSnapshot for CreatorState {
    const KEY: &'static str = "creator_state_v2";
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystState {
    pub image: Option<String>,
    pub positive: String,
    pub negative: String,
}

impl PanelSnapshot for AnalystState {
    const KEY: &'static str = "analyst_state";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushMode {
    #[default]
    Paint,
    Erase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorState {
    pub image: Option<String>,
    pub prompt: String,
    pub neg_prompt: String,
    pub aspect_ratio: AspectRatio,
    pub view: ViewAngle,
    pub materials: Vec<MaterialTag>,
    pub styles: Vec<StyleTag>,
    /// Brush radius in on-screen pixels.
    pub brush_radius: f32,
    pub brush_mode: BrushMode,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            image: None,
            prompt: String::new(),
            neg_prompt: String::new(),
            aspect_ratio: AspectRatio::Square,
            view: ViewAngle::Frontal,
            materials: Vec::new(),
            styles: Vec::new(),
            brush_radius: 10.0,
            brush_mode: BrushMode::Paint,
        }
    }
}

impl PanelSnapshot for EditorState {
    const KEY: &'static str = "editor_state";
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapperState {
    pub main_image: Option<String>,
    pub garments: GarmentSet,
}

impl PanelSnapshot for SwapperState {
    const KEY: &'static str = "swapper_state";
}

#[derive(Debug, Clone)]
pub struct PanelStateStore {
    store: LocalStore,
}

impl PanelStateStore {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Saved snapshot, or `None` when nothing (or nothing readable) is stored.
    /// An unreadable entry is dropped from the store.
    pub fn load<T: PanelSnapshot>(&self) -> anyhow::Result<Option<T>> {
        let Some(raw) = self.store.get(T::KEY)? else {
            return Ok(None);
        };
        // Struct derives also accept a JSON array as a field sequence.
        let parsed = match raw {
            Value::Object(_) => serde_json::from_value(raw).ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.store.remove(T::KEY)?;
        }
        Ok(parsed)
    }

    pub fn load_or_default<T: PanelSnapshot>(&self) -> anyhow::Result<T> {
        Ok(self.load()?.unwrap_or_default())
    }

    pub fn save<T: PanelSnapshot>(&self, state: &T) -> anyhow::Result<()> {
        self.store.set(T::KEY, serde_json::to_value(state)?)
    }

    pub fn clear<T: PanelSnapshot>(&self) -> anyhow::Result<()> {
        self.store.remove(T::KEY)
    }
}
