use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarmentKind {
    Top,
    Bottom,
    Dress,
    Shoes,
    Jacket,
    Accessories,
    Glasses,
    Hat,
    Bag,
}

impl GarmentKind {
    pub const ALL: [GarmentKind; 9] = [
        GarmentKind::Top,
        GarmentKind::Bottom,
        GarmentKind::Dress,
        GarmentKind::Shoes,
        GarmentKind::Jacket,
        GarmentKind::Accessories,
        GarmentKind::Glasses,
        GarmentKind::Hat,
        GarmentKind::Bag,
    ];

    pub fn key(self) -> &'static str {
        match self {
            GarmentKind::Top => "top",
            GarmentKind::Bottom => "bottom",
            GarmentKind::Dress => "dress",
            GarmentKind::Shoes => "shoes",
            GarmentKind::Jacket => "jacket",
            GarmentKind::Accessories => "accessories",
            GarmentKind::Glasses => "glasses",
            GarmentKind::Hat => "hat",
            GarmentKind::Bag => "bag",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GarmentKind::Top => "shirt/blouse",
            GarmentKind::Bottom => "pants/shorts",
            GarmentKind::Dress => "dress",
            GarmentKind::Shoes => "shoes",
            GarmentKind::Jacket => "jacket",
            GarmentKind::Accessories => "accessories",
            GarmentKind::Glasses => "glasses",
            GarmentKind::Hat => "hat/cap",
            GarmentKind::Bag => "bag/backpack",
        }
    }

    /// Region name sent to the backend. A dress covers both torso and legs.
    pub fn request_region(self) -> &'static str {
        match self {
            GarmentKind::Dress => "full dress (replacing torso and legs)",
            other => other.label(),
        }
    }

    fn conflicts_with(self, other: GarmentKind) -> bool {
        match self {
            GarmentKind::Dress => matches!(other, GarmentKind::Top | GarmentKind::Bottom),
            GarmentKind::Top | GarmentKind::Bottom => other == GarmentKind::Dress,
            _ => false,
        }
    }
}

impl FromStr for GarmentKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_ascii_lowercase();
        GarmentKind::ALL
            .into_iter()
            .find(|kind| kind.key() == lowered)
            .ok_or_else(|| format!("unknown garment '{}'", raw.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Garment {
    pub id: String,
    pub kind: GarmentKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ref_image: Option<String>,
    #[serde(default)]
    pub active: bool,
}

impl Garment {
    pub fn new(kind: GarmentKind) -> Self {
        Self {
            id: kind.key().to_string(),
            kind,
            description: String::new(),
            ref_image: None,
            active: false,
        }
    }

    pub fn to_request(&self) -> GarmentRequest {
        GarmentRequest {
            region: self.kind.request_region().to_string(),
            description: self.description.trim().to_string(),
            ref_image: self.ref_image.clone(),
        }
    }
}

/// What the swap operation needs to know about one garment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GarmentRequest {
    pub region: String,
    pub description: String,
    pub ref_image: Option<String>,
}

/// The wardrobe shown by the swapper. At most one of {Dress} and {Top, Bottom}
/// is active at any time.
///
/// Serialized as a plain list. Loading a list re-applies that rule, keeping
/// the earlier of two conflicting garments, and restores any missing kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Garment>", into = "Vec<Garment>")]
pub struct GarmentSet {
    garments: Vec<Garment>,
}

impl From<Vec<Garment>> for GarmentSet {
    fn from(saved: Vec<Garment>) -> Self {
        let mut garments: Vec<Garment> = Vec::with_capacity(GarmentKind::ALL.len());
        for mut garment in saved {
            if garments.iter().any(|kept| kept.id == garment.id) {
                continue;
            }
            if garment.active
                && garments
                    .iter()
                    .any(|kept| kept.active && kept.kind.conflicts_with(garment.kind))
            {
                garment.active = false;
            }
            garments.push(garment);
        }
        for kind in GarmentKind::ALL {
            if !garments.iter().any(|garment| garment.kind == kind) {
                garments.push(Garment::new(kind));
            }
        }
        Self { garments }
    }
}

impl From<GarmentSet> for Vec<Garment> {
    fn from(set: GarmentSet) -> Self {
        set.garments
    }
}

impl Default for GarmentSet {
    fn default() -> Self {
        Self {
            garments: GarmentKind::ALL.into_iter().map(Garment::new).collect(),
        }
    }
}

impl GarmentSet {
    pub fn iter(&self) -> impl Iterator<Item = &Garment> {
        self.garments.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Garment> {
        self.garments.iter().find(|garment| garment.id == id)
    }

    /// Flips a garment and returns its new state, or `None` for an unknown id.
    pub fn toggle(&mut self, id: &str) -> Option<bool> {
        let current = self.get(id)?.active;
        self.set_active(id, !current);
        Some(!current)
    }

    pub fn set_active(&mut self, id: &str, active: bool) -> bool {
        let Some(kind) = self.get(id).map(|garment| garment.kind) else {
            return false;
        };
        for garment in &mut self.garments {
            if garment.id == id {
                garment.active = active;
            } else if active && kind.conflicts_with(garment.kind) {
                garment.active = false;
            }
        }
        true
    }

    pub fn set_description(&mut self, id: &str, description: impl Into<String>) -> bool {
        match self.garments.iter_mut().find(|garment| garment.id == id) {
            Some(garment) => {
                garment.description = description.into();
                true
            }
            None => false,
        }
    }

    pub fn set_reference(&mut self, id: &str, ref_image: Option<String>) -> bool {
        match self.garments.iter_mut().find(|garment| garment.id == id) {
            Some(garment) => {
                garment.ref_image = ref_image;
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &Garment> {
        self.garments.iter().filter(|garment| garment.active)
    }

    pub fn requests(&self) -> Vec<GarmentRequest> {
        self.active().map(Garment::to_request).collect()
    }
}
