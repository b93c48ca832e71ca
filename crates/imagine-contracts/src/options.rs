//! Closed option sets for the form fields the prompt assembler consumes.
//!
//! Each category is a fixed list of named tags; categories that accept free
//! text carry an `Other(String)` variant whose text is rendered in place of a
//! tag name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Something that renders into a comma-joined tag list.
pub trait TagLabel {
    /// Human-readable label, or `None` when the tag contributes nothing
    /// (an `Other` with blank text).
    fn label(&self) -> Option<&str>;
}

/// Renders selections as `a, b, c`, substituting custom text for `Other`.
pub fn render_tags<T: TagLabel>(tags: &[T]) -> String {
    tags.iter()
        .filter_map(TagLabel::label)
        .collect::<Vec<&str>>()
        .join(", ")
}

macro_rules! tag_set {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => ($key:literal, $label:literal),)+
        }
        $(other: $other:ident)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant,)+
            $($other(String),)?
        }

        impl $name {
            /// Every named variant, in menu order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Stable key used on the command line.
            pub fn key(&self) -> &str {
                match self {
                    $($name::$variant => $key,)+
                    $($name::$other(_) => "other",)?
                }
            }
        }

        impl TagLabel for $name {
            fn label(&self) -> Option<&str> {
                match self {
                    $($name::$variant => Some($label),)+
                    $($name::$other(text) => {
                        let trimmed = text.trim();
                        if trimmed.is_empty() {
                            None
                        } else {
                            Some(trimmed)
                        }
                    })?
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let trimmed = raw.trim();
                $(
                    if let Some(text) = trimmed
                        .strip_prefix("other:")
                        .or_else(|| trimmed.strip_prefix("Other:"))
                    {
                        return Ok($name::$other(text.trim().to_string()));
                    }
                )?
                let lowered = trimmed.to_ascii_lowercase();
                $name::ALL
                    .iter()
                    .find(|tag| tag.key() == lowered)
                    .cloned()
                    .ok_or_else(|| format!("unknown {} '{trimmed}'", stringify!($name)))
            }
        }
    };
}

tag_set! {
    /// Camera angle the output must respect.
    ViewAngle {
        Frontal => ("frontal", "Frontal"),
        Side => ("side", "Side"),
        ThreeQuarter => ("three_quarter", "3/4"),
        Back => ("back", "Back"),
        Isometric => ("isometric", "Isometric"),
        HighAngle => ("high_angle", "High angle (plongée)"),
        LowAngle => ("low_angle", "Low angle (contre-plongée)"),
        TopDown => ("top_down", "Top-down"),
    }
}

impl Default for ViewAngle {
    fn default() -> Self {
        Self::Frontal
    }
}

tag_set! {
    MaterialTag {
        Metal => ("metal", "Metal"),
        Paint => ("paint", "Paint"),
        Fabric => ("fabric", "Fabric"),
        Eva => ("eva", "EVA foam"),
        Plush => ("plush", "Plush"),
        Latex => ("latex", "Latex"),
        Print3d => ("print_3d", "3D print"),
        Plastic => ("plastic", "Plastic"),
        KeepDigital => ("keep_digital", "Keep digital"),
    }
    other: Other
}

tag_set! {
    StyleTag {
        Antique => ("antique", "Antique"),
        Logo => ("logo", "Logo"),
        Modern => ("modern", "Modern"),
        Hatching => ("hatching", "Hatching"),
        Pixar => ("pixar", "Pixar art"),
        Disney => ("disney", "Disney style"),
        Cinematic => ("cinematic", "Cinematic"),
        Anime => ("anime", "Anime"),
        Manga => ("manga", "Manga"),
        Minimalist => ("minimalist", "Minimalist"),
        Surrealist => ("surrealist", "Surrealist"),
        Futurist => ("futurist", "Futurist"),
        Cyberpunk => ("cyberpunk", "Cyberpunk"),
        Vintage => ("vintage", "Vintage"),
        Retro => ("retro", "Retro"),
        Realistic => ("realistic", "Realistic"),
        Abstract => ("abstract", "Abstract"),
        PopArt => ("pop_art", "Pop art"),
        Steampunk => ("steampunk", "Steampunk"),
        Expressionist => ("expressionist", "Expressionist"),
        Cartoon => ("cartoon", "Cartoon"),
        Comics => ("comics", "Comics"),
    }
    other: Other
}

tag_set! {
    /// Sub-styles that only apply when [`StyleTag::Logo`] is selected.
    LogoStyle {
        Minimalist => ("minimalist", "Minimalist"),
        Typographic => ("typographic", "Typographic"),
        Monogram => ("monogram", "Monogram"),
        Abstract => ("abstract", "Abstract"),
        Mascot => ("mascot", "Mascot"),
        Emblem => ("emblem", "Emblem / seal"),
        Pictorial => ("pictorial", "Pictorial"),
        Lettermark => ("lettermark", "Lettermark"),
        Wordmark => ("wordmark", "Wordmark"),
        Flat => ("flat", "Flat design"),
        Isometric => ("isometric", "3D / isometric"),
        Vintage => ("vintage", "Vintage / retro"),
        Futurist => ("futurist", "Futurist / tech"),
        Geometric => ("geometric", "Geometric"),
        Illustrative => ("illustrative", "Illustrative"),
        Neumorphism => ("neumorphism", "Neumorphism / soft UI"),
        Gradient => ("gradient", "Gradient / colorful"),
        NegativeSpace => ("negative_space", "Negative space"),
        Dynamic => ("dynamic", "Dynamic / responsive"),
        Luxury => ("luxury", "Minimal luxury"),
    }
    other: Other
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMode {
    #[default]
    Neutral,
    Descriptive(String),
}

/// Aspect ratios accepted by the image backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "3:4")]
    Portrait3x4,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape16x9,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait3x4,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait3x4 => "3:4",
        }
    }

    /// Width divided by height.
    pub fn ratio(self) -> f64 {
        match self {
            AspectRatio::Square => 1.0,
            AspectRatio::Portrait9x16 => 9.0 / 16.0,
            AspectRatio::Landscape16x9 => 16.0 / 9.0,
            AspectRatio::Landscape4x3 => 4.0 / 3.0,
            AspectRatio::Portrait3x4 => 3.0 / 4.0,
        }
    }

    /// Snaps pixel dimensions to the closest supported ratio.
    pub fn nearest(width: u32, height: u32) -> AspectRatio {
        if width == 0 || height == 0 {
            return AspectRatio::Square;
        }
        let target = width as f64 / height as f64;
        let mut best = AspectRatio::Square;
        let mut best_delta = f64::MAX;
        for candidate in AspectRatio::ALL {
            let delta = (candidate.ratio() - target).abs();
            if delta < best_delta {
                best = candidate;
                best_delta = delta;
            }
        }
        best
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == trimmed)
            .ok_or_else(|| {
                format!("unsupported aspect ratio '{trimmed}' (expected 1:1, 9:16, 16:9, 4:3 or 3:4)")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_tags_joins_labels_and_substitutes_other_text() {
        let styles = vec![
            StyleTag::Anime,
            StyleTag::Other("  watercolor bleed ".to_string()),
            StyleTag::PopArt,
        ];
        assert_eq!(render_tags(&styles), "Anime, watercolor bleed, Pop art");
    }

    #[test]
    fn render_tags_skips_blank_other() {
        let materials = vec![MaterialTag::Other("   ".to_string()), MaterialTag::Metal];
        assert_eq!(render_tags(&materials), "Metal");
        assert_eq!(render_tags::<MaterialTag>(&[]), "");
    }

    #[test]
    fn tags_parse_from_keys_and_other_prefix() {
        assert_eq!("Pop_Art".parse::<StyleTag>(), Ok(StyleTag::PopArt));
        assert_eq!(
            "other: chrome airbrush".parse::<StyleTag>(),
            Ok(StyleTag::Other("chrome airbrush".to_string()))
        );
        assert_eq!("top_down".parse::<ViewAngle>(), Ok(ViewAngle::TopDown));
        assert!("other:x".parse::<ViewAngle>().is_err());
        assert!("sparkly".parse::<MaterialTag>().is_err());
    }

    #[test]
    fn tags_serialize_as_snake_case_with_tagged_other() -> anyhow::Result<()> {
        let encoded = serde_json::to_value(vec![
            StyleTag::PopArt,
            StyleTag::Other("ink wash".to_string()),
        ])?;
        assert_eq!(encoded, serde_json::json!(["pop_art", {"other": "ink wash"}]));
        let decoded: Vec<StyleTag> = serde_json::from_value(encoded)?;
        assert_eq!(decoded[1], StyleTag::Other("ink wash".to_string()));
        Ok(())
    }

    #[test]
    fn aspect_ratio_round_trips_through_display_and_parse() {
        for ratio in AspectRatio::ALL {
            assert_eq!(ratio.to_string().parse::<AspectRatio>(), Ok(ratio));
        }
        assert!("2:1".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn aspect_ratio_snaps_dimensions_to_nearest_supported() {
        assert_eq!(AspectRatio::nearest(1024, 1024), AspectRatio::Square);
        assert_eq!(AspectRatio::nearest(1080, 1920), AspectRatio::Portrait9x16);
        assert_eq!(AspectRatio::nearest(1920, 1080), AspectRatio::Landscape16x9);
        assert_eq!(AspectRatio::nearest(1200, 900), AspectRatio::Landscape4x3);
        assert_eq!(AspectRatio::nearest(900, 1200), AspectRatio::Portrait3x4);
        assert_eq!(AspectRatio::nearest(0, 10), AspectRatio::Square);
    }
}
