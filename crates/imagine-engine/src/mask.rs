//! Paint mask for inpainting requests.
//!
//! The surface always has the loaded image's native size. Pointer positions
//! arrive in display coordinates and are rescaled before rasterizing.

use std::io::Cursor;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use imagine_contracts::panels::BrushMode;
use serde::{Deserialize, Serialize};

use crate::data_uri::encode_data_uri;

pub const MASK_PAINT: Rgba<u8> = Rgba([255, 0, 0, 255]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// One recorded pointer stroke, in display coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStroke {
    #[serde(default)]
    pub mode: BrushMode,
    /// Display-space radius; the compositor's current radius when absent.
    #[serde(default)]
    pub radius: Option<f32>,
    pub points: Vec<[f32; 2]>,
}

#[derive(Debug, Clone)]
pub struct MaskCompositor {
    surface: RgbaImage,
    display_size: (u32, u32),
    mode: BrushMode,
    brush_radius: f32,
    cursor: Option<(f32, f32)>,
    has_mask: bool,
}

impl Default for MaskCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskCompositor {
    pub fn new() -> Self {
        Self {
            surface: RgbaImage::new(0, 0),
            display_size: (0, 0),
            mode: BrushMode::Paint,
            brush_radius: 10.0,
            cursor: None,
            has_mask: false,
        }
    }

    /// Starts over on a fresh transparent surface of the image's native
    /// size. The display size defaults to the native size.
    pub fn load_base(&mut self, width: u32, height: u32) {
        self.surface = RgbaImage::from_pixel(width, height, CLEAR);
        self.display_size = (width, height);
        self.cursor = None;
        self.has_mask = false;
    }

    pub fn set_display_size(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.display_size = (width, height);
        }
    }

    pub fn set_mode(&mut self, mode: BrushMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> BrushMode {
        self.mode
    }

    pub fn set_brush_radius(&mut self, radius: f32) {
        if radius.is_finite() && radius > 0.0 {
            self.brush_radius = radius;
        }
    }

    pub fn brush_radius(&self) -> f32 {
        self.brush_radius
    }

    pub fn begin_stroke(&mut self, point: (f32, f32)) {
        let native = self.to_native(point);
        self.stamp(native);
        self.cursor = Some(native);
    }

    /// Ignored unless a stroke is in progress.
    pub fn extend_stroke(&mut self, point: (f32, f32)) {
        let Some(previous) = self.cursor else {
            return;
        };
        let native = self.to_native(point);
        self.draw_segment(previous, native);
        self.cursor = Some(native);
    }

    pub fn end_stroke(&mut self) {
        if self.cursor.take().is_some() {
            self.has_mask = true;
        }
    }

    pub fn apply(&mut self, stroke: &MaskStroke) {
        let Some((first, rest)) = stroke.points.split_first() else {
            return;
        };
        self.set_mode(stroke.mode);
        if let Some(radius) = stroke.radius {
            self.set_brush_radius(radius);
        }
        self.begin_stroke((first[0], first[1]));
        for point in rest {
            self.extend_stroke((point[0], point[1]));
        }
        self.end_stroke();
    }

    /// True once any stroke has been committed on the current base.
    pub fn has_mask(&self) -> bool {
        self.has_mask
    }

    pub fn painted_pixels(&self) -> usize {
        self.surface.pixels().filter(|pixel| pixel[3] > 0).count()
    }

    pub fn clear(&mut self) {
        for pixel in self.surface.pixels_mut() {
            *pixel = CLEAR;
        }
        self.cursor = None;
        self.has_mask = false;
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// PNG export, or `None` when nothing has been painted.
    pub fn to_png(&self) -> Result<Option<Vec<u8>>> {
        if !self.has_mask {
            return Ok(None);
        }
        let mut out = Cursor::new(Vec::new());
        self.surface
            .write_to(&mut out, ImageFormat::Png)
            .context("mask PNG encode failed")?;
        Ok(Some(out.into_inner()))
    }

    pub fn to_data_uri(&self) -> Result<Option<String>> {
        Ok(self
            .to_png()?
            .map(|bytes| encode_data_uri("image/png", &bytes)))
    }

    fn scale(&self) -> (f32, f32) {
        let (native_w, native_h) = self.surface.dimensions();
        let (display_w, display_h) = self.display_size;
        if display_w == 0 || display_h == 0 {
            return (1.0, 1.0);
        }
        (
            native_w as f32 / display_w as f32,
            native_h as f32 / display_h as f32,
        )
    }

    fn to_native(&self, point: (f32, f32)) -> (f32, f32) {
        let (sx, sy) = self.scale();
        (point.0 * sx, point.1 * sy)
    }

    fn native_radius(&self) -> f32 {
        (self.brush_radius * self.scale().0).max(0.5)
    }

    fn draw_segment(&mut self, start: (f32, f32), end: (f32, f32)) {
        let dx = end.0 - start.0;
        let dy = end.1 - start.1;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance < 0.1 {
            self.stamp(end);
            return;
        }
        // One stamp per native pixel keeps the stroke gap-free.
        let steps = distance.ceil() as u32;
        for idx in 1..=steps {
            let t = idx as f32 / steps as f32;
            self.stamp((start.0 + dx * t, start.1 + dy * t));
        }
    }

    fn stamp(&mut self, center: (f32, f32)) {
        let (width, height) = self.surface.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let radius = self.native_radius();
        let color = match self.mode {
            BrushMode::Paint => MASK_PAINT,
            BrushMode::Erase => CLEAR,
        };
        let min_x = (center.0 - radius).floor().max(0.0) as u32;
        let min_y = (center.1 - radius).floor().max(0.0) as u32;
        let max_x = (center.0 + radius).ceil().min(width as f32 - 1.0);
        let max_y = (center.1 + radius).ceil().min(height as f32 - 1.0);
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }
        let radius_sq = radius * radius;
        for y in min_y..=max_y as u32 {
            for x in min_x..=max_x as u32 {
                let px = x as f32 + 0.5 - center.0;
                let py = y as f32 + 0.5 - center.1;
                if px * px + py * py <= radius_sq {
                    self.surface.put_pixel(x, y, color);
                }
            }
        }
    }
}
