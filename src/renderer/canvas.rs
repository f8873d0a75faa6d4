//! Presentation seam and a software rasterizer
//!
//! [`Canvas`] is what a backend implements to replay a [`DrawList`]. The
//! [`SoftwareCanvas`] here is an ARGB pixel buffer with a procedural
//! background and one solid colour per image. The headless demo renders
//! into it, and tests use it to check that incremental frames match full
//! redraws pixel for pixel.
//!
//! [`DrawList`]: super::DrawList

use std::collections::HashMap;

use glam::Vec2;

use super::draw::{BatchInstance, SpriteDraw};
use super::grid::{GRID_ALPHA, GridCell};
use crate::sim::{ImageHandle, Region};

/// Something a draw list can be replayed onto
pub trait Canvas {
    /// Frame size in pixels
    fn size(&self) -> (u32, u32);
    /// Restore background content inside `region`
    fn clear(&mut self, region: Region);
    fn draw_batch(&mut self, image: ImageHandle, instances: &[BatchInstance], clip: Region);
    fn draw_sprite(&mut self, sprite: &SpriteDraw, clip: Region);
    fn draw_grid(&mut self, cells: &[GridCell], clip: Region);
    fn draw_overlay(&mut self, lines: &[String], rect: Region, clip: Region);
    /// Flip the given regions to the screen
    fn present(&mut self, regions: &[Region]);
}

/// Pixel counters for the last presented frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanvasStats {
    pub cleared_pixels: u64,
    pub drawn_pixels: u64,
    pub presented_pixels: u64,
    pub frames_presented: u64,
}

/// Colour used for images nobody registered
const MISSING_IMAGE: u32 = 0xFFFF_00FF;
const OVERLAY_PANEL: u32 = 0xFF00_0000;
const OVERLAY_ALPHA: u8 = 128;
const OVERLAY_BORDER: u32 = 0xFFFF_FFFF;

/// ARGB8888 software frame buffer
#[derive(Debug, Clone)]
pub struct SoftwareCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    images: HashMap<ImageHandle, u32>,
    stats: CanvasStats,
    pending: CanvasStats,
}

impl SoftwareCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut canvas = Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
            images: HashMap::new(),
            stats: CanvasStats::default(),
            pending: CanvasStats::default(),
        };
        canvas.clear(canvas.frame());
        canvas.pending = CanvasStats::default();
        canvas
    }

    /// Register the colour an image is drawn with
    pub fn set_image_color(&mut self, image: ImageHandle, argb: u32) {
        self.images.insert(image, argb);
    }

    pub fn frame(&self) -> Region {
        Region::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.pixels[(y * self.width + x) as usize])
        } else {
            None
        }
    }

    /// Counters of the most recent `present`
    pub fn stats(&self) -> CanvasStats {
        self.stats
    }

    /// Background: dark checkerboard with a sparse star pattern
    #[inline]
    pub fn background_pixel(x: i32, y: i32) -> u32 {
        let h = (x as u32).wrapping_mul(73_856_093) ^ (y as u32).wrapping_mul(19_349_663);
        if h % 97 == 0 {
            return 0xFFE0_E0FF;
        }
        if ((x >> 4) + (y >> 4)) & 1 == 0 {
            0xFF10_1020
        } else {
            0xFF18_1830
        }
    }

    fn color_of(&self, image: ImageHandle) -> u32 {
        self.images.get(&image).copied().unwrap_or(MISSING_IMAGE)
    }

    /// Intersect with clip and frame; `None` when nothing is left
    fn clip_to_frame(&self, region: Region, clip: Region) -> Option<Region> {
        let clipped = region.intersection(&clip)?.intersection(&self.frame())?;
        debug_assert!(self.frame().contains(&clipped));
        Some(clipped)
    }

    #[inline]
    fn put(&mut self, x: i32, y: i32, color: u32, alpha: u8) {
        let idx = y as usize * self.width as usize + x as usize;
        self.pixels[idx] = if alpha == 255 {
            color
        } else {
            blend(color, self.pixels[idx], alpha)
        };
    }

    fn fill(&mut self, region: Region, clip: Region, color: u32, alpha: u8) {
        let Some(area) = self.clip_to_frame(region, clip) else {
            return;
        };
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                self.put(x, y, color, alpha);
            }
        }
        self.pending.drawn_pixels += area.area();
    }
}

/// Source-over blend of opaque `src` onto `dst` with coverage `alpha`
#[inline]
fn blend(src: u32, dst: u32, alpha: u8) -> u32 {
    let a = alpha as u32;
    let channel = |shift: u32| {
        let s = (src >> shift) & 0xFF;
        let d = (dst >> shift) & 0xFF;
        ((s * a + d * (255 - a)) / 255) << shift
    };
    0xFF00_0000 | channel(16) | channel(8) | channel(0)
}

impl Canvas for SoftwareCanvas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, region: Region) {
        let Some(area) = self.clip_to_frame(region, self.frame()) else {
            return;
        };
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                let idx = y as usize * self.width as usize + x as usize;
                self.pixels[idx] = Self::background_pixel(x, y);
            }
        }
        self.pending.cleared_pixels += area.area();
    }

    fn draw_batch(&mut self, image: ImageHandle, instances: &[BatchInstance], clip: Region) {
        let color = self.color_of(image);
        for instance in instances {
            self.fill(Region::covering(&instance.bounds()), clip, color, 255);
        }
    }

    fn draw_sprite(&mut self, sprite: &SpriteDraw, clip: Region) {
        let color = self.color_of(sprite.image);
        if sprite.rotation == 0.0 {
            self.fill(Region::covering(&sprite.bounds), clip, color, sprite.alpha);
            return;
        }

        // Rotated: test each pixel center against the rotated rectangle
        let center = sprite.bounds.center();
        let half = sprite.bounds.size * 0.5;
        let footprint = super::rotated_footprint(&sprite.bounds, sprite.rotation);
        let Some(area) = self.clip_to_frame(footprint, clip) else {
            return;
        };
        let (sin, cos) = sprite.rotation.sin_cos();
        let mut drawn = 0;
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                let d = Vec2::new(x as f32 + 0.5, y as f32 + 0.5) - center;
                let local = Vec2::new(d.x * cos + d.y * sin, -d.x * sin + d.y * cos);
                if local.x.abs() <= half.x && local.y.abs() <= half.y {
                    self.put(x, y, color, sprite.alpha);
                    drawn += 1;
                }
            }
        }
        self.pending.drawn_pixels += drawn;
    }

    fn draw_grid(&mut self, cells: &[GridCell], clip: Region) {
        for cell in cells {
            self.fill(cell.rect, clip, cell.color(), GRID_ALPHA);
        }
    }

    fn draw_overlay(&mut self, _lines: &[String], rect: Region, clip: Region) {
        // Glyphs are left to real backends; the panel and border are enough here
        self.fill(rect, clip, OVERLAY_PANEL, OVERLAY_ALPHA);
        let edges = [
            Region::new(rect.x, rect.y, rect.w, 1),
            Region::new(rect.x, rect.bottom() - 1, rect.w, 1),
            Region::new(rect.x, rect.y, 1, rect.h),
            Region::new(rect.right() - 1, rect.y, 1, rect.h),
        ];
        for edge in edges {
            self.fill(edge, clip, OVERLAY_BORDER, 255);
        }
    }

    fn present(&mut self, regions: &[Region]) {
        let frame = self.frame();
        self.pending.presented_pixels = regions.iter().map(|r| r.clamp_to(&frame).area()).sum();
        self.pending.frames_presented = self.stats.frames_presented + 1;
        self.stats = self.pending;
        self.pending = CanvasStats::default();
    }
}
