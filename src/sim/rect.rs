//! Axis-aligned rectangles
//!
//! Two flavours:
//! - [`Bounds`]: world-space float rectangle (entity extents, viewport)
//! - [`Region`]: integer pixel rectangle (dirty regions, clip rects)
//!
//! [`Region::covering`] is the single place float bounds become pixels, so the
//! dirty-rect bookkeeping and the rasterizer always agree on which pixels an
//! entity touches.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// World-space rectangle: top-left corner plus size
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub pos: Vec2,
    pub size: Vec2,
}

impl Bounds {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            pos: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    pub fn from_center(center: Vec2, half_extent: Vec2) -> Self {
        Self {
            pos: center - half_extent,
            size: half_extent * 2.0,
        }
    }

    /// Bottom-right corner (exclusive)
    #[inline]
    pub fn max(&self) -> Vec2 {
        self.pos + self.size
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.pos + self.size * 0.5
    }

    /// True if the interiors overlap (touching edges do not count)
    #[inline]
    pub fn intersects(&self, other: &Bounds) -> bool {
        let a_max = self.max();
        let b_max = other.max();
        self.pos.x < b_max.x && other.pos.x < a_max.x && self.pos.y < b_max.y && other.pos.y < a_max.y
    }

    /// Grow by `margin` on every side
    pub fn expand(&self, margin: f32) -> Self {
        Self {
            pos: self.pos - Vec2::splat(margin),
            size: self.size + Vec2::splat(margin * 2.0),
        }
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Bounds) -> Self {
        let min = self.pos.min(other.pos);
        let max = self.max().max(other.max());
        Self {
            pos: min,
            size: max - min,
        }
    }

    pub fn translate(&self, offset: Vec2) -> Self {
        Self {
            pos: self.pos + offset,
            size: self.size,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.pos.is_finite() && self.size.is_finite()
    }
}

/// Pixel rectangle; `w`/`h` of zero or less means empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Region {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Smallest pixel rectangle fully covering `bounds`
    pub fn covering(bounds: &Bounds) -> Self {
        let min = bounds.pos.floor();
        let max = bounds.max().ceil();
        let x = min.x as i32;
        let y = min.y as i32;
        Self {
            x,
            y,
            w: (max.x as i32).saturating_sub(x),
            h: (max.y as i32).saturating_sub(y),
        }
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.w)
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.h)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.w as u64 * self.h as u64
        }
    }

    pub fn intersects(&self, other: &Region) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn intersection(&self, other: &Region) -> Option<Region> {
        if !self.intersects(other) {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        Some(Region {
            x,
            y,
            w: self.right().min(other.right()) - x,
            h: self.bottom().min(other.bottom()) - y,
        })
    }

    /// Bounding box of both; an empty side is ignored
    pub fn union(&self, other: &Region) -> Region {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Region {
            x,
            y,
            w: self.right().max(other.right()) - x,
            h: self.bottom().max(other.bottom()) - y,
        }
    }

    /// Grow by `padding` pixels on every side
    pub fn pad(&self, padding: i32) -> Region {
        Region {
            x: self.x.saturating_sub(padding),
            y: self.y.saturating_sub(padding),
            w: self.w.saturating_add(padding.saturating_mul(2)),
            h: self.h.saturating_add(padding.saturating_mul(2)),
        }
    }

    /// Clip to `frame`; empty when fully outside
    pub fn clamp_to(&self, frame: &Region) -> Region {
        self.intersection(frame).unwrap_or_default()
    }

    pub fn contains(&self, other: &Region) -> bool {
        other.is_empty()
            || (self.x <= other.x
                && self.y <= other.y
                && self.right() >= other.right()
                && self.bottom() >= other.bottom())
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}
