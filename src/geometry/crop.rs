//! Crop rectangles in original-image pixel space.

use super::dimensions::Dimensions;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned rectangle `(x, y, width, height)` within an original image.
///
/// Crops are plain `Copy` values; every operation returns a new crop.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Crop {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The rectangle covering an entire image.
    pub const fn whole(image: Dimensions) -> Self {
        Self::new(0, 0, image.width, image.height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn area(&self) -> u64 {
        self.dimensions().area()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Entirely inside `[0, bound.width] x [0, bound.height]`.
    pub fn is_within(&self, bound: Dimensions) -> bool {
        self.right() <= u64::from(bound.width) && self.bottom() <= u64::from(bound.height)
    }

    /// Overlapping region of two crops.
    ///
    /// Rectangles that merely touch along an edge do not intersect, and an
    /// empty rectangle intersects nothing.
    pub fn intersect(&self, other: &Crop) -> Option<Crop> {
        if self.is_empty() || other.is_empty() {
            return None;
        }
        if u64::from(other.x) >= self.right()
            || other.right() <= u64::from(self.x)
            || u64::from(other.y) >= self.bottom()
            || other.bottom() <= u64::from(self.y)
        {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        // right > x and bottom > y, both bounded by a u32 edge
        Some(Crop::new(
            x,
            y,
            (right - u64::from(x)) as u32,
            (bottom - u64::from(y)) as u32,
        ))
    }

    /// The part of this crop that lies inside an image of size `bound`.
    pub fn clip_to(&self, bound: Dimensions) -> Option<Crop> {
        self.intersect(&Crop::whole(bound))
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}
