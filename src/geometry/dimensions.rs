//! Width/height pairs and the two derived operations every resolution
//! passes through: [`Dimensions::normalize`] and [`Dimensions::scale_to_fit_in`].
//!
//! A zero axis means "unset": `800x0` asks for an 800px wide output whose
//! height follows the reference's aspect ratio.

use super::aspect::AspectRatio;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both axes unset.
    pub fn is_unset(&self) -> bool {
        self.width == 0 && self.height == 0
    }

    /// `None` when either axis is zero.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::new(self.width, self.height)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn fits_in(&self, bound: Dimensions) -> bool {
        self.width <= bound.width && self.height <= bound.height
    }

    /// Same aspect ratio, compared as `w1 * h2 == w2 * h1`.
    ///
    /// Two rectangles with a zero axis never share a ratio.
    pub fn same_ratio(&self, other: Dimensions) -> bool {
        if self.aspect_ratio().is_none() || other.aspect_ratio().is_none() {
            return false;
        }
        u64::from(self.width) * u64::from(other.height)
            == u64::from(other.width) * u64::from(self.height)
    }

    /// Fill unset axes from `reference`.
    ///
    /// | self | result |
    /// |------|--------|
    /// | `0x0` | `reference` |
    /// | `Wx0` | `W x height_for_width(W)` at the reference ratio |
    /// | `0xH` | `width_for_height(H) x H` at the reference ratio |
    /// | `WxH` | unchanged |
    ///
    /// An unset axis stays unset when the reference has no ratio itself.
    pub fn normalize(&self, reference: Dimensions) -> Dimensions {
        if self.is_unset() {
            return reference;
        }
        let Some(ratio) = reference.aspect_ratio() else {
            return *self;
        };
        if self.height == 0 {
            Dimensions::new(self.width, ratio.height_for_width(self.width).max(1))
        } else if self.width == 0 {
            Dimensions::new(ratio.width_for_height(self.height).max(1), self.height)
        } else {
            *self
        }
    }

    /// Proportionally shrink (never grow) so the result fits inside `bound`.
    ///
    /// Unset axes are normalized against `bound` first. If the result is
    /// still too large it is scaled on its dominant axis, and if that does
    /// not fit, on the other one. Each axis keeps at least one pixel.
    pub fn scale_to_fit_in(&self, bound: Dimensions) -> Dimensions {
        let normalized = self.normalize(bound);
        if normalized.fits_in(bound) {
            return normalized;
        }
        let clamp = |d: Dimensions| {
            Dimensions::new(d.width.min(bound.width), d.height.min(bound.height))
        };
        let Some(ratio) = normalized.aspect_ratio() else {
            return clamp(normalized);
        };

        let by_width = Dimensions::new(bound.width, ratio.height_for_width(bound.width).max(1));
        let by_height = Dimensions::new(ratio.width_for_height(bound.height).max(1), bound.height);
        let (first, second) = if ratio.is_larger_on_width() {
            (by_width, by_height)
        } else {
            (by_height, by_width)
        };

        if first.fits_in(bound) {
            first
        } else {
            clamp(second)
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
