//! Reduced aspect ratios.
//!
//! An [`AspectRatio`] is stored as a fraction reduced by its greatest common
//! divisor, so `4000:2000` and `2:1` compare equal. Ordering compares the
//! fractions by cross-multiplication in `u64`, never through floats.

use std::cmp::Ordering;
use std::fmt;

/// Width-to-height ratio of a rectangle with two positive axes.
///
/// There is no "undefined" ratio value: rectangles with a zero axis produce
/// `None` from [`AspectRatio::new`] and from
/// [`Dimensions::aspect_ratio`](super::Dimensions::aspect_ratio).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AspectRatio {
    numerator: u32,
    denominator: u32,
}

impl AspectRatio {
    /// Reduce `width:height`. Returns `None` when either side is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let divisor = gcd(width, height);
        Some(Self {
            numerator: width / divisor,
            denominator: height / divisor,
        })
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    /// True for landscape ratios (wider than tall).
    pub fn is_larger_on_width(&self) -> bool {
        self.numerator > self.denominator
    }

    /// Height matching `width` at this ratio, rounded half up.
    pub fn height_for_width(&self, width: u32) -> u32 {
        round_div(
            u64::from(self.denominator) * u64::from(width),
            u64::from(self.numerator),
        )
    }

    /// Width matching `height` at this ratio, rounded half up.
    pub fn width_for_height(&self, height: u32) -> u32 {
        round_div(
            u64::from(self.numerator) * u64::from(height),
            u64::from(self.denominator),
        )
    }
}

impl Ord for AspectRatio {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = u64::from(self.numerator) * u64::from(other.denominator);
        let rhs = u64::from(other.numerator) * u64::from(self.denominator);
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for AspectRatio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.numerator, self.denominator)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// `numerator / denominator` rounded half up, saturating at `u32::MAX`.
fn round_div(numerator: u64, denominator: u64) -> u32 {
    let (numerator, denominator) = (u128::from(numerator), u128::from(denominator));
    let rounded = (2 * numerator + denominator) / (2 * denominator);
    u32::try_from(rounded).unwrap_or(u32::MAX)
}
