//! Pure value geometry shared by every resolution step.
//!
//! | Type | Role |
//! |------|------|
//! | [`AspectRatio`] | Reduced `width:height` fraction, compared by cross-multiplication |
//! | [`Dimensions`] | Width/height pair; zero axes are unset and filled by [`Dimensions::normalize`] |
//! | [`Crop`] | Rectangle in original-image pixel space |
//!
//! Nothing here allocates or fails.

mod aspect;
mod crop;
mod dimensions;

pub use aspect::AspectRatio;
pub use crop::Crop;
pub use dimensions::Dimensions;

/// `width * height` of a crop.
pub fn area(crop: &Crop) -> u64 {
    crop.area()
}

/// Overlap of two crops, `None` when disjoint or only touching.
pub fn intersect(a: &Crop, b: &Crop) -> Option<Crop> {
    a.intersect(b)
}
