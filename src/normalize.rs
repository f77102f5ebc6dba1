//! Modification normalization: turn a requested resolution and optional
//! crop into a concrete, valid `(output dimensions, crop)` pair for one
//! original image.
//!
//! # Output dimensions
//!
//! 1. Unset axes of the requested resolution are derived from the
//!    original's aspect ratio ([`Dimensions::normalize`]).
//! 2. The result is shrunk to fit the original; the original is never
//!    upscaled.
//! 3. Optional boundaries shrink it further.
//!
//! # Crop
//!
//! Without a requested crop, the crop is the largest centered rectangle of
//! the original matching the output's aspect ratio ([`default_crop`]). A
//! requested crop may have been drawn on a scaled preview (`source`) shown
//! inside a viewport (`bounding_box`); [`normalize_crop`] fits the source
//! into the box, snaps the edges into the source, and re-projects them onto
//! the original.
//!
//! A crop with a zero axis after all of this is a [`ValidationError`].

use crate::geometry::{Crop, Dimensions};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::geometry::{area, intersect};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Requested resolution has neither width nor height")]
    EmptyResolution,
    #[error("Crop {crop} is empty after normalizing against {original}")]
    EmptyCrop { crop: Crop, original: Dimensions },
    #[error("Original dimensions {0} have a zero axis")]
    UndefinedOriginal(Dimensions),
}

/// A crop as submitted by an editor, possibly against a scaled preview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRequest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Size of the image the coordinates refer to. Unset means the original.
    #[serde(default)]
    pub source: Dimensions,
    /// Viewport the source was displayed in. Unset means no viewport.
    #[serde(default, rename = "box")]
    pub bounding_box: Dimensions,
}

impl From<Crop> for CropRequest {
    fn from(crop: Crop) -> Self {
        Self {
            x: crop.x,
            y: crop.y,
            width: crop.width,
            height: crop.height,
            source: Dimensions::default(),
            bounding_box: Dimensions::default(),
        }
    }
}

/// What a caller asks to render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationRequest {
    pub resolution: Dimensions,
    #[serde(default)]
    pub boundaries: Option<Dimensions>,
    #[serde(default)]
    pub crop: Option<CropRequest>,
}

impl ModificationRequest {
    pub fn new(resolution: Dimensions) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }

    pub fn with_crop(mut self, crop: impl Into<CropRequest>) -> Self {
        self.crop = Some(crop.into());
        self
    }

    pub fn with_boundaries(mut self, boundaries: Dimensions) -> Self {
        self.boundaries = Some(boundaries);
        self
    }
}

/// A request resolved against a real original.
///
/// `crop` lies inside the original and has two positive axes; `output` is
/// no larger than the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedModification {
    pub output: Dimensions,
    pub crop: Crop,
}

/// Resolve `request` against an original of size `original`.
pub fn normalize(
    original: Dimensions,
    request: &ModificationRequest,
) -> Result<NormalizedModification, ValidationError> {
    let output = output_dimensions(original, request.resolution, request.boundaries)?;
    let crop = match &request.crop {
        Some(crop) => normalize_crop(original, crop)?,
        None => default_crop(original, output),
    };
    Ok(NormalizedModification { output, crop })
}

/// Output size for `requested` against `original`, shrunk into
/// `boundaries` when given.
pub fn output_dimensions(
    original: Dimensions,
    requested: Dimensions,
    boundaries: Option<Dimensions>,
) -> Result<Dimensions, ValidationError> {
    check_original(original)?;
    if requested.is_unset() {
        return Err(ValidationError::EmptyResolution);
    }
    let mut output = requested.normalize(original).scale_to_fit_in(original);
    if let Some(bound) = boundaries.filter(|b| !b.is_unset()) {
        output = output.scale_to_fit_in(bound.normalize(output));
    }
    Ok(output)
}

/// Largest centered rectangle of `original` with the aspect ratio of
/// `target`. The whole original when the ratios already match.
pub fn default_crop(original: Dimensions, target: Dimensions) -> Crop {
    let (Some(original_ratio), Some(target_ratio)) = (original.aspect_ratio(), target.aspect_ratio())
    else {
        return Crop::whole(original);
    };
    if original_ratio == target_ratio {
        return Crop::whole(original);
    }

    let sized = if target_ratio.is_larger_on_width() {
        Dimensions::new(original.width, target_ratio.height_for_width(original.width))
    } else {
        Dimensions::new(target_ratio.width_for_height(original.height), original.height)
    };
    let fitted = sized.scale_to_fit_in(original);
    Crop::new(
        (original.width - fitted.width) / 2,
        (original.height - fitted.height) / 2,
        fitted.width,
        fitted.height,
    )
}

/// Translate an editor crop into original pixel space.
pub fn normalize_crop(original: Dimensions, request: &CropRequest) -> Result<Crop, ValidationError> {
    check_original(original)?;

    let mut source = request.source.normalize(original);
    if !request.bounding_box.is_unset() {
        source = source.scale_to_fit_in(request.bounding_box.normalize(original));
    }

    let snap = |pos: u64, max: u32| pos.min(u64::from(max));
    let left = snap(u64::from(request.x), source.width);
    let top = snap(u64::from(request.y), source.height);
    let right = snap(u64::from(request.x) + u64::from(request.width), source.width);
    let bottom = snap(u64::from(request.y) + u64::from(request.height), source.height);

    let crop = if source == original || source.aspect_ratio().is_none() {
        // snapped edges are bounded by a u32 axis
        Crop::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
    } else {
        let project = |value: u64, to: u32, from: u32| {
            (value * u64::from(to) / u64::from(from)) as u32
        };
        Crop::new(
            project(left, original.width, source.width),
            project(top, original.height, source.height),
            project(right - left, original.width, source.width),
            project(bottom - top, original.height, source.height),
        )
    };

    if crop.is_empty() {
        return Err(ValidationError::EmptyCrop { crop, original });
    }
    Ok(crop)
}

fn check_original(original: Dimensions) -> Result<(), ValidationError> {
    if original.aspect_ratio().is_none() {
        return Err(ValidationError::UndefinedOriginal(original));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: Dimensions = Dimensions::new(4000, 2000);

    fn crop_request(x: u32, y: u32, width: u32, height: u32) -> CropRequest {
        CropRequest::from(Crop::new(x, y, width, height))
    }

    // =========================================================================
    // Output dimensions
    // =========================================================================

    #[test]
    fn output_derives_unset_axis() {
        let output = output_dimensions(ORIGINAL, Dimensions::new(1000, 0), None).unwrap();
        assert_eq!(output, Dimensions::new(1000, 500));
    }

    #[test]
    fn output_never_exceeds_original() {
        let output = output_dimensions(ORIGINAL, Dimensions::new(8000, 4000), None).unwrap();
        assert_eq!(output, ORIGINAL);

        let output = output_dimensions(ORIGINAL, Dimensions::new(3000, 3000), None).unwrap();
        assert_eq!(output, Dimensions::new(2000, 2000));
    }

    #[test]
    fn output_respects_boundaries() {
        let output = output_dimensions(
            ORIGINAL,
            Dimensions::new(2000, 1000),
            Some(Dimensions::new(500, 500)),
        )
        .unwrap();
        assert_eq!(output, Dimensions::new(500, 250));
    }

    #[test]
    fn output_partial_boundary_uses_output_ratio() {
        let output = output_dimensions(
            ORIGINAL,
            Dimensions::new(2000, 2000),
            Some(Dimensions::new(0, 300)),
        )
        .unwrap();
        assert_eq!(output, Dimensions::new(300, 300));
    }

    #[test]
    fn output_rejects_unset_resolution() {
        assert_eq!(
            output_dimensions(ORIGINAL, Dimensions::new(0, 0), None),
            Err(ValidationError::EmptyResolution)
        );
    }

    #[test]
    fn output_rejects_undefined_original() {
        assert_eq!(
            output_dimensions(Dimensions::new(0, 10), Dimensions::new(5, 5), None),
            Err(ValidationError::UndefinedOriginal(Dimensions::new(0, 10)))
        );
    }

    // =========================================================================
    // Default crop
    // =========================================================================

    #[test]
    fn default_crop_same_ratio_is_whole_image() {
        let result = normalize(ORIGINAL, &ModificationRequest::new(Dimensions::new(2000, 1000)))
            .unwrap();
        assert_eq!(result.crop, Crop::new(0, 0, 4000, 2000));
        assert_eq!(result.output, Dimensions::new(2000, 1000));
    }

    #[test]
    fn default_crop_wider_target_is_centered_band() {
        let result = normalize(ORIGINAL, &ModificationRequest::new(Dimensions::new(4000, 1000)))
            .unwrap();
        assert_eq!(result.crop, Crop::new(0, 500, 4000, 1000));
    }

    #[test]
    fn default_crop_square_target_is_centered() {
        assert_eq!(
            default_crop(ORIGINAL, Dimensions::new(1000, 1000)),
            Crop::new(1000, 0, 2000, 2000)
        );
    }

    #[test]
    fn default_crop_landscape_target_on_landscape_original() {
        // 3:2 is narrower than 2:1, so the full height is kept
        assert_eq!(
            default_crop(ORIGINAL, Dimensions::new(300, 200)),
            Crop::new(500, 0, 3000, 2000)
        );
    }

    #[test]
    fn default_crop_wide_target_on_portrait_original() {
        assert_eq!(
            default_crop(Dimensions::new(1000, 3000), Dimensions::new(200, 100)),
            Crop::new(0, 1250, 1000, 500)
        );
    }

    // =========================================================================
    // Requested crop
    // =========================================================================

    #[test]
    fn crop_in_original_space_is_kept() {
        let request = ModificationRequest::new(Dimensions::new(1000, 1000))
            .with_crop(crop_request(1, 2, 3, 4));
        assert_eq!(normalize(ORIGINAL, &request).unwrap().crop, Crop::new(1, 2, 3, 4));
    }

    #[test]
    fn crop_edges_snap_into_original() {
        let crop = normalize_crop(ORIGINAL, &crop_request(3500, 1800, 1000, 1000)).unwrap();
        assert_eq!(crop, Crop::new(3500, 1800, 500, 200));
    }

    #[test]
    fn crop_outside_original_is_rejected() {
        let result = normalize_crop(ORIGINAL, &crop_request(4000, 0, 100, 100));
        assert!(matches!(result, Err(ValidationError::EmptyCrop { .. })));
    }

    #[test]
    fn zero_area_crop_is_rejected() {
        let result = normalize_crop(ORIGINAL, &crop_request(10, 10, 0, 100));
        assert!(matches!(result, Err(ValidationError::EmptyCrop { .. })));
    }

    #[test]
    fn crop_from_scaled_source_is_reprojected() {
        let request = CropRequest {
            source: Dimensions::new(1000, 500),
            ..crop_request(100, 50, 200, 100)
        };
        assert_eq!(
            normalize_crop(ORIGINAL, &request).unwrap(),
            Crop::new(400, 200, 800, 400)
        );
    }

    #[test]
    fn crop_source_with_unset_axis_uses_original_ratio() {
        let request = CropRequest {
            source: Dimensions::new(1000, 0),
            ..crop_request(0, 0, 500, 500)
        };
        assert_eq!(
            normalize_crop(ORIGINAL, &request).unwrap(),
            Crop::new(0, 0, 2000, 2000)
        );
    }

    #[test]
    fn crop_source_is_fitted_into_box() {
        // the 4000x2000 original shown in an 800x800 viewport is 800x400
        let request = CropRequest {
            bounding_box: Dimensions::new(800, 800),
            ..crop_request(200, 100, 400, 200)
        };
        assert_eq!(
            normalize_crop(ORIGINAL, &request).unwrap(),
            Crop::new(1000, 500, 2000, 1000)
        );
    }

    #[test]
    fn reprojected_crop_stays_inside_original() {
        let original = Dimensions::new(1001, 777);
        let request = CropRequest {
            source: Dimensions::new(333, 259),
            ..crop_request(0, 0, 333, 259)
        };
        let crop = normalize_crop(original, &request).unwrap();
        assert!(crop.is_within(original));
    }

    #[test]
    fn helpers_are_reexported() {
        let a = Crop::new(1000, 1000, 1000, 1000);
        assert_eq!(area(&a), 1_000_000);
        assert_eq!(intersect(&a, &Crop::new(2001, 1000, 500, 500)), None);
    }
}
