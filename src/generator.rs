//! Crop candidate generation and selection.
//!
//! When no registered modification can be reused as-is, every known crop of
//! the image is turned into a proposal for the requested output shape and
//! the best proposal wins. The whole image always takes part, so there is
//! always an answer.
//!
//! # Turning a crop into a candidate
//!
//! | Existing crop vs. target | Tactic | Measures |
//! |---|---|---|
//! | fits inside target on both axes | **extend** about its center to the target size, shifting back inside the image | `extension = (new - old) / new`, no cut |
//! | larger on an axis, reshaped crop fits the image | **reshape**: grow the short axis to the target ratio | `extension` from area growth, `scale = new width / target width` |
//! | larger on an axis, reshaped crop exceeds the image | **reshape and cut**: span the image on that axis, shrink the other | `cut = 1 - overlap / old area`, `scale` as above |
//!
//! # Choosing
//!
//! First match wins:
//!
//! 1. Non-cutting same-context candidates: among those within
//!    [`EXTENSION_TOLERANCE`] of the least extension, the smallest scale.
//! 2. The same over other-context candidates (including the whole image).
//! 3. The least cutting candidate overall.
//!
//! Remaining ties go to the smallest crop, then the lowest source
//! resolution id; the whole image, having no resolution, comes last.
//! Identical crops in one set count once, keeping the lowest resolution id.

use crate::geometry::{Crop, Dimensions};
use crate::types::ResolutionId;
use std::cmp::Ordering;

/// Cut-off below which a candidate counts as non-cutting.
pub const NEGLIGIBLE_CUT_OFF: f64 = 0.00001;

/// Extension slack within which a smaller scale factor beats a tighter fit.
pub const EXTENSION_TOLERANCE: f64 = 0.05;

/// An existing crop offered to the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCrop {
    pub crop: Crop,
    /// Resolution the crop was registered for; `None` for the whole image.
    pub resolution_id: Option<ResolutionId>,
}

impl SourceCrop {
    pub fn registered(crop: Crop, resolution_id: ResolutionId) -> Self {
        Self {
            crop,
            resolution_id: Some(resolution_id),
        }
    }

    pub fn whole_image(image: Dimensions) -> Self {
        Self {
            crop: Crop::whole(image),
            resolution_id: None,
        }
    }
}

/// A scored proposal. Lives for one generation call only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropCandidate {
    pub crop: Crop,
    pub extension: f64,
    pub cut_off: f64,
    pub scale_factor: f64,
    pub source: Option<ResolutionId>,
}

impl CropCandidate {
    pub fn is_cutting(&self) -> bool {
        self.cut_off >= NEGLIGIBLE_CUT_OFF
    }
}

/// Best crop of `image` for a `requested` output shape.
///
/// Total: always returns a non-empty crop contained in `image` when `image`
/// has two positive axes. See the [module docs](self) for the rules.
pub fn generate(
    image: Dimensions,
    requested: Dimensions,
    same_context: &[SourceCrop],
    other_context: &[SourceCrop],
) -> Crop {
    best_candidate(image, requested, same_context, other_context).crop
}

/// Like [`generate`], returning the winning candidate with its measures.
pub fn best_candidate(
    image: Dimensions,
    requested: Dimensions,
    same_context: &[SourceCrop],
    other_context: &[SourceCrop],
) -> CropCandidate {
    let whole = CropCandidate {
        crop: Crop::whole(image),
        extension: 0.0,
        cut_off: 0.0,
        scale_factor: 0.0,
        source: None,
    };
    // a request without its own ratio is a pure scale of the original
    if requested.aspect_ratio().is_none() || image.aspect_ratio().is_none() {
        return whole;
    }
    let target = requested.normalize(image).scale_to_fit_in(image);

    let mut others = other_context.to_vec();
    others.push(SourceCrop::whole_image(image));

    let same = candidates(image, target, same_context);
    let other = candidates(image, target, &others);

    if let Some(chosen) = best_non_cutting(&same) {
        tracing::debug!(crop = %chosen.crop, source = ?chosen.source, "non-cutting same-context candidate");
        return chosen;
    }
    if let Some(chosen) = best_non_cutting(&other) {
        tracing::debug!(crop = %chosen.crop, source = ?chosen.source, "non-cutting other-context candidate");
        return chosen;
    }
    let chosen = same
        .iter()
        .chain(other.iter())
        .copied()
        .min_by(|a, b| a.cut_off.total_cmp(&b.cut_off).then_with(|| tie_break(a, b)))
        .unwrap_or(whole);
    tracing::debug!(crop = %chosen.crop, cut_off = chosen.cut_off, "least cutting candidate");
    chosen
}

/// Score one existing crop against a target that already fits `image`.
pub fn candidate(image: Dimensions, target: Dimensions, source: SourceCrop) -> CropCandidate {
    let crop = source.crop;
    if crop.width <= target.width && crop.height <= target.height {
        extend(image, target, source)
    } else {
        reshape(image, target, source)
    }
}

fn candidates(image: Dimensions, target: Dimensions, sources: &[SourceCrop]) -> Vec<CropCandidate> {
    let mut usable: Vec<SourceCrop> = sources
        .iter()
        .filter_map(|s| {
            let clipped = s.crop.clip_to(image);
            if clipped.is_none() {
                tracing::debug!(crop = %s.crop, image = %image, "ignoring crop outside image");
            }
            clipped.map(|crop| SourceCrop { crop, ..*s })
        })
        .collect();
    usable.sort_by(|a, b| {
        a.crop
            .cmp(&b.crop)
            .then_with(|| source_order(a.resolution_id, b.resolution_id))
    });
    usable.dedup_by_key(|s| s.crop);
    usable
        .into_iter()
        .map(|s| candidate(image, target, s))
        .collect()
}

fn extend(image: Dimensions, target: Dimensions, source: SourceCrop) -> CropCandidate {
    let crop = source.crop;
    let x = centered(crop.x, crop.width, target.width, image.width);
    let y = centered(crop.y, crop.height, target.height, image.height);
    let extended = Crop::new(x, y, target.width, target.height);

    CropCandidate {
        crop: extended,
        extension: extension(&crop, &extended),
        cut_off: 0.0,
        scale_factor: 0.0,
        source: source.resolution_id,
    }
}

fn reshape(image: Dimensions, target: Dimensions, source: SourceCrop) -> CropCandidate {
    let crop = source.crop;
    let (cw, ch) = (u64::from(crop.width), u64::from(crop.height));
    let (tw, th) = (u64::from(target.width), u64::from(target.height));

    // compare crop ratio cw/ch with target ratio tw/th
    let (reshaped, cutting) = match (cw * th).cmp(&(tw * ch)) {
        Ordering::Less => {
            let width = to_axis(tw * ch / th);
            if width <= image.width {
                let x = centered(crop.x, crop.width, width, image.width);
                (Crop::new(x, crop.y, width, crop.height), false)
            } else {
                let height = to_axis(u64::from(image.width) * th / tw).clamp(1, image.height);
                let y = centered(crop.y, crop.height, height, image.height);
                (Crop::new(0, y, image.width, height), true)
            }
        }
        Ordering::Greater => {
            let height = to_axis(th * cw / tw);
            if height <= image.height {
                let y = centered(crop.y, crop.height, height, image.height);
                (Crop::new(crop.x, y, crop.width, height), false)
            } else {
                let width = to_axis(u64::from(image.height) * tw / th).clamp(1, image.width);
                let x = centered(crop.x, crop.width, width, image.width);
                (Crop::new(x, 0, width, image.height), true)
            }
        }
        Ordering::Equal => (crop, false),
    };

    let (extension, cut_off) = if cutting {
        let kept = reshaped.intersect(&crop).map_or(0, |overlap| overlap.area());
        (0.0, 1.0 - kept as f64 / crop.area() as f64)
    } else {
        (extension(&crop, &reshaped), 0.0)
    };

    CropCandidate {
        crop: reshaped,
        extension,
        cut_off,
        scale_factor: f64::from(reshaped.width) / f64::from(target.width),
        source: source.resolution_id,
    }
}

/// Start of a `len` span centered on `[start, start + current)`, shifted
/// back inside `[0, bound]`.
fn centered(start: u32, current: u32, len: u32, bound: u32) -> u32 {
    let ideal = i64::from(start) + (i64::from(current) - i64::from(len)) / 2;
    let max = i64::from(bound.saturating_sub(len));
    // clamped into [0, max], max fits u32
    ideal.clamp(0, max) as u32
}

fn to_axis(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX).max(1)
}

fn extension(old: &Crop, new: &Crop) -> f64 {
    let new_area = new.area() as f64;
    (new_area - old.area() as f64) / new_area
}

fn best_non_cutting(candidates: &[CropCandidate]) -> Option<CropCandidate> {
    let non_cutting: Vec<&CropCandidate> = candidates.iter().filter(|c| !c.is_cutting()).collect();
    let best = non_cutting
        .iter()
        .map(|c| c.extension)
        .min_by(f64::total_cmp)?;
    non_cutting
        .into_iter()
        .filter(|c| c.extension - best <= EXTENSION_TOLERANCE)
        .min_by(|a, b| {
            a.scale_factor
                .total_cmp(&b.scale_factor)
                .then_with(|| tie_break(a, b))
        })
        .copied()
}

fn tie_break(a: &CropCandidate, b: &CropCandidate) -> Ordering {
    a.crop
        .area()
        .cmp(&b.crop.area())
        .then_with(|| source_order(a.source, b.source))
        .then_with(|| a.crop.cmp(&b.crop))
}

/// Registered resolutions by id, the whole image last.
fn source_order(a: Option<ResolutionId>, b: Option<ResolutionId>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
