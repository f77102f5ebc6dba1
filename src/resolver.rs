//! Modification precedence: which crop to render for `(image, context,
//! resolution)`.
//!
//! Registered modifications are searched in tiers; the first tier with a
//! usable crop wins:
//!
//! | Tier | Looks at | Picks |
//! |------|----------|-------|
//! | [`Exact`](ResolutionTier::Exact) | same context, requested resolution | that crop |
//! | [`SameContext`](ResolutionTier::SameContext) | same context, same aspect ratio | smallest resolution at least as large as requested, else the largest below |
//! | [`OtherContext`](ResolutionTier::OtherContext) | other contexts, same aspect ratio | as above |
//! | [`Generated`](ResolutionTier::Generated) | every crop of the image plus the whole image | [`generator::best_candidate`] |
//!
//! Resolution size is compared by `width + height` after filling unset axes
//! from the image. Aspect ratios are compared by cross-multiplication.
//! Remaining ties go to the lowest resolution id.

use crate::generator::{self, SourceCrop};
use crate::geometry::{Crop, Dimensions};
use crate::normalize::{self, CropRequest, ValidationError};
use crate::types::{ContextId, Image, ImageModification, ImageResolution, ResolutionId};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

/// Where a resolved crop came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionTier {
    Exact,
    SameContext,
    OtherContext,
    Generated,
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolutionTier::Exact => "exact",
            ResolutionTier::SameContext => "same context",
            ResolutionTier::OtherContext => "other context",
            ResolutionTier::Generated => "generated",
        })
    }
}

/// The crop and output size to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedModification {
    /// Requested resolution, axes filled in and shrunk to fit the original.
    pub output: Dimensions,
    pub crop: Crop,
    /// Resolution of the reused registered modification, if any.
    pub base_resolution_id: Option<ResolutionId>,
    pub tier: ResolutionTier,
}

/// Resolve the crop for `requested` in `context`.
///
/// `modifications` are the image's registered modifications (entries for
/// other images are ignored) and `resolutions` must contain the
/// resolutions they reference; modifications whose resolution is unknown
/// are only used by the generator tier.
pub fn resolve(
    image: &Image,
    context: ContextId,
    requested: &ImageResolution,
    modifications: &[ImageModification],
    resolutions: &[ImageResolution],
) -> Result<ResolvedModification, ValidationError> {
    let original = image.dimensions;
    let output = normalize::output_dimensions(original, requested.dimensions(), None)?;
    let wanted = requested.dimensions().normalize(original);

    let catalog: HashMap<ResolutionId, Dimensions> = resolutions
        .iter()
        .map(|r| (r.id, r.dimensions().normalize(original)))
        .collect();

    let usable: Vec<(&ImageModification, Crop)> = modifications
        .iter()
        .filter(|m| m.image_id == image.id)
        .filter_map(|m| match normalize::normalize_crop(original, &CropRequest::from(m.crop)) {
            Ok(crop) => Some((m, crop)),
            Err(e) => {
                tracing::warn!(
                    image = %image.id,
                    resolution = %m.resolution_id,
                    error = %e,
                    "skipping unusable registered crop"
                );
                None
            }
        })
        .collect();

    let resolved = |crop: Crop, base: Option<ResolutionId>, tier: ResolutionTier| {
        tracing::debug!(
            image = %image.id,
            context = %context,
            resolution = %requested.id,
            tier = %tier,
            crop = %crop,
            "resolved modification"
        );
        ResolvedModification {
            output,
            crop,
            base_resolution_id: base,
            tier,
        }
    };

    if let Some((m, crop)) = usable
        .iter()
        .filter(|(m, _)| m.context_id == context && m.resolution_id == requested.id)
        .min_by_key(|(_, crop)| *crop)
    {
        return Ok(resolved(*crop, Some(m.resolution_id), ResolutionTier::Exact));
    }

    let same_context = usable.iter().filter(|(m, _)| m.context_id == context);
    if let Some((id, crop)) = closest_same_ratio(same_context, &catalog, wanted) {
        return Ok(resolved(crop, Some(id), ResolutionTier::SameContext));
    }

    let other_context = usable.iter().filter(|(m, _)| m.context_id != context);
    if let Some((id, crop)) = closest_same_ratio(other_context, &catalog, wanted) {
        return Ok(resolved(crop, Some(id), ResolutionTier::OtherContext));
    }

    let (same, other): (Vec<_>, Vec<_>) = usable.iter().partition(|(m, _)| m.context_id == context);
    let as_sources = |entries: Vec<&(&ImageModification, Crop)>| -> Vec<SourceCrop> {
        entries
            .into_iter()
            .map(|(m, crop)| SourceCrop::registered(*crop, m.resolution_id))
            .collect()
    };
    let (same, other) = (as_sources(same), as_sources(other));
    let chosen = generator::best_candidate(original, requested.dimensions(), &same, &other);
    Ok(resolved(chosen.crop, None, ResolutionTier::Generated))
}

/// Smallest same-ratio resolution at least as large as `wanted`, else the
/// largest one below it.
fn closest_same_ratio<'a, 'm: 'a>(
    modifications: impl Iterator<Item = &'a (&'m ImageModification, Crop)>,
    catalog: &HashMap<ResolutionId, Dimensions>,
    wanted: Dimensions,
) -> Option<(ResolutionId, Crop)> {
    let wanted_size = i64::from(wanted.width) + i64::from(wanted.height);
    let mut above = Vec::new();
    let mut below = Vec::new();

    for (m, crop) in modifications {
        let Some(dimensions) = catalog.get(&m.resolution_id) else {
            tracing::warn!(resolution = %m.resolution_id, "modification references unknown resolution");
            continue;
        };
        if !dimensions.same_ratio(wanted) {
            continue;
        }
        let distance = i64::from(dimensions.width) + i64::from(dimensions.height) - wanted_size;
        if distance >= 0 {
            above.push((distance, m.resolution_id, *crop));
        } else {
            below.push((Reverse(distance), m.resolution_id, *crop));
        }
    }

    above
        .into_iter()
        .min()
        .map(|(_, id, crop)| (id, crop))
        .or_else(|| below.into_iter().min().map(|(_, id, crop)| (id, crop)))
}
