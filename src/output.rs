//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Resolve
//!
//! ```text
//! Image 1 (4000x2000 jpeg)
//!     Context: web (1)
//!     Resolution: 4 (1000x1000)
//!     Output: 1000x1000
//!     Crop: (1000, 0, 2000x2000)
//!     Tier: same context, from resolution 7
//!     Variant: 5f2c…9e1a.jpeg (image/jpeg)
//! ```
//!
//! ## Check
//!
//! ```text
//! Catalog
//!     2 images, 2 contexts, 8 resolutions, 3 modifications
//! Issues
//!     001 modification references unknown image 9
//!     002 resolution 12 has neither width nor height
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::resolver::ResolvedModification;
use crate::store::{Catalog, CatalogIssue};
use crate::types::{Image, ImageContext, ImageResolution, VariantKey};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

// ============================================================================
// Resolve
// ============================================================================

/// Format the crop chosen for one `(image, context, resolution)`, and
/// the storage name its rendered variant would get.
pub fn format_resolution(
    image: &Image,
    context: &ImageContext,
    requested: &ImageResolution,
    resolved: &ResolvedModification,
    key: &VariantKey,
) -> Vec<String> {
    let tier = match resolved.base_resolution_id {
        Some(base) => format!("{}, from resolution {}", resolved.tier, base),
        None => resolved.tier.to_string(),
    };
    vec![
        format!(
            "Image {} ({} {})",
            image.id, image.dimensions, image.image_type
        ),
        format!("{}Context: {} ({})", indent(1), context.code, context.id),
        format!(
            "{}Resolution: {} ({})",
            indent(1),
            requested.id,
            requested.dimensions()
        ),
        format!("{}Output: {}", indent(1), resolved.output),
        format!("{}Crop: {}", indent(1), resolved.crop),
        format!("{}Tier: {}", indent(1), tier),
        format!(
            "{}Variant: {}.{} ({})",
            indent(1),
            key.fingerprint(),
            key.variant.output.extension(),
            key.variant.output.content_type()
        ),
    ]
}

pub fn print_resolution(
    image: &Image,
    context: &ImageContext,
    requested: &ImageResolution,
    resolved: &ResolvedModification,
    key: &VariantKey,
) {
    for line in format_resolution(image, context, requested, resolved, key) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format catalog totals and consistency findings.
pub fn format_check(catalog: &Catalog, issues: &[CatalogIssue]) -> Vec<String> {
    let mut lines = vec![
        "Catalog".to_string(),
        format!(
            "{}{}, {}, {}, {}",
            indent(1),
            plural(catalog.images.len(), "image"),
            plural(catalog.contexts.len(), "context"),
            plural(catalog.resolutions.len(), "resolution"),
            plural(catalog.modifications.len(), "modification"),
        ),
    ];
    if issues.is_empty() {
        lines.push("No issues found".to_string());
        return lines;
    }
    lines.push("Issues".to_string());
    for (i, issue) in issues.iter().enumerate() {
        lines.push(format!("{}{} {}", indent(1), format_index(i + 1), issue));
    }
    lines
}

pub fn print_check(catalog: &Catalog, issues: &[CatalogIssue]) {
    for line in format_check(catalog, issues) {
        println!("{}", line);
    }
}
