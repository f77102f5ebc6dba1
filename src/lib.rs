//! # cropserve
//!
//! Crop resolution for an image server. Given an original image, a delivery
//! context (say `web` or `print`) and a target resolution, decide which
//! rectangle of the original to render, then render and store that variant
//! exactly once no matter how many callers ask for it at the same time.
//!
//! # Architecture
//!
//! ```text
//! request (image, context, resolution, spec)
//!   │
//!   ├─ normalize   validate and fill in the requested geometry
//!   ├─ guard       one computation per variant key; others wait and share
//!   │    ├─ resolver    registered crop by precedence tier
//!   │    │    └─ generator   best crop from candidates when none fits
//!   │    ├─ transform   engine registry + bounded permit pool
//!   │    └─ store       artifact written atomically
//!   ▼
//! Artifact
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`geometry`] | `Dimensions`, `Crop`, `AspectRatio` and the integer maths on them |
//! | [`types`] | Identities and records: images, contexts, resolutions, modifications, variant keys |
//! | [`normalize`] | Requested resolution and crop to a valid `(output, crop)` pair |
//! | [`generator`] | Scores candidate crops and extends or reshapes the best one |
//! | [`resolver`] | Precedence between registered modifications |
//! | [`guard`] | Per-key single-flight over the artifact store |
//! | [`transform`] | Engine trait, capability-ordered registry, transform permits |
//! | [`store`] | Store traits, in-memory artifact store, TOML catalog |
//! | [`service`] | The variant pipeline and its error type |
//! | [`config`] | `cropserve.toml` loading, validation and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Integer Geometry
//!
//! All pixel arithmetic is done on integers. Aspect ratios are compared by
//! cross-multiplication in `u64`, never by dividing into floats, so two
//! resolutions either have the same ratio or they don't. Floats appear only
//! in the generator's scores (`extension`, `cut_off`, `scale_factor`), which
//! are compared against fixed tolerances.
//!
//! ## Never Upscale
//!
//! The output is always shrunk to fit inside the original. A request larger
//! than the original renders at the original's size, with the requested
//! aspect ratio.
//!
//! ## Failures Are Not Cached
//!
//! A failed computation is reported to every caller that waited on it and
//! then forgotten. The next request for the same key starts a fresh
//! attempt. Only successful artifacts are persisted.
//!
//! ## Engines Are Injected
//!
//! The crate decodes no pixels. Rendering is delegated to
//! [`transform::TransformEngine`] implementations supplied by the host,
//! each reporting how well it handles a request.

pub mod config;
pub mod generator;
pub mod geometry;
pub mod guard;
pub mod normalize;
pub mod output;
pub mod resolver;
pub mod service;
pub mod store;
pub mod transform;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
