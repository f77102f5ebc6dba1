//! The variant pipeline: resolve, render, persist.
//!
//! [`VariantService::resolve_and_render_variant`] is the entry point for
//! serving a variant:
//!
//! ```text
//! (image, context, resolution, spec)
//!   │ validate request               ── ValidationError, before any locking
//!   │ VariantGuard::get_or_compute   ── stored? return it
//!   │   resolver::resolve            ── registered crop or generated one
//!   │   ImageSource::read_original
//!   │   TransformPermits::acquire    ── bounded across all keys
//!   │   TransformRegistry::render
//!   │   ArtifactStore::write_atomic
//!   ▼
//! Artifact
//! ```
//!
//! Two more operations build on the same collaborators:
//! [`render_modification`](VariantService::render_modification) renders a
//! caller-supplied crop without storing the result, and
//! [`render_context`](VariantService::render_context) renders every
//! resolution of a context in parallel.

use crate::guard::VariantGuard;
use crate::normalize::{self, ModificationRequest, ValidationError};
use crate::resolver::{self, ResolvedModification};
use crate::store::{ArtifactStore, ImageSource, ModificationStore, StoreError};
use crate::transform::{TransformError, TransformPermits, TransformRegistry, TransformRequest};
use crate::types::{
    Artifact, ContextId, Image, ImageId, ImageResolution, ImageType, ResolutionId, VariantKey,
    VariantSpec,
};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RenderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Image {0} not found")]
    ImageNotFound(ImageId),
    #[error("Resolution {0} not found")]
    ResolutionNotFound(ResolutionId),
    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// Another caller computed this key and failed. `cause` is shared by
    /// every caller that waited on the same attempt.
    #[error("Computation of {key} failed")]
    Propagated {
        key: VariantKey,
        #[source]
        cause: Arc<RenderError>,
    },
    #[error("Computation of {key} panicked: {message}")]
    Aborted { key: VariantKey, message: String },
    #[error("Gave up waiting for {key}")]
    WaitTimedOut { key: VariantKey },
}

impl RenderError {
    /// The error that actually failed the pipeline, looking through
    /// propagation.
    pub fn root_cause(&self) -> &RenderError {
        match self {
            RenderError::Propagated { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

/// Runtime knobs for [`VariantService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Transforms allowed to run at once.
    pub transform_limit: usize,
    /// How long a caller waits for another caller's computation.
    /// `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            transform_limit: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            wait_timeout: None,
        }
    }
}

pub struct VariantService {
    modifications: Arc<dyn ModificationStore>,
    images: Arc<dyn ImageSource>,
    artifacts: Arc<dyn ArtifactStore>,
    engines: TransformRegistry,
    permits: TransformPermits,
    guard: VariantGuard,
}

impl VariantService {
    pub fn new(
        modifications: Arc<dyn ModificationStore>,
        images: Arc<dyn ImageSource>,
        artifacts: Arc<dyn ArtifactStore>,
        engines: TransformRegistry,
        settings: ServiceSettings,
    ) -> Self {
        let guard = match settings.wait_timeout {
            Some(timeout) => VariantGuard::with_wait_timeout(timeout),
            None => VariantGuard::new(),
        };
        Self {
            modifications,
            images,
            artifacts,
            engines,
            permits: TransformPermits::new(settings.transform_limit),
            guard,
        }
    }

    pub fn artifacts(&self) -> &dyn ArtifactStore {
        self.artifacts.as_ref()
    }

    pub fn permits(&self) -> &TransformPermits {
        &self.permits
    }

    /// Keys being computed right now.
    pub fn in_flight(&self) -> usize {
        self.guard.in_flight()
    }

    /// Which crop and output size `(image, context, resolution)` renders
    /// with. Nothing is rendered.
    pub fn resolve(
        &self,
        image: ImageId,
        context: ContextId,
        resolution: ResolutionId,
    ) -> Result<ResolvedModification, RenderError> {
        let image = self.find_image(image)?;
        let requested = self.find_resolution(resolution)?;
        self.resolve_for(&image, context, &requested)
    }

    /// Return the variant, rendering and storing it if needed.
    ///
    /// Concurrent calls for the same key share one computation; see
    /// [`VariantGuard`].
    pub fn resolve_and_render_variant(
        &self,
        image: ImageId,
        context: ContextId,
        resolution: ResolutionId,
        spec: &VariantSpec,
    ) -> Result<Artifact, RenderError> {
        let image = self.find_image(image)?;
        let requested = self.find_resolution(resolution)?;
        normalize::output_dimensions(image.dimensions, requested.dimensions(), None)?;

        let key = VariantKey::new(image.id, context, resolution, spec.clone());
        self.guard.get_or_compute(&key, self.artifacts.as_ref(), || {
            self.materialize(&key, &image, &requested)
        })
    }

    /// Render an ad-hoc modification of `image`. The result is returned,
    /// not stored.
    pub fn render_modification(
        &self,
        image: ImageId,
        request: &ModificationRequest,
        format: ImageType,
    ) -> Result<Vec<u8>, RenderError> {
        let image = self.find_image(image)?;
        let normalized = normalize::normalize(image.dimensions, request)?;
        let transform = TransformRequest {
            source_type: image.image_type,
            original: image.dimensions,
            crop: normalized.crop,
            output: normalized.output,
            format,
        };
        let original = self.images.read_original(&image)?;
        Ok(self.transform(&original, &transform)?)
    }

    /// Render `spec` for every resolution registered to `context`, in
    /// parallel. One result per resolution, ordered by resolution id.
    pub fn render_context(
        &self,
        image: ImageId,
        context: ContextId,
        spec: &VariantSpec,
    ) -> Result<Vec<(ResolutionId, Result<Artifact, RenderError>)>, RenderError> {
        let image = self.find_image(image)?;
        let resolutions = self.modifications.find_resolutions_for_context(context)?;
        tracing::info!(
            image = %image.id,
            context = %context,
            resolutions = resolutions.len(),
            "rendering context"
        );
        Ok(resolutions
            .par_iter()
            .map(|r| {
                (
                    r.id,
                    self.resolve_and_render_variant(image.id, context, r.id, spec),
                )
            })
            .collect())
    }

    fn find_image(&self, id: ImageId) -> Result<Image, RenderError> {
        self.images
            .find_image(id)?
            .ok_or(RenderError::ImageNotFound(id))
    }

    fn find_resolution(&self, id: ResolutionId) -> Result<ImageResolution, RenderError> {
        self.modifications
            .find_resolution(id)?
            .ok_or(RenderError::ResolutionNotFound(id))
    }

    fn resolve_for(
        &self,
        image: &Image,
        context: ContextId,
        requested: &ImageResolution,
    ) -> Result<ResolvedModification, RenderError> {
        let modifications = self.modifications.find_all_modifications(image.id)?;
        let referenced: BTreeSet<ResolutionId> =
            modifications.iter().map(|m| m.resolution_id).collect();

        // unknown ids are left out; the resolver logs and skips them
        let mut resolutions = Vec::with_capacity(referenced.len());
        for id in referenced {
            if let Some(resolution) = self.modifications.find_resolution(id)? {
                resolutions.push(resolution);
            }
        }

        Ok(resolver::resolve(
            image,
            context,
            requested,
            &modifications,
            &resolutions,
        )?)
    }

    /// The pipeline run by the owner of a guard slot.
    fn materialize(
        &self,
        key: &VariantKey,
        image: &Image,
        requested: &ImageResolution,
    ) -> Result<Artifact, RenderError> {
        let started = Instant::now();
        let resolved = self.resolve_for(image, key.context_id, requested)?;
        let original = self.images.read_original(image)?;
        let request = TransformRequest::new(
            image.image_type,
            image.dimensions,
            &resolved,
            key.variant.output,
        );
        let bytes = self.transform(&original, &request)?;
        self.artifacts.write_atomic(key, &bytes)?;

        tracing::info!(
            key = %key,
            tier = %resolved.tier,
            crop = %resolved.crop,
            output = %resolved.output,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rendered variant"
        );
        Ok(Artifact::new(key.clone(), bytes))
    }

    fn transform(&self, source: &[u8], request: &TransformRequest) -> Result<Vec<u8>, TransformError> {
        let _permit = self.permits.acquire();
        self.engines.render(source, request)
    }
}

impl std::fmt::Debug for VariantService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantService")
            .field("engines", &self.engines)
            .field("permits", &self.permits)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}
