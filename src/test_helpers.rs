//! Shared fixtures for the unit tests.
//!
//! One landscape original, two contexts and a catalog of square resolutions
//! plus a wide one:
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mods = vec![modification(WEB, R2000, Crop::new(1000, 0, 2000, 2000))];
//! let (service, engine) = service(catalog(mods), MockEngine::new());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::geometry::{Crop, Dimensions};
use crate::service::{ServiceSettings, VariantService};
use crate::store::{Catalog, CatalogImage, MemoryArtifactStore};
use crate::transform::{
    Capability, TransformEngine, TransformError, TransformRegistry, TransformRequest,
};
use crate::types::{
    ContextId, Image, ImageContext, ImageId, ImageModification, ImageResolution, ImageType,
    ResolutionId,
};

// =========================================================================
// Identities
// =========================================================================

pub const IMAGE: ImageId = ImageId(1);
pub const WEB: ContextId = ContextId(1);
pub const PRINT: ContextId = ContextId(2);

pub const R250: ResolutionId = ResolutionId(1);
pub const R500: ResolutionId = ResolutionId(2);
pub const R800: ResolutionId = ResolutionId(3);
pub const R1000: ResolutionId = ResolutionId(4);
pub const R1500: ResolutionId = ResolutionId(5);
pub const R1600: ResolutionId = ResolutionId(6);
pub const R2000: ResolutionId = ResolutionId(7);
pub const R3000X1000: ResolutionId = ResolutionId(8);

pub const ORIGINAL_BYTES: &[u8] = b"original pixels";

// =========================================================================
// Builders
// =========================================================================

/// The 4000x2000 JPEG used throughout.
pub fn landscape_image() -> Image {
    Image {
        id: IMAGE,
        dimensions: Dimensions::new(4000, 2000),
        image_type: ImageType::Jpeg,
    }
}

/// Resolution listed in both contexts.
pub fn resolution(id: u64, width: u32, height: u32) -> ImageResolution {
    ImageResolution {
        id: ResolutionId(id),
        width,
        height,
        tags: Vec::new(),
        contexts: vec![WEB, PRINT],
    }
}

pub fn standard_resolutions() -> Vec<ImageResolution> {
    [
        (R250, 250, 250),
        (R500, 500, 500),
        (R800, 800, 800),
        (R1000, 1000, 1000),
        (R1500, 1500, 1500),
        (R1600, 1600, 1600),
        (R2000, 2000, 2000),
        (R3000X1000, 3000, 1000),
    ]
    .into_iter()
    .map(|(id, w, h)| resolution(id.0, w, h))
    .collect()
}

/// Look up one of [`standard_resolutions`].
pub fn standard(id: ResolutionId) -> ImageResolution {
    standard_resolutions()
        .into_iter()
        .find(|r| r.id == id)
        .unwrap_or_else(|| panic!("no standard resolution {id}"))
}

/// Registered crop of [`landscape_image`].
pub fn modification(context: ContextId, resolution: ResolutionId, crop: Crop) -> ImageModification {
    ImageModification {
        image_id: IMAGE,
        context_id: context,
        resolution_id: resolution,
        crop,
    }
}

/// Catalog with the landscape image (and its bytes), both contexts and the
/// standard resolutions.
pub fn catalog(modifications: Vec<ImageModification>) -> Catalog {
    let image = landscape_image();
    let mut catalog = Catalog::default();
    catalog.images = vec![CatalogImage {
        id: image.id,
        width: image.dimensions.width,
        height: image.dimensions.height,
        image_type: image.image_type,
        source: None,
    }];
    catalog.contexts = vec![
        ImageContext {
            id: WEB,
            code: "web".to_string(),
        },
        ImageContext {
            id: PRINT,
            code: "print".to_string(),
        },
    ];
    catalog.resolutions = standard_resolutions();
    catalog.modifications = modifications;
    catalog.with_original(IMAGE, ORIGINAL_BYTES)
}

/// Service over `catalog` with a fresh in-memory artifact store.
pub fn service(catalog: Catalog, engine: MockEngine) -> (VariantService, Arc<MockEngine>) {
    service_with(catalog, engine, ServiceSettings::default())
}

pub fn service_with(
    catalog: Catalog,
    engine: MockEngine,
    settings: ServiceSettings,
) -> (VariantService, Arc<MockEngine>) {
    let catalog = Arc::new(catalog);
    let engine = Arc::new(engine);
    let service = VariantService::new(
        catalog.clone(),
        catalog,
        Arc::new(MemoryArtifactStore::new()),
        TransformRegistry::new(vec![engine.clone() as Arc<dyn TransformEngine>]),
        settings,
    );
    (service, engine)
}

// =========================================================================
// Mock engine
// =========================================================================

/// Engine that records requests and renders a textual description of them.
///
/// Output is `"<crop> -> <output> as <format>"`, so tests can assert on the
/// geometry that reached the engine.
#[derive(Debug, Default)]
pub struct MockEngine {
    pub delay: Duration,
    pub failure: Option<String>,
    calls: Mutex<Vec<TransformRequest>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<TransformRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Most renders that were ever running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn expected_output(request: &TransformRequest) -> Vec<u8> {
        format!("{} -> {} as {}", request.crop, request.output, request.format).into_bytes()
    }
}

impl TransformEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn capability(&self, _request: &TransformRequest) -> Capability {
        Capability::Preferred
    }

    fn render(&self, source: &[u8], request: &TransformRequest) -> Result<Vec<u8>, TransformError> {
        assert_eq!(source, ORIGINAL_BYTES);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*request);
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(TransformError::Failed {
                engine: self.name().to_string(),
                message: message.clone(),
            }),
            None => Ok(Self::expected_output(request)),
        }
    }
}
