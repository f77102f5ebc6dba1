//! Collaborator interfaces and the implementations shipped with the crate.
//!
//! | Trait | Provides | Implementations |
//! |-------|----------|-----------------|
//! | [`ModificationStore`] | registered modifications and resolutions | [`Catalog`] |
//! | [`ImageSource`] | image records and original bytes | [`Catalog`] |
//! | [`ArtifactStore`] | materialized variants | [`MemoryArtifactStore`] |
//!
//! [`Catalog`] is an immutable snapshot loaded from TOML:
//!
//! ```toml
//! [[images]]
//! id = 1
//! width = 4000
//! height = 2000
//! type = "jpeg"
//! source = "originals/1.jpg"   # relative to the catalog file
//!
//! [[contexts]]
//! id = 1
//! code = "web"
//!
//! [[resolutions]]
//! id = 7
//! width = 2000
//! height = 2000
//! tags = ["square"]
//! contexts = [1]
//!
//! [[modifications]]
//! image_id = 1
//! context_id = 1
//! resolution_id = 7
//! crop = { x = 1000, y = 0, width = 2000, height = 2000 }
//! ```

use crate::geometry::Dimensions;
use crate::types::{
    ContextId, Image, ImageContext, ImageId, ImageModification, ImageResolution, ImageType,
    ResolutionId, VariantKey,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),
    #[error("{0} not found")]
    Missing(String),
    #[error("Catalog parse error: {0}")]
    Catalog(String),
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(Arc::new(e))
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(e: toml::de::Error) -> Self {
        StoreError::Catalog(e.to_string())
    }
}

/// Read-only access to registered modifications and resolutions.
pub trait ModificationStore: Send + Sync {
    fn find_all_modifications(&self, image: ImageId) -> Result<Vec<ImageModification>, StoreError>;

    fn find_resolution(&self, id: ResolutionId) -> Result<Option<ImageResolution>, StoreError>;

    /// Resolutions in a context's catalog, ordered by id.
    fn find_resolutions_for_context(
        &self,
        context: ContextId,
    ) -> Result<Vec<ImageResolution>, StoreError>;
}

/// Image records and their original bytes.
pub trait ImageSource: Send + Sync {
    fn find_image(&self, id: ImageId) -> Result<Option<Image>, StoreError>;

    fn read_original(&self, image: &Image) -> Result<Vec<u8>, StoreError>;
}

/// Where rendered variants live.
///
/// `write_atomic` either stores all of `bytes` or nothing.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, key: &VariantKey) -> Result<bool, StoreError>;

    fn read(&self, key: &VariantKey) -> Result<Arc<[u8]>, StoreError>;

    fn write_atomic(&self, key: &VariantKey, bytes: &[u8]) -> Result<(), StoreError>;
}

// =============================================================================
// In-memory artifact store
// =============================================================================

/// Artifact store backed by a `HashMap`. Writes swap in a complete buffer.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<HashMap<VariantKey, Arc<[u8]>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop a stored variant, e.g. after its original changed.
    pub fn remove(&self, key: &VariantKey) -> bool {
        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self, key: &VariantKey) -> Result<bool, StoreError> {
        Ok(self
            .artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key))
    }

    fn read(&self, key: &VariantKey) -> Result<Arc<[u8]>, StoreError> {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::Missing(format!("artifact {key}")))
    }

    fn write_atomic(&self, key: &VariantKey, bytes: &[u8]) -> Result<(), StoreError> {
        let buffer: Arc<[u8]> = Arc::from(bytes);
        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), buffer);
        Ok(())
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Image entry as written in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogImage {
    pub id: ImageId,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "type")]
    pub image_type: ImageType,
    /// Original file, relative to the catalog file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl CatalogImage {
    pub fn image(&self) -> Image {
        Image {
            id: self.id,
            dimensions: Dimensions::new(self.width, self.height),
            image_type: self.image_type,
        }
    }
}

/// Immutable snapshot of images, contexts, resolutions and modifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Catalog {
    pub images: Vec<CatalogImage>,
    pub contexts: Vec<ImageContext>,
    pub resolutions: Vec<ImageResolution>,
    pub modifications: Vec<ImageModification>,
    #[serde(skip)]
    originals: HashMap<ImageId, Arc<[u8]>>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Catalog {
    pub fn from_toml_str(content: &str) -> Result<Self, StoreError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a catalog file. Image `source` paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)?;
        let mut catalog = Self::from_toml_str(&content)?;
        catalog.base_dir = path.parent().map(Path::to_path_buf);
        Ok(catalog)
    }

    /// Attach in-memory original bytes for an image.
    pub fn with_original(mut self, image: ImageId, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.originals.insert(image, bytes.into());
        self
    }

    pub fn image(&self, id: ImageId) -> Option<Image> {
        self.images.iter().find(|i| i.id == id).map(CatalogImage::image)
    }

    pub fn resolution(&self, id: ResolutionId) -> Option<&ImageResolution> {
        self.resolutions.iter().find(|r| r.id == id)
    }

    pub fn context(&self, id: ContextId) -> Option<&ImageContext> {
        self.contexts.iter().find(|c| c.id == id)
    }

    pub fn context_by_code(&self, code: &str) -> Option<&ImageContext> {
        self.contexts.iter().find(|c| c.code == code)
    }

    /// Consistency findings, in catalog order.
    pub fn check(&self) -> Vec<CatalogIssue> {
        let mut issues = Vec::new();
        let images: HashMap<ImageId, Dimensions> = self
            .images
            .iter()
            .map(|i| (i.id, Dimensions::new(i.width, i.height)))
            .collect();
        let contexts: HashSet<ContextId> = self.contexts.iter().map(|c| c.id).collect();
        let resolutions: HashSet<ResolutionId> = self.resolutions.iter().map(|r| r.id).collect();

        for image in &self.images {
            if image.width == 0 || image.height == 0 {
                issues.push(CatalogIssue::UndefinedImage { image: image.id });
            }
        }

        for resolution in &self.resolutions {
            if resolution.dimensions().is_unset() {
                issues.push(CatalogIssue::UnsetResolution {
                    resolution: resolution.id,
                });
            }
            for context in &resolution.contexts {
                if !contexts.contains(context) {
                    issues.push(CatalogIssue::UnknownContext { context: *context });
                }
            }
        }

        let mut seen = HashSet::new();
        for m in &self.modifications {
            if !seen.insert((m.image_id, m.context_id, m.resolution_id)) {
                issues.push(CatalogIssue::DuplicateModification {
                    image: m.image_id,
                    context: m.context_id,
                    resolution: m.resolution_id,
                });
            }
            if !contexts.contains(&m.context_id) {
                issues.push(CatalogIssue::UnknownContext {
                    context: m.context_id,
                });
            }
            if !resolutions.contains(&m.resolution_id) {
                issues.push(CatalogIssue::UnknownResolution {
                    image: m.image_id,
                    resolution: m.resolution_id,
                });
            }
            let Some(dimensions) = images.get(&m.image_id) else {
                issues.push(CatalogIssue::UnknownImage { image: m.image_id });
                continue;
            };
            if m.crop.is_empty() {
                issues.push(CatalogIssue::EmptyCrop {
                    image: m.image_id,
                    resolution: m.resolution_id,
                });
            } else if !m.crop.is_within(*dimensions) {
                issues.push(CatalogIssue::CropOutsideImage {
                    image: m.image_id,
                    resolution: m.resolution_id,
                });
            }
        }
        issues
    }
}

impl ModificationStore for Catalog {
    fn find_all_modifications(&self, image: ImageId) -> Result<Vec<ImageModification>, StoreError> {
        Ok(self
            .modifications
            .iter()
            .filter(|m| m.image_id == image)
            .cloned()
            .collect())
    }

    fn find_resolution(&self, id: ResolutionId) -> Result<Option<ImageResolution>, StoreError> {
        Ok(self.resolution(id).cloned())
    }

    fn find_resolutions_for_context(
        &self,
        context: ContextId,
    ) -> Result<Vec<ImageResolution>, StoreError> {
        let mut found: Vec<ImageResolution> = self
            .resolutions
            .iter()
            .filter(|r| r.contexts.contains(&context))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }
}

impl ImageSource for Catalog {
    fn find_image(&self, id: ImageId) -> Result<Option<Image>, StoreError> {
        Ok(self.image(id))
    }

    fn read_original(&self, image: &Image) -> Result<Vec<u8>, StoreError> {
        if let Some(bytes) = self.originals.get(&image.id) {
            return Ok(bytes.to_vec());
        }
        let source = self
            .images
            .iter()
            .find(|i| i.id == image.id)
            .and_then(|i| i.source.as_ref())
            .ok_or_else(|| StoreError::Missing(format!("original of image {}", image.id)))?;
        let path = match &self.base_dir {
            Some(dir) => dir.join(source),
            None => source.clone(),
        };
        Ok(fs::read(path)?)
    }
}

/// A catalog consistency finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogIssue {
    UndefinedImage {
        image: ImageId,
    },
    UnsetResolution {
        resolution: ResolutionId,
    },
    UnknownImage {
        image: ImageId,
    },
    UnknownContext {
        context: ContextId,
    },
    UnknownResolution {
        image: ImageId,
        resolution: ResolutionId,
    },
    DuplicateModification {
        image: ImageId,
        context: ContextId,
        resolution: ResolutionId,
    },
    EmptyCrop {
        image: ImageId,
        resolution: ResolutionId,
    },
    CropOutsideImage {
        image: ImageId,
        resolution: ResolutionId,
    },
}

impl fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogIssue::UndefinedImage { image } => {
                write!(f, "image {image} has a zero width or height")
            }
            CatalogIssue::UnsetResolution { resolution } => {
                write!(f, "resolution {resolution} has neither width nor height")
            }
            CatalogIssue::UnknownImage { image } => {
                write!(f, "modification references unknown image {image}")
            }
            CatalogIssue::UnknownContext { context } => {
                write!(f, "unknown context {context}")
            }
            CatalogIssue::UnknownResolution { image, resolution } => write!(
                f,
                "modification of image {image} references unknown resolution {resolution}"
            ),
            CatalogIssue::DuplicateModification {
                image,
                context,
                resolution,
            } => write!(
                f,
                "image {image} has more than one modification for context {context}, resolution {resolution}"
            ),
            CatalogIssue::EmptyCrop { image, resolution } => {
                write!(f, "image {image}, resolution {resolution}: crop is empty")
            }
            CatalogIssue::CropOutsideImage { image, resolution } => write!(
                f,
                "image {image}, resolution {resolution}: crop extends past the image"
            ),
        }
    }
}
