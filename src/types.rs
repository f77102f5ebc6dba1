//! Domain identities shared by the resolver, the guard and the service.
//!
//! Images, contexts, resolutions and modifications are owned by external
//! collaborators; this crate only reads them. [`VariantKey`] is the identity
//! of one rendered output and the unit of deduplication in
//! [`guard`](crate::guard).

use crate::geometry::{Crop, Dimensions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identity of an original image.
    ImageId
);
id_type!(
    /// Identity of a publishing context.
    ContextId
);
id_type!(
    /// Identity of a named target resolution.
    ResolutionId
);

/// Encoding of an original image or of a rendered variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Jpeg,
    Png,
    Gif,
    Webp,
    Tiff,
    Svg,
    Eps,
    Pdf,
}

impl ImageType {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "image/jpeg",
            ImageType::Png => "image/png",
            ImageType::Gif => "image/gif",
            ImageType::Webp => "image/webp",
            ImageType::Tiff => "image/tiff",
            ImageType::Svg => "image/svg+xml",
            ImageType::Eps => "application/postscript",
            ImageType::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpeg",
            ImageType::Png => "png",
            ImageType::Gif => "gif",
            ImageType::Webp => "webp",
            ImageType::Tiff => "tif",
            ImageType::Svg => "svg",
            ImageType::Eps => "eps",
            ImageType::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// An original image as registered by the asset store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub dimensions: Dimensions,
    #[serde(rename = "type")]
    pub image_type: ImageType,
}

/// A publishing channel with its own resolution catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContext {
    pub id: ContextId,
    pub code: String,
}

/// A named target output shape.
///
/// A zero `width` or `height` is derived from the image's aspect ratio at
/// resolution time. Both zero is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResolution {
    pub id: ResolutionId,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Contexts whose catalog lists this resolution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<ContextId>,
}

impl ImageResolution {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// An editorially approved crop for one `(image, context, resolution)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageModification {
    pub image_id: ImageId,
    pub context_id: ContextId,
    pub resolution_id: ResolutionId,
    pub crop: Crop,
}

/// Rendering options that are not geometry. The output format is chosen
/// by the caller and carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantSpec {
    pub output: ImageType,
}

impl VariantSpec {
    pub fn new(output: ImageType) -> Self {
        Self { output }
    }
}

/// Identity of one concrete renderable output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    pub image_id: ImageId,
    pub context_id: ContextId,
    pub resolution_id: ResolutionId,
    pub variant: VariantSpec,
}

impl VariantKey {
    pub fn new(
        image_id: ImageId,
        context_id: ContextId,
        resolution_id: ResolutionId,
        variant: VariantSpec,
    ) -> Self {
        Self {
            image_id,
            context_id,
            resolution_id,
            variant,
        }
    }

    /// SHA-256 hex digest of every key field, usable as a storage name.
    ///
    /// Each field is tagged and NUL-separated so no two keys share a
    /// preimage.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"image\0");
        hasher.update(self.image_id.0.to_le_bytes());
        hasher.update(b"context\0");
        hasher.update(self.context_id.0.to_le_bytes());
        hasher.update(b"resolution\0");
        hasher.update(self.resolution_id.0.to_le_bytes());
        hasher.update(b"output\0");
        hasher.update(self.variant.output.extension().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "image {} / context {} / resolution {} / {}",
            self.image_id, self.context_id, self.resolution_id, self.variant.output
        )
    }
}

/// A materialized variant. Cloning shares the byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub key: VariantKey,
    pub bytes: Arc<[u8]>,
}

impl Artifact {
    pub fn new(key: VariantKey, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            key,
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
