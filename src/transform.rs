//! Transform engines: the external pixel renderers this crate drives.
//!
//! Engines are injected as an ordered list into a [`TransformRegistry`].
//! For each request every engine reports a [`Capability`]; the first
//! `Preferred` engine renders, else the first `Fallback` one.
//!
//! Rendering is slow and memory hungry, so [`TransformPermits`] caps how
//! many transforms run at once across all variant keys.

use crate::geometry::{Crop, Dimensions};
use crate::resolver::ResolvedModification;
use crate::types::ImageType;
use serde::Serialize;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("No transform engine renders {source_type} to {output}")]
    NoCapableEngine {
        source_type: ImageType,
        output: ImageType,
    },
    #[error("Transform engine {engine} failed: {message}")]
    Failed { engine: String, message: String },
    #[error("Transform engine {engine} returned no data")]
    EmptyOutput { engine: String },
}

/// Everything an engine needs besides the source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransformRequest {
    pub source_type: ImageType,
    pub original: Dimensions,
    pub crop: Crop,
    pub output: Dimensions,
    pub format: ImageType,
}

impl TransformRequest {
    pub fn new(
        source_type: ImageType,
        original: Dimensions,
        resolved: &ResolvedModification,
        format: ImageType,
    ) -> Self {
        Self {
            source_type,
            original,
            crop: resolved.crop,
            output: resolved.output,
            format,
        }
    }
}

/// How well an engine handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Preferred,
    Fallback,
    Unsupported,
}

/// A pixel renderer.
pub trait TransformEngine: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    fn capability(&self, request: &TransformRequest) -> Capability;

    /// Crop `source` to `request.crop`, scale to `request.output` and encode
    /// as `request.format`.
    fn render(&self, source: &[u8], request: &TransformRequest) -> Result<Vec<u8>, TransformError>;
}

/// Ordered, capability-checked list of engines.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    engines: Vec<Arc<dyn TransformEngine>>,
}

impl TransformRegistry {
    pub fn new(engines: Vec<Arc<dyn TransformEngine>>) -> Self {
        Self { engines }
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// First preferred engine, else first fallback engine.
    pub fn select(&self, request: &TransformRequest) -> Result<&dyn TransformEngine, TransformError> {
        let mut fallback = None;
        for engine in &self.engines {
            match engine.capability(request) {
                Capability::Preferred => return Ok(engine.as_ref()),
                Capability::Fallback if fallback.is_none() => fallback = Some(engine.as_ref()),
                _ => {}
            }
        }
        fallback.ok_or(TransformError::NoCapableEngine {
            source_type: request.source_type,
            output: request.format,
        })
    }

    /// Render with the selected engine. Empty output is an error.
    pub fn render(&self, source: &[u8], request: &TransformRequest) -> Result<Vec<u8>, TransformError> {
        let engine = self.select(request)?;
        tracing::debug!(engine = engine.name(), crop = %request.crop, output = %request.output, "rendering");
        let bytes = engine.render(source, request)?;
        if bytes.is_empty() {
            return Err(TransformError::EmptyOutput {
                engine: engine.name().to_string(),
            });
        }
        Ok(bytes)
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.engines.iter().map(|e| e.name()))
            .finish()
    }
}

/// Counting permit pool bounding concurrent transforms.
#[derive(Debug)]
pub struct TransformPermits {
    available: Mutex<usize>,
    released: Condvar,
    limit: usize,
}

impl TransformPermits {
    /// A pool of `limit` permits (at least one).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            available: Mutex::new(limit),
            released: Condvar::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        *self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is free. The permit returns to the pool on drop.
    pub fn acquire(&self) -> TransformPermit<'_> {
        let mut available = self.available.lock().unwrap_or_else(PoisonError::into_inner);
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        TransformPermit { pool: self }
    }
}

/// A held transform permit.
#[derive(Debug)]
pub struct TransformPermit<'a> {
    pool: &'a TransformPermits,
}

impl Drop for TransformPermit<'_> {
    fn drop(&mut self) {
        let mut available = self
            .pool
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *available += 1;
        self.pool.released.notify_one();
    }
}
