//! `ImageDecoder` adapter backed by the `image` crate.

use crate::domain::errors::CacheError;
use crate::domain::ports::ImageDecoder;

/// Decodes natural pixel dimensions using `image::load_from_memory`.
/// Decoding itself is CPU-bound; callers are expected to run it inside
/// `tokio::task::spawn_blocking` (the Controller does this for every
/// fetched Image).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl ImageCrateDecoder {
    /// Creates a decoder. Stateless; cheap to construct per-call.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ImageDecoder for ImageCrateDecoder {
    fn decode_dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), CacheError> {
        let image = image::load_from_memory(bytes).map_err(|err| CacheError::BlobError(err.to_string()))?;
        Ok((image.width(), image.height()))
    }
}
