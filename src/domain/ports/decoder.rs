//! The `ImageDecoder` port: determining an Image's natural pixel
//! dimensions from its fetched bytes.

use crate::domain::errors::CacheError;

/// External collaborator that inspects fetched bytes and reports the
/// image's natural pixel dimensions, without fully rasterizing it. Kept
/// separate from `Transport` so a decoder can be swapped (or faked in
/// tests) independently of how bytes were obtained.
pub trait ImageDecoder: Send + Sync {
    /// Returns the `(width, height)` of the image encoded in `bytes`, or
    /// `CacheError::BlobError` if the bytes are not a supported, valid
    /// image.
    fn decode_dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), CacheError>;
}

#[cfg(test)]
pub mod mock {
    use super::{CacheError, ImageDecoder};

    /// Reads back the `width`/`height` packed by
    /// `super::super::transport::mock::fake_image_bytes`, so engine tests
    /// never depend on a real image codec.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FakeDecoder;

    impl ImageDecoder for FakeDecoder {
        fn decode_dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), CacheError> {
            if bytes.len() < 8 {
                return Err(CacheError::BlobError("not enough bytes".to_string()));
            }
            let width = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
            let height = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
            Ok((width, height))
        }
    }
}
