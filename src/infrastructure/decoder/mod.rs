//! Default `ImageDecoder` adapter.

mod image_crate;

pub use image_crate::ImageCrateDecoder;
