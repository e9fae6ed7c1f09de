//! Infrastructure layer: default adapters for the domain's ports.

/// CLI-driven configuration, converted into a `domain::engine::CacheConfig`.
pub mod config;
/// Default `ImageDecoder` adapter.
pub mod decoder;
/// Default `Transport` adapter.
pub mod transport;

pub use config::{CacheConfigArgs, LogLevel};
pub use decoder::ImageCrateDecoder;
pub use transport::ReqwestTransport;
