//! Domain error taxonomy.
//!
//! Covers exactly the failure modes a `Transport`/`ImageDecoder` pair can
//! return: network failure, timeout, and undecodable bytes. Cancellation and
//! budget overflow are not failures of a fetch or decode call — they're
//! signaled directly as events (`LoaderEvent::Abort`,
//! `ControllerEvent::RamOverflow`/`VideoOverflow`), so they have no
//! corresponding `CacheError` variant.

use thiserror::Error;

/// Errors surfaced by the `Transport` and `ImageDecoder` ports.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Connection failure or non-2xx response.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The configured fetch timeout elapsed before the response completed.
    #[error("request timed out")]
    Timeout,

    /// Bytes were fetched successfully but could not be decoded as an
    /// image.
    #[error("image bytes could not be decoded: {0}")]
    BlobError(String),
}
