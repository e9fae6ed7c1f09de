//! Stable identifiers used to cross-reference cache entities by id rather
//! than by pointer (arena-style ownership, see `DESIGN.md`).

/// Unique identifier for an `Image`, derived from a hash of its source URL
/// so that requesting the same URL twice always resolves to the same cache
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(String);

impl ImageId {
    /// Creates an `ImageId` from any string-like input, bypassing hashing.
    /// Mainly useful in tests where a readable id is more convenient than a
    /// hash.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives an `ImageId` from a source URL by hashing it, so that the
    /// same URL always produces the same id regardless of how many times it
    /// is requested.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for a `RenderRequest`, allocated by the `Controller`
/// on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderRequestId(u64);

impl RenderRequestId {
    /// Wraps a raw id. Only the Controller should construct these outside
    /// of tests.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RenderRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request#{}", self.0)
    }
}

/// Name of a `Bucket`, unique within one `Controller`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketName(String);

impl BucketName {
    /// Creates a new bucket name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BucketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BucketName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BucketName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_id_from_url_is_deterministic() {
        let url = "https://example.com/image.png";
        assert_eq!(ImageId::from_url(url), ImageId::from_url(url));
    }

    #[test]
    fn image_id_from_url_differs_across_urls() {
        let a = ImageId::from_url("https://example.com/a.png");
        let b = ImageId::from_url("https://example.com/b.png");
        assert_ne!(a, b);
    }

    #[test]
    fn render_request_id_roundtrips() {
        let id = RenderRequestId::new(42);
        assert_eq!(id.as_u64(), 42);
    }
}
