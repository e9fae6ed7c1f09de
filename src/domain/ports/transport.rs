//! The `Transport` port: fetching raw bytes for an Image's source URL.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::CacheError;

/// A request to fetch bytes from a source URL.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Source URL to fetch.
    pub url: String,
    /// Extra headers to send with the request (e.g. `Authorization`).
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    /// Creates a request for the given URL with no extra headers.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Adds a header, returning the request for chaining.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Callback used by a `Transport` implementation to report fetch progress.
/// `total` is `None` until the response reports its expected length.
pub struct ProgressSink(Box<dyn Fn(u64, Option<u64>) + Send + Sync>);

impl ProgressSink {
    /// Wraps a closure as a progress sink.
    pub fn new(callback: impl Fn(u64, Option<u64>) + Send + Sync + 'static) -> Self {
        Self(Box::new(callback))
    }

    /// Reports progress: `loaded` bytes so far out of `total` (if known).
    pub fn report(&self, loaded: u64, total: Option<u64>) {
        (self.0)(loaded, total);
    }

    /// A sink that discards every report.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_, _| {})
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressSink(..)")
    }
}

/// External collaborator responsible for fetching the raw bytes of an
/// Image's source. Implementations report progress through the supplied
/// sink as bytes arrive so the engine can surface load progress without
/// depending on any particular HTTP client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches the bytes at `request.url`, reporting progress through
    /// `progress` as they arrive.
    async fn fetch(&self, request: &FetchRequest, progress: &ProgressSink) -> Result<Bytes, CacheError>;
}

#[cfg(test)]
pub mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{async_trait, Bytes, CacheError, FetchRequest, ProgressSink, Transport};

    /// Scripted outcome for a single URL in [`FakeTransport`].
    pub enum FakePlan {
        /// Resolve with these bytes, reporting one progress update first.
        Success(Bytes),
        /// Resolve with this error.
        Fail(CacheError),
        /// Never resolve until the caller aborts the fetch task — used to
        /// exercise cancellation and timeout paths.
        Hang,
    }

    /// Deterministic `Transport` double driven entirely by pre-scripted
    /// per-URL outcomes; never touches the network.
    pub struct FakeTransport {
        plans: Mutex<HashMap<String, FakePlan>>,
    }

    impl FakeTransport {
        /// Creates an empty fake; configure it with `set`.
        #[must_use]
        pub fn new() -> Self {
            Self {
                plans: Mutex::new(HashMap::new()),
            }
        }

        /// Scripts the outcome for `url`.
        pub fn set(&self, url: impl Into<String>, plan: FakePlan) {
            self.plans.lock().unwrap().insert(url.into(), plan);
        }
    }

    impl Default for FakeTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn fetch(&self, request: &FetchRequest, progress: &ProgressSink) -> Result<Bytes, CacheError> {
            let plan = {
                let plans = self.plans.lock().unwrap();
                match plans.get(&request.url) {
                    Some(FakePlan::Success(bytes)) => Some(Ok(bytes.clone())),
                    Some(FakePlan::Fail(err)) => Some(Err(err.clone())),
                    Some(FakePlan::Hang) | None => None,
                }
            };
            match plan {
                Some(Ok(bytes)) => {
                    progress.report(bytes.len() as u64, Some(bytes.len() as u64));
                    Ok(bytes)
                }
                Some(Err(err)) => Err(err),
                None => std::future::pending().await,
            }
        }
    }

    /// Packs `width`/`height` into a tiny byte buffer that
    /// `FakeDecoder` can read back, so tests never need a real image
    /// codec.
    #[must_use]
    pub fn fake_image_bytes(width: u32, height: u32) -> Bytes {
        let mut buf = Vec::with_capacity(8);
        buf.extend_from_slice(&width.to_le_bytes());
        buf.extend_from_slice(&height.to_le_bytes());
        Bytes::from(buf)
    }
}
