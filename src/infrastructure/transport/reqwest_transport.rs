//! `Transport` adapter backed by `reqwest`, reporting progress as chunks
//! of the response body arrive.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::Client;

use crate::domain::errors::CacheError;
use crate::domain::ports::{FetchRequest, ProgressSink, Transport};

/// Fetches bytes over HTTP(S) via a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a transport around a fresh `reqwest::Client`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: &FetchRequest, progress: &ProgressSink) -> Result<Bytes, CacheError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| CacheError::NetworkError(err.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|err| CacheError::NetworkError(err.to_string()))?;

        let total = response.content_length();
        let mut loaded: u64 = 0;
        let mut buffer = BytesMut::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| CacheError::NetworkError(err.to_string()))?;
            loaded += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);
            progress.report(loaded, total);
        }

        Ok(buffer.freeze())
    }
}
