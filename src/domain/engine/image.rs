//! Represents one fetchable source URL: the compressed blob, derived
//! dimensions, and the set of RenderRequests attached to it.

use std::collections::HashSet;
use std::time::Instant;

use bytes::Bytes;

use crate::domain::entities::{ImageId, RenderRequestId};
use crate::domain::events::{EventBus, ImageEvent};

/// The cache entry for one source URL. At most one `Image` exists per URL
/// across a Controller; creation and destruction are driven by the
/// Controller, not by the Image itself.
pub struct Image {
    id: ImageId,
    url: String,
    bytes: u64,
    bytes_uncompressed: u64,
    got_size: bool,
    decoded: bool,
    loaded: bool,
    cleared: bool,
    requests: HashSet<RenderRequestId>,
    last_rendered: Option<Instant>,
    blob: Option<Bytes>,
    progress_loaded: u64,
    progress_total: Option<u64>,
    pub(crate) events: EventBus<ImageEvent>,
}

impl Image {
    /// Creates a freshly constructed, not-yet-loaded Image for `url`.
    #[must_use]
    pub fn new(id: ImageId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            bytes: 0,
            bytes_uncompressed: 0,
            got_size: false,
            decoded: false,
            loaded: false,
            cleared: false,
            requests: HashSet::new(),
            last_rendered: None,
            blob: None,
            progress_loaded: 0,
            progress_total: None,
            events: EventBus::new(),
        }
    }

    /// The image's identity.
    #[must_use]
    pub fn id(&self) -> &ImageId {
        &self.id
    }

    /// The source URL this Image was fetched from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Compressed byte size once known (0 before `loadend`).
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// True once natural pixel dimensions have been determined.
    #[must_use]
    pub fn got_size(&self) -> bool {
        self.got_size
    }

    /// True once at least one attached RenderRequest has been rendered.
    #[must_use]
    pub fn decoded(&self) -> bool {
        self.decoded
    }

    /// True once the byte fetch completed successfully.
    #[must_use]
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// True once `clear()` has run. A cleared Image must not be reused.
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    /// Number of RenderRequests currently attached.
    #[must_use]
    pub fn render_request_count(&self) -> usize {
        self.requests.len()
    }

    /// The most recent time any attached RenderRequest was rendered, used
    /// by eviction as the LRU key. `None` sorts before `Some`, so a
    /// never-rendered Image is the most evictable.
    #[must_use]
    pub fn last_rendered(&self) -> Option<Instant> {
        self.last_rendered
    }

    /// Called by the Network when the Loader for this Image starts.
    pub fn on_load_start(&mut self) {
        self.events.emit(&ImageEvent::LoadStart);
    }

    /// Called by the Network as Loader progress arrives.
    pub fn on_loader_progress(&mut self, loaded: u64, total: Option<u64>) {
        self.progress_loaded = loaded;
        self.progress_total = total;
        self.events.emit(&ImageEvent::Progress { loaded, total });
    }

    /// Current fetch progress: bytes loaded so far, and total expected
    /// bytes if known. Falls back to `(bytes_loaded_so_far, None)` before
    /// any progress has been reported.
    #[must_use]
    pub fn progress(&self) -> (u64, Option<u64>) {
        (self.progress_loaded, self.progress_total)
    }

    /// Called by the Network when the fetch completes successfully.
    /// Materialises the blob and emits `loadend`; the decoder-determined
    /// size arrives separately via `on_size`.
    pub fn on_loaded(&mut self, bytes: Bytes) {
        self.bytes = bytes.len() as u64;
        self.blob = Some(bytes);
        self.loaded = true;
        self.events.emit(&ImageEvent::LoadEnd);
    }

    /// Called once the decoder reports natural pixel dimensions.
    pub fn on_size(&mut self, width: u32, height: u32) {
        self.got_size = true;
        self.bytes_uncompressed = u64::from(width) * u64::from(height) * 4;
        self.events.emit(&ImageEvent::Size { width, height });
    }

    /// Called when the decoder could not parse the fetched bytes as an
    /// image.
    pub fn on_blob_error(&mut self, message: impl Into<String>) {
        self.events.emit(&ImageEvent::BlobError {
            message: message.into(),
        });
    }

    /// Called when the underlying fetch failed before bytes were decoded
    /// (network error, timeout, or abort).
    pub fn on_load_error(&mut self, message: impl Into<String>) {
        self.events.emit(&ImageEvent::LoadError {
            message: message.into(),
        });
    }

    /// Attaches a RenderRequest to this Image.
    pub fn register_request(&mut self, request: RenderRequestId) {
        self.requests.insert(request);
        self.events.emit(&ImageEvent::RenderRequestAdded { request });
    }

    /// Detaches a RenderRequest from this Image.
    pub fn unregister_request(&mut self, request: RenderRequestId) {
        self.requests.remove(&request);
        self.events
            .emit(&ImageEvent::RenderRequestRemoved { request });
    }

    /// Returns true if no RenderRequest is currently attached.
    #[must_use]
    pub fn has_no_requests(&self) -> bool {
        self.requests.is_empty()
    }

    /// Returns true if `request` is attached to this Image.
    #[must_use]
    pub fn has_request(&self, request: RenderRequestId) -> bool {
        self.requests.contains(&request)
    }

    /// Iterates the ids of every attached RenderRequest.
    pub fn requests(&self) -> impl Iterator<Item = &RenderRequestId> {
        self.requests.iter()
    }

    /// Called when the view layer reports a RenderRequest was painted,
    /// marking the Image decoded and updating its LRU timestamp.
    pub fn mark_rendered(&mut self, request: RenderRequestId, at: Instant) {
        self.decoded = true;
        self.last_rendered = Some(at);
        self.events
            .emit(&ImageEvent::RenderRequestRendered { request });
    }

    /// `bytes + (decoded ? bytes_uncompressed : 0)`, the RAM cost formula.
    #[must_use]
    pub fn get_bytes_ram(&self) -> u64 {
        self.bytes + if self.decoded { self.bytes_uncompressed } else { 0 }
    }

    /// Releases the blob, resets decode state, unregisters every attached
    /// RenderRequest, and emits `clear`. Idempotent: a second call observes
    /// `is_cleared()` and does nothing.
    pub fn clear(&mut self) {
        if self.cleared {
            return;
        }
        self.cleared = true;
        self.blob = None;
        self.got_size = false;
        self.bytes_uncompressed = 0;
        self.decoded = false;
        for request in self.requests.drain().collect::<Vec<_>>() {
            self.events
                .emit(&ImageEvent::RenderRequestRemoved { request });
        }
        self.events.emit(&ImageEvent::Clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Image {
        Image::new(ImageId::new("img"), "https://example.com/a.png")
    }

    #[test]
    fn bytes_uncompressed_counts_only_once_decoded() {
        let mut img = image();
        img.on_loaded(Bytes::from_static(b"12345"));
        img.on_size(100, 100);
        assert_eq!(img.get_bytes_ram(), 5);

        img.mark_rendered(RenderRequestId::new(1), Instant::now());
        assert_eq!(img.get_bytes_ram(), 5 + 40_000);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut img = image();
        img.on_loaded(Bytes::from_static(b"12345"));
        img.on_size(10, 10);
        img.register_request(RenderRequestId::new(1));
        img.mark_rendered(RenderRequestId::new(1), Instant::now());

        img.clear();
        assert!(img.is_cleared());
        assert!(img.has_no_requests());
        assert_eq!(img.get_bytes_ram(), 0);

        img.clear();
        assert!(img.is_cleared());
    }

    #[test]
    fn register_then_unregister_is_a_no_op_on_occupancy() {
        let mut img = image();
        let request = RenderRequestId::new(7);
        img.register_request(request);
        assert_eq!(img.render_request_count(), 1);
        img.unregister_request(request);
        assert_eq!(img.render_request_count(), 0);
    }

    #[test]
    fn never_rendered_sorts_before_rendered_for_lru() {
        let mut a = image();
        let mut b = Image::new(ImageId::new("img-b"), "https://example.com/b.png");
        b.mark_rendered(RenderRequestId::new(1), Instant::now());
        assert!(a.last_rendered() < b.last_rendered());
        let _ = &mut a;
    }
}
