//! A single (Image, size, Bucket) binding and its readiness to paint.

use std::time::Instant;

use crate::domain::entities::{BucketName, ImageId, RenderRequestId, Size};
use crate::domain::events::{EventBus, RenderRequestEvent};

/// Lifecycle state of a [`RenderRequest`]. Transitions only move forward,
/// except that any state (other than `Cleared`) can re-enter
/// `ImageLoaded`-adjacent states is not modelled; clearing is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// Just constructed, not yet attached to a Network fetch.
    Created,
    /// Attached to an Image that has not yet reported its natural size.
    ImagePending,
    /// The owning Image has reported its natural size; `bytes_video()` is
    /// meaningful.
    ImageLoaded,
    /// The view layer has painted this request's bitmap at least once.
    Rendered,
    /// The request has been detached and must not be reused.
    Cleared,
}

/// Represents one (Image, size, Bucket) triple: a consumer's desire to
/// display a particular Image at a particular pixel size within a
/// particular Bucket.
pub struct RenderRequest {
    id: RenderRequestId,
    image: ImageId,
    bucket: BucketName,
    size: Size,
    state: RenderState,
    pinned: bool,
    visible: bool,
    last_rendered: Option<Instant>,
    pub(crate) events: EventBus<RenderRequestEvent>,
}

impl RenderRequest {
    /// Creates a new RenderRequest in state `Created`, not yet pinned and
    /// assumed visible.
    #[must_use]
    pub fn new(id: RenderRequestId, image: ImageId, bucket: BucketName, size: Size) -> Self {
        Self {
            id,
            image,
            bucket,
            size,
            state: RenderState::Created,
            pinned: false,
            visible: true,
            last_rendered: None,
            events: EventBus::new(),
        }
    }

    /// This request's identity.
    #[must_use]
    pub fn id(&self) -> RenderRequestId {
        self.id
    }

    /// The Image this request references.
    #[must_use]
    pub fn image(&self) -> &ImageId {
        &self.image
    }

    /// The Bucket this request belongs to.
    #[must_use]
    pub fn bucket(&self) -> &BucketName {
        &self.bucket
    }

    /// The requested pixel size.
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Decoded (RGBA) byte cost of painting this request's Image at
    /// `size()`.
    #[must_use]
    pub fn bytes_video(&self) -> u64 {
        self.size.bytes_video()
    }

    /// A request is locked when its Bucket is locked or it carries its own
    /// pin, per the Bucket's derived-lock rule: locking a Bucket implies
    /// every request in it is locked, and unlocking restores per-request
    /// locks only.
    #[must_use]
    pub fn is_locked(&self, bucket_locked: bool) -> bool {
        bucket_locked || self.pinned
    }

    /// Returns true if this request carries its own pin, independent of
    /// its Bucket's lock state.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Sets or clears this request's own pin.
    pub fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    /// Returns true if the view layer currently considers this request
    /// visible (used to prefer evicting off-screen requests first).
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Updates visibility, as reported by the view layer.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Moves to `ImagePending`: the request is attached and its Image is
    /// fetching but has not yet reported a size.
    pub fn mark_pending(&mut self) {
        if self.state == RenderState::Created {
            self.state = RenderState::ImagePending;
        }
    }

    /// Moves to `ImageLoaded`, called when the owning Image emits `size`.
    pub fn on_image_loaded(&mut self) {
        if matches!(self.state, RenderState::Created | RenderState::ImagePending) {
            self.state = RenderState::ImageLoaded;
        }
    }

    /// Returns true once the view layer has painted this request at least
    /// once.
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        matches!(self.state, RenderState::Rendered)
    }

    /// The last time the view layer painted this request.
    #[must_use]
    pub fn last_rendered(&self) -> Option<Instant> {
        self.last_rendered
    }

    /// Called by the view layer after painting the bitmap. Moves to
    /// `Rendered` and emits a `rendered` event the owning Image consumes
    /// to mark itself decoded.
    pub fn mark_rendered(&mut self, at: Instant) {
        self.state = RenderState::Rendered;
        self.last_rendered = Some(at);
        self.events.emit(&RenderRequestEvent::Rendered);
    }

    /// Moves to the terminal `Cleared` state.
    pub fn mark_cleared(&mut self) {
        self.state = RenderState::Cleared;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RenderRequest {
        RenderRequest::new(
            RenderRequestId::new(1),
            ImageId::new("img"),
            BucketName::new("bucket"),
            Size::new(100, 100),
        )
    }

    #[test]
    fn bytes_video_matches_size_formula() {
        assert_eq!(request().bytes_video(), 40_000);
    }

    #[test]
    fn locked_when_bucket_locked_or_pinned() {
        let mut req = request();
        assert!(!req.is_locked(false));
        assert!(req.is_locked(true));
        req.set_pinned(true);
        assert!(req.is_locked(false));
    }

    #[test]
    fn state_advances_through_lifecycle() {
        let mut req = request();
        assert_eq!(req.state(), RenderState::Created);
        req.mark_pending();
        assert_eq!(req.state(), RenderState::ImagePending);
        req.on_image_loaded();
        assert_eq!(req.state(), RenderState::ImageLoaded);
        req.mark_rendered(Instant::now());
        assert_eq!(req.state(), RenderState::Rendered);
        assert!(req.is_rendered());
        req.mark_cleared();
        assert_eq!(req.state(), RenderState::Cleared);
    }
}
