//! A named group of RenderRequests sharing a lifecycle and aggregate
//! progress.

use std::collections::HashSet;

use crate::domain::entities::{BucketName, RenderRequestId};
use crate::domain::events::{BucketEvent, EventBus};

/// Names a group of RenderRequests belonging to one logical view. Locking
/// a Bucket pins every RenderRequest in it against eviction; the Bucket
/// only weakly references its requests — the Controller owns their actual
/// destruction.
pub struct Bucket {
    name: BucketName,
    locked: bool,
    requests: HashSet<RenderRequestId>,
    pub(crate) events: EventBus<BucketEvent>,
}

impl Bucket {
    /// Creates a bucket, optionally starting locked.
    #[must_use]
    pub fn new(name: BucketName, locked: bool) -> Self {
        Self {
            name,
            locked,
            requests: HashSet::new(),
            events: EventBus::new(),
        }
    }

    /// This bucket's name.
    #[must_use]
    pub fn name(&self) -> &BucketName {
        &self.name
    }

    /// True if the bucket is currently locked, pinning every request it
    /// contains.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Locks the bucket. Every RenderRequest currently or later attached
    /// is considered locked via `RenderRequest::is_locked` until unlocked.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Unlocks the bucket. Restores each request's own `pinned` flag as
    /// the sole determinant of its lock state.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Attaches a RenderRequest id to this bucket.
    pub fn add_request(&mut self, request: RenderRequestId) {
        self.requests.insert(request);
    }

    /// Detaches a RenderRequest id from this bucket. Returns true if it
    /// was present.
    pub fn remove_request(&mut self, request: RenderRequestId) -> bool {
        self.requests.remove(&request)
    }

    /// Iterates the ids of every RenderRequest currently in this bucket.
    pub fn requests(&self) -> impl Iterator<Item = &RenderRequestId> {
        self.requests.iter()
    }

    /// Number of RenderRequests currently in this bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if this bucket has no RenderRequests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Detaches every RenderRequest id, returning them to the caller so it
    /// can drive the actual unregistration from their Images, and emits
    /// `clear`.
    pub fn clear(&mut self) -> Vec<RenderRequestId> {
        let drained: Vec<_> = self.requests.drain().collect();
        self.events.emit(&BucketEvent::Clear);
        drained
    }

    /// Reports aggregate load progress across the bucket's distinct
    /// Images.
    pub fn report_progress(&self, loaded: u64, total: u64) {
        self.events.emit(&BucketEvent::Progress { loaded, total });
    }

    /// Reports that every Image referenced by the bucket finished
    /// loading.
    pub fn report_load_end(&self) {
        self.events.emit(&BucketEvent::LoadEnd);
    }

    /// Reports that an Image referenced by the bucket failed to load.
    pub fn report_error(&self, message: impl Into<String>) {
        self.events.emit(&BucketEvent::Error {
            message: message.into(),
        });
    }

    /// Reports that a RenderRequest in the bucket was rendered.
    pub fn report_rendered(&self) {
        self.events.emit(&BucketEvent::Rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_drains_and_returns_all_requests() {
        let mut bucket = Bucket::new(BucketName::new("b"), false);
        bucket.add_request(RenderRequestId::new(1));
        bucket.add_request(RenderRequestId::new(2));
        let drained = bucket.clear();
        assert_eq!(drained.len(), 2);
        assert!(bucket.is_empty());
    }

    #[test]
    fn lock_and_unlock_toggle_state() {
        let mut bucket = Bucket::new(BucketName::new("b"), false);
        assert!(!bucket.is_locked());
        bucket.lock();
        assert!(bucket.is_locked());
        bucket.unlock();
        assert!(!bucket.is_locked());
    }

    #[test]
    fn report_error_emits_bucket_event_with_message() {
        use std::sync::{Arc, Mutex};

        let mut bucket = Bucket::new(BucketName::new("b"), false);
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        bucket.events.on(move |event| {
            if let BucketEvent::Error { message } = event {
                received_clone.lock().unwrap().push(message.clone());
            }
        });

        bucket.report_error("connection reset");

        assert_eq!(received.lock().unwrap().as_slice(), ["connection reset".to_string()]);
    }
}
