//! Tagged-variant event buses.
//!
//! The original design this crate is modeled on dispatches dynamically
//! typed events through a single polymorphic `on`/`off`/`emit` surface per
//! entity. This crate replaces that with one enumerated event type per
//! entity and a small typed pub/sub registry (`EventBus<E>`), eliminating
//! the type-cast bridges the dynamic version needs.

use crate::domain::entities::{ImageId, RenderRequestId};

/// Opaque handle returned by [`EventBus::on`], used to unregister a
/// handler with [`EventBus::off`].
pub type HandlerId = u64;

/// A minimal typed publish/subscribe registry for one entity's event
/// stream. Handlers run synchronously, in registration order, on whichever
/// thread calls [`EventBus::emit`].
pub struct EventBus<E> {
    next_id: HandlerId,
    handlers: Vec<(HandlerId, Box<dyn Fn(&E) + Send + Sync>)>,
}

impl<E> EventBus<E> {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 0,
            handlers: Vec::new(),
        }
    }

    /// Registers a handler, returning an id that can later be passed to
    /// [`EventBus::off`].
    pub fn on(&mut self, handler: impl Fn(&E) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Unregisters a handler. A no-op if the id is unknown (e.g. already
    /// removed).
    pub fn off(&mut self, id: HandlerId) {
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
    }

    /// Invokes every registered handler with the event, in registration
    /// order.
    pub fn emit(&self, event: &E) {
        for (_, handler) in &self.handlers {
            handler(event);
        }
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Events emitted by an `Image` over its lifetime.
#[derive(Debug, Clone)]
pub enum ImageEvent {
    /// The underlying Loader has started fetching bytes.
    LoadStart,
    /// A chunk of bytes has arrived; `total` is `None` until a
    /// `Content-Length` (or equivalent) is known.
    Progress {
        /// Bytes fetched so far.
        loaded: u64,
        /// Total expected bytes, if known.
        total: Option<u64>,
    },
    /// The byte fetch completed successfully.
    LoadEnd,
    /// Natural pixel dimensions were determined by the decoder.
    Size {
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
    },
    /// Bytes were fetched but could not be decoded as an image.
    BlobError {
        /// Decoder failure message.
        message: String,
    },
    /// The underlying fetch failed (network error, timeout, or abort
    /// reported before bytes were ever decoded).
    LoadError {
        /// Failure message.
        message: String,
    },
    /// A RenderRequest started referencing this Image.
    RenderRequestAdded {
        /// The request that was added.
        request: RenderRequestId,
    },
    /// A RenderRequest stopped referencing this Image.
    RenderRequestRemoved {
        /// The request that was removed.
        request: RenderRequestId,
    },
    /// One of this Image's RenderRequests was painted by the view layer.
    RenderRequestRendered {
        /// The request that was rendered.
        request: RenderRequestId,
    },
    /// The Image was cleared (evicted or orphaned) and is now dead.
    Clear,
}

/// Events emitted by a single `RenderRequest`.
#[derive(Debug, Clone)]
pub enum RenderRequestEvent {
    /// The view layer painted the bitmap for this request.
    Rendered,
}

/// Events emitted by a `Bucket`, aggregated across its RenderRequests'
/// Images.
#[derive(Debug, Clone)]
pub enum BucketEvent {
    /// Aggregate load progress changed.
    Progress {
        /// Bytes loaded across the bucket's distinct Images.
        loaded: u64,
        /// Total bytes expected across the bucket's distinct Images.
        total: u64,
    },
    /// Every Image referenced by the bucket has finished loading.
    LoadEnd,
    /// At least one Image referenced by the bucket failed to load.
    Error {
        /// Failure message.
        message: String,
    },
    /// A RenderRequest in the bucket was rendered.
    Rendered,
    /// The bucket was cleared; every RenderRequest it owned was detached.
    Clear,
}

/// Top-level events emitted by the `Controller`.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// RAM usage remains over budget after eviction ran to completion.
    RamOverflow,
    /// Video memory usage remains over budget after eviction ran to
    /// completion.
    VideoOverflow,
    /// A new Image entity was created.
    ImageAdded {
        /// The image that was added.
        image: ImageId,
    },
    /// An Image entity was destroyed (evicted or orphaned).
    ImageRemoved {
        /// The image that was removed.
        image: ImageId,
    },
    /// Catch-all signal that Controller state changed; fired alongside
    /// every other event.
    Update,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn on_then_emit_invokes_handler() {
        let mut bus: EventBus<ControllerEvent> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.on(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(&ControllerEvent::Update);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_stops_future_emits() {
        let mut bus: EventBus<ControllerEvent> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let id = bus.on(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.off(id);
        bus.emit(&ControllerEvent::Update);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
