//! Bounded-concurrency pool of [`super::loader`] fetches.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::engine::loader::{self, LoaderEvent};
use crate::domain::entities::ImageId;
use crate::domain::ports::{FetchRequest, Transport};

struct PendingLoad {
    image_id: ImageId,
    request: FetchRequest,
}

/// Runs Loaders on behalf of Images, capping in-flight fetches at
/// `loaders_max` and pausing new dispatch while the Controller reports
/// memory overflow.
pub struct Network {
    loaders_max: usize,
    timeout: Duration,
    transport: Arc<dyn Transport>,
    queue: VecDeque<PendingLoad>,
    queued_ids: HashSet<ImageId>,
    in_flight: HashMap<ImageId, JoinHandle<()>>,
    event_tx: mpsc::UnboundedSender<(ImageId, LoaderEvent)>,
    event_rx: mpsc::UnboundedReceiver<(ImageId, LoaderEvent)>,
    loaded: u64,
    errored: u64,
}

impl Network {
    /// Creates a Network bounded at `loaders_max` concurrent fetches, each
    /// subject to `timeout`.
    #[must_use]
    pub fn new(loaders_max: usize, timeout: Duration, transport: Arc<dyn Transport>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            loaders_max,
            timeout,
            transport,
            queue: VecDeque::new(),
            queued_ids: HashSet::new(),
            in_flight: HashMap::new(),
            event_tx,
            event_rx,
            loaded: 0,
            errored: 0,
        }
    }

    /// Enqueues a fetch for `image_id` unless it is already queued or
    /// in-flight. Returns true if a new entry was enqueued.
    pub fn add(&mut self, image_id: ImageId, request: FetchRequest) -> bool {
        if self.queued_ids.contains(&image_id) || self.in_flight.contains_key(&image_id) {
            return false;
        }
        self.queued_ids.insert(image_id.clone());
        self.queue.push_back(PendingLoad { image_id, request });
        true
    }

    /// Removes `image_id` from the pool: dequeues it if merely pending, or
    /// aborts its in-flight Loader task and synthesizes an `Abort` event so
    /// the Image's lifecycle still observes a terminal event. A no-op if
    /// the image is neither queued nor in-flight.
    pub fn remove(&mut self, image_id: &ImageId) {
        if self.queued_ids.remove(image_id) {
            self.queue.retain(|pending| &pending.image_id != image_id);
            return;
        }
        if let Some(handle) = self.in_flight.remove(image_id) {
            handle.abort();
            let _ = self.event_tx.send((image_id.clone(), LoaderEvent::Abort));
        }
    }

    /// Spawns Loaders for queued images while capacity allows, unless
    /// `overflow` is true (in which case dispatch pauses entirely).
    pub fn dispatch(&mut self, overflow: bool) {
        if overflow {
            return;
        }
        while self.in_flight.len() < self.loaders_max {
            let Some(pending) = self.queue.pop_front() else {
                break;
            };
            self.queued_ids.remove(&pending.image_id);
            let handle = loader::spawn(
                pending.image_id.clone(),
                pending.request,
                self.transport.clone(),
                self.timeout,
                self.event_tx.clone(),
            );
            self.in_flight.insert(pending.image_id, handle);
        }
    }

    /// Awaits the next Loader event, updating internal counters when a
    /// terminal event arrives. Returns `None` once the sender half is
    /// dropped (the Network itself was dropped), which cannot happen while
    /// `self` is alive since it owns `event_tx`.
    pub async fn next_event(&mut self) -> Option<(ImageId, LoaderEvent)> {
        let (image_id, event) = self.event_rx.recv().await?;
        if is_terminal(&event) {
            self.in_flight.remove(&image_id);
            match event {
                LoaderEvent::Load { .. } => self.loaded += 1,
                LoaderEvent::Error { .. } | LoaderEvent::Timeout => self.errored += 1,
                LoaderEvent::Abort => {}
                LoaderEvent::Start | LoaderEvent::Progress { .. } => unreachable!(),
            }
        }
        Some((image_id, event))
    }

    /// Number of Loaders currently executing.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of Images waiting for a free Loader slot.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Total number of fetches that completed successfully.
    #[must_use]
    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    /// Total number of fetches that failed or timed out.
    #[must_use]
    pub fn errored(&self) -> u64 {
        self.errored
    }

    /// Aborts every in-flight Loader and drops every queued entry,
    /// returning the pool to its freshly-constructed state.
    pub fn shutdown(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
        self.queue.clear();
        self.queued_ids.clear();
    }
}

const fn is_terminal(event: &LoaderEvent) -> bool {
    matches!(
        event,
        LoaderEvent::Load { .. } | LoaderEvent::Error { .. } | LoaderEvent::Timeout | LoaderEvent::Abort
    )
}
