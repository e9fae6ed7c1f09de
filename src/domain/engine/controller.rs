//! Top-level owner of all Images and Buckets; runs eviction to hold RAM
//! and video-memory usage under configured ceilings.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::domain::engine::bucket::Bucket;
use crate::domain::engine::image::Image;
use crate::domain::engine::loader::LoaderEvent;
use crate::domain::engine::network::Network;
use crate::domain::engine::render_request::RenderRequest;
use crate::domain::entities::{BucketName, ImageId, RenderRequestId, Size};
use crate::domain::events::{ControllerEvent, EventBus, HandlerId};
use crate::domain::ports::{FetchRequest, ImageDecoder, Transport};

/// Tunable budgets and limits for a [`Controller`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Soft ceiling for compressed+decoded bytes across all Images.
    pub ram_bytes_budget: u64,
    /// Soft ceiling for decoded bytes across all rendered sizes.
    pub video_bytes_budget: u64,
    /// Maximum concurrent Loaders.
    pub loaders_max: usize,
    /// Per-fetch timeout passed to the Loader.
    pub timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ram_bytes_budget: 256 * 1024 * 1024,
            video_bytes_budget: 256 * 1024 * 1024,
            loaders_max: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Parameters for [`Controller::request`].
#[derive(Debug, Clone)]
pub struct RequestParams {
    /// Source URL of the image.
    pub url: String,
    /// Pixel size to render the image at.
    pub size: Size,
    /// Bucket the resulting RenderRequest should belong to.
    pub bucket: BucketName,
    /// Extra HTTP headers for the fetch, if the Image is not already
    /// loaded or in flight.
    pub headers: Vec<(String, String)>,
}

impl RequestParams {
    /// Creates request parameters with no extra headers.
    #[must_use]
    pub fn new(url: impl Into<String>, size: Size, bucket: BucketName) -> Self {
        Self {
            url: url.into(),
            size,
            bucket,
            headers: Vec::new(),
        }
    }
}

/// Root owner of every Image, RenderRequest, and Bucket. Enforces the RAM
/// and video-memory budgets via eviction and drives the Network's Loader
/// pool.
pub struct Controller {
    config: CacheConfig,
    decoder: Arc<dyn ImageDecoder>,
    images: std::collections::HashMap<ImageId, Image>,
    requests: std::collections::HashMap<RenderRequestId, RenderRequest>,
    buckets: std::collections::HashMap<BucketName, Bucket>,
    network: Network,
    next_request_id: u64,
    ram_bytes_used: u64,
    video_bytes_used: u64,
    pending: VecDeque<ControllerEvent>,
    events: EventBus<ControllerEvent>,
}

impl Controller {
    /// Creates a Controller with the given budgets and port implementations.
    #[must_use]
    pub fn new(config: CacheConfig, transport: Arc<dyn Transport>, decoder: Arc<dyn ImageDecoder>) -> Self {
        let network = Network::new(config.loaders_max, config.timeout, transport);
        Self {
            config,
            decoder,
            images: std::collections::HashMap::new(),
            requests: std::collections::HashMap::new(),
            buckets: std::collections::HashMap::new(),
            network,
            next_request_id: 0,
            ram_bytes_used: 0,
            video_bytes_used: 0,
            pending: VecDeque::new(),
            events: EventBus::new(),
        }
    }

    /// Registers a handler for Controller-level events.
    pub fn on(&mut self, handler: impl Fn(&ControllerEvent) + Send + Sync + 'static) -> HandlerId {
        self.events.on(handler)
    }

    /// Unregisters a previously registered handler.
    pub fn off(&mut self, id: HandlerId) {
        self.events.off(id);
    }

    /// Current RAM usage estimate: `Σ image.get_bytes_ram()`.
    #[must_use]
    pub fn ram_bytes_used(&self) -> u64 {
        self.ram_bytes_used
    }

    /// Current video-memory usage estimate: `Σ request.bytes_video()` over
    /// requests whose Image is decoded.
    #[must_use]
    pub fn video_bytes_used(&self) -> u64 {
        self.video_bytes_used
    }

    /// Number of Images currently owned by the Controller.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Looks up an Image by id.
    #[must_use]
    pub fn image(&self, id: &ImageId) -> Option<&Image> {
        self.images.get(id)
    }

    /// Looks up a RenderRequest by id.
    #[must_use]
    pub fn request_state(&self, id: RenderRequestId) -> Option<&RenderRequest> {
        self.requests.get(&id)
    }

    /// Looks up a Bucket by name.
    #[must_use]
    pub fn bucket(&self, name: &BucketName) -> Option<&Bucket> {
        self.buckets.get(name)
    }

    /// Number of Loaders currently in flight.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.network.in_flight_count()
    }

    /// Number of Images waiting for a free Loader slot.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.network.queue_len()
    }

    /// Total fetches that completed successfully over this Controller's
    /// lifetime.
    #[must_use]
    pub fn loaded_count(&self) -> u64 {
        self.network.loaded()
    }

    /// Total fetches that ended in an error or timeout over this
    /// Controller's lifetime.
    #[must_use]
    pub fn errored_count(&self) -> u64 {
        self.network.errored()
    }

    /// Creates a named Bucket, optionally starting locked.
    pub fn add_bucket(&mut self, name: BucketName, locked: bool) {
        self.buckets.entry(name.clone()).or_insert_with(|| Bucket::new(name, locked));
    }

    /// Destroys a Bucket: detaches every RenderRequest it owns from their
    /// Images and evicts any Image left with no remaining requests.
    pub fn remove_bucket(&mut self, name: &BucketName) {
        let Some(mut bucket) = self.buckets.remove(name) else {
            return;
        };
        let drained = bucket.clear();
        for request_id in drained {
            self.detach_request(request_id);
        }
        self.settle();
    }

    /// Looks up or creates the Image for `params.url`, attaches a new
    /// RenderRequest to it and to `params.bucket`, and enqueues a fetch if
    /// one is not already underway. Panics if `params.bucket` has not been
    /// created with [`Controller::add_bucket`].
    pub fn request(&mut self, params: RequestParams) -> RenderRequestId {
        assert!(
            self.buckets.contains_key(&params.bucket),
            "bucket {:?} must be created before use",
            params.bucket.as_str()
        );

        let image_id = ImageId::from_url(&params.url);
        let is_new_image = !self.images.contains_key(&image_id);
        if is_new_image {
            self.images
                .insert(image_id.clone(), Image::new(image_id.clone(), params.url.clone()));
        }

        let request_id = RenderRequestId::new(self.next_request_id);
        self.next_request_id += 1;

        let mut render_request = RenderRequest::new(
            request_id,
            image_id.clone(),
            params.bucket.clone(),
            params.size,
        );

        let image = self.images.get_mut(&image_id).expect("just inserted or present");
        image.register_request(request_id);
        if image.got_size() {
            render_request.on_image_loaded();
        } else {
            render_request.mark_pending();
        }
        let image_already_settled = image.loaded();

        self.requests.insert(request_id, render_request);
        if let Some(bucket) = self.buckets.get_mut(&params.bucket) {
            bucket.add_request(request_id);
        }

        if !image_already_settled {
            let fetch = FetchRequest {
                url: params.url,
                headers: params.headers,
            };
            self.network.add(image_id.clone(), fetch);
        }

        if is_new_image {
            self.emit(ControllerEvent::ImageAdded { image: image_id });
        }
        self.settle();
        request_id
    }

    /// Detaches a RenderRequest from its Bucket and Image. If the Image is
    /// left with no remaining requests, it is evicted.
    pub fn clear_request(&mut self, request_id: RenderRequestId) {
        self.detach_request(request_id);
        self.settle();
    }

    fn detach_request(&mut self, request_id: RenderRequestId) {
        let Some(mut request) = self.requests.remove(&request_id) else {
            return;
        };
        request.mark_cleared();

        if let Some(bucket) = self.buckets.get_mut(request.bucket()) {
            bucket.remove_request(request_id);
        }

        let image_id = request.image().clone();
        if let Some(image) = self.images.get_mut(&image_id) {
            image.unregister_request(request_id);
            if image.has_no_requests() {
                self.evict_image(&image_id);
            }
        }
    }

    /// Marks a RenderRequest as rendered by the view layer, updating the
    /// owning Image's decoded flag and LRU timestamp, and the owning
    /// Bucket's aggregate `rendered` signal.
    pub fn mark_rendered(&mut self, request_id: RenderRequestId) {
        let now = Instant::now();
        let Some(request) = self.requests.get_mut(&request_id) else {
            return;
        };
        request.mark_rendered(now);
        let image_id = request.image().clone();
        let bucket_name = request.bucket().clone();

        if let Some(image) = self.images.get_mut(&image_id) {
            image.mark_rendered(request_id, now);
        }
        if let Some(bucket) = self.buckets.get(&bucket_name) {
            bucket.report_rendered();
        }
        self.settle();
    }

    /// Locks a Bucket, pinning every RenderRequest it owns against
    /// eviction.
    pub fn lock_bucket(&mut self, name: &BucketName) {
        if let Some(bucket) = self.buckets.get_mut(name) {
            bucket.lock();
        }
    }

    /// Unlocks a Bucket. Restores each request's own pin as the sole
    /// determinant of its lock state.
    pub fn unlock_bucket(&mut self, name: &BucketName) {
        if let Some(bucket) = self.buckets.get_mut(name) {
            bucket.unlock();
        }
        self.settle();
    }

    /// Pins or unpins a single RenderRequest, independent of its Bucket's
    /// lock state.
    pub fn pin_request(&mut self, request_id: RenderRequestId, pinned: bool) {
        if let Some(request) = self.requests.get_mut(&request_id) {
            request.set_pinned(pinned);
        }
    }

    /// Reports whether a RenderRequest is currently on screen. Feeds the
    /// video-eviction tie-break in [`Self::video_candidates`], which prefers
    /// to evict requests that are not visible.
    pub fn set_request_visible(&mut self, request_id: RenderRequestId, visible: bool) {
        if let Some(request) = self.requests.get_mut(&request_id) {
            request.set_visible(visible);
        }
    }

    /// Awaits the next completed network/decode operation, applies it to
    /// owned state, re-runs eviction, and returns the resulting top-level
    /// event. Returns `None` once the Network's event source is
    /// permanently exhausted (never observed in practice, since the
    /// Controller owns the Network for its entire lifetime).
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        let (image_id, loader_event) = self.network.next_event().await?;
        self.apply_loader_event(image_id, loader_event).await;
        self.settle();
        Some(self.pending.pop_front().unwrap_or(ControllerEvent::Update))
    }

    async fn apply_loader_event(&mut self, image_id: ImageId, event: LoaderEvent) {
        match event {
            LoaderEvent::Start => {
                if let Some(image) = self.images.get_mut(&image_id) {
                    image.on_load_start();
                }
            }
            LoaderEvent::Progress { loaded, total } => {
                if let Some(image) = self.images.get_mut(&image_id) {
                    image.on_loader_progress(loaded, total);
                }
                self.report_bucket_progress(&image_id);
            }
            LoaderEvent::Load { bytes } => {
                let Some(image) = self.images.get_mut(&image_id) else {
                    return;
                };
                image.on_loaded(bytes.clone());

                let decoder = self.decoder.clone();
                let decoded = tokio::task::spawn_blocking(move || decoder.decode_dimensions(&bytes)).await;

                match decoded {
                    Ok(Ok((width, height))) => {
                        if let Some(image) = self.images.get_mut(&image_id) {
                            image.on_size(width, height);
                        }
                        let request_ids = self.request_ids_for_image(&image_id);
                        for request_id in request_ids {
                            if let Some(request) = self.requests.get_mut(&request_id) {
                                request.on_image_loaded();
                            }
                        }
                        self.report_bucket_load_end(&image_id);
                    }
                    Ok(Err(err)) => {
                        warn!(image = %image_id, error = %err, "decode failed");
                        if let Some(image) = self.images.get_mut(&image_id) {
                            image.on_blob_error(err.to_string());
                        }
                        self.report_bucket_error(&image_id, err.to_string());
                    }
                    Err(join_err) => {
                        warn!(image = %image_id, error = %join_err, "decode task panicked");
                        if let Some(image) = self.images.get_mut(&image_id) {
                            image.on_blob_error(join_err.to_string());
                        }
                        self.report_bucket_error(&image_id, join_err.to_string());
                    }
                }
            }
            LoaderEvent::Error { message } => {
                debug!(image = %image_id, %message, "load error");
                if let Some(image) = self.images.get_mut(&image_id) {
                    image.on_load_error(message.clone());
                }
                self.report_bucket_error(&image_id, message);
            }
            LoaderEvent::Timeout => {
                debug!(image = %image_id, "load timed out");
                if let Some(image) = self.images.get_mut(&image_id) {
                    image.on_load_error("request timed out");
                }
                self.report_bucket_error(&image_id, "request timed out".to_string());
            }
            LoaderEvent::Abort => {
                // The image was already removed synchronously by whatever
                // triggered the abort (clear_request/remove_bucket/evict);
                // nothing left to apply.
            }
        }
    }

    fn request_ids_for_image(&self, image_id: &ImageId) -> Vec<RenderRequestId> {
        self.images
            .get(image_id)
            .map(|image| image.requests().copied().collect())
            .unwrap_or_default()
    }

    fn buckets_for_image(&self, image_id: &ImageId) -> HashSet<BucketName> {
        let mut names = HashSet::new();
        if let Some(image) = self.images.get(image_id) {
            for request_id in image.requests() {
                if let Some(request) = self.requests.get(request_id) {
                    names.insert(request.bucket().clone());
                }
            }
        }
        names
    }

    fn report_bucket_progress(&self, image_id: &ImageId) {
        for bucket_name in self.buckets_for_image(image_id) {
            let (loaded, total) = self.bucket_progress_totals(&bucket_name);
            if let Some(bucket) = self.buckets.get(&bucket_name) {
                bucket.report_progress(loaded, total);
            }
        }
    }

    fn report_bucket_load_end(&self, image_id: &ImageId) {
        for bucket_name in self.buckets_for_image(image_id) {
            let all_loaded = self
                .bucket(&bucket_name)
                .into_iter()
                .flat_map(Bucket::requests)
                .filter_map(|request_id| self.requests.get(request_id))
                .all(|request| self.images.get(request.image()).is_some_and(Image::loaded));
            if all_loaded {
                if let Some(bucket) = self.buckets.get(&bucket_name) {
                    bucket.report_load_end();
                }
            }
        }
    }

    fn report_bucket_error(&self, image_id: &ImageId, message: String) {
        for bucket_name in self.buckets_for_image(image_id) {
            if let Some(bucket) = self.buckets.get(&bucket_name) {
                bucket.report_error(message.clone());
            }
        }
    }

    /// Aggregate load progress across a Bucket's distinct Images, counted
    /// once per Image even when multiple requests share one.
    fn bucket_progress_totals(&self, bucket_name: &BucketName) -> (u64, u64) {
        let mut loaded = 0u64;
        let mut total = 0u64;
        let mut seen = HashSet::new();
        if let Some(bucket) = self.buckets.get(bucket_name) {
            for request_id in bucket.requests() {
                let Some(request) = self.requests.get(request_id) else {
                    continue;
                };
                if !seen.insert(request.image().clone()) {
                    continue;
                }
                if let Some(image) = self.images.get(request.image()) {
                    let (image_loaded, image_total) = image.progress();
                    loaded += image_loaded;
                    total += image_total.unwrap_or(image_loaded);
                }
            }
        }
        (loaded, total)
    }

    /// Recomputes usage totals, runs eviction, queues any resulting
    /// events, and re-evaluates Network dispatch. Called after every
    /// operation that changes sets or sizes, per the memory-bookkeeping
    /// contract.
    fn settle(&mut self) {
        self.recompute_usage();
        self.run_eviction();
        self.recompute_usage();
        self.network.dispatch(self.is_overflow());
        self.pending.push_back(ControllerEvent::Update);
    }

    fn recompute_usage(&mut self) {
        self.ram_bytes_used = self.images.values().map(Image::get_bytes_ram).sum();
        self.video_bytes_used = self
            .requests
            .values()
            .filter(|request| {
                self.images
                    .get(request.image())
                    .is_some_and(Image::decoded)
            })
            .map(RenderRequest::bytes_video)
            .sum();
    }

    fn is_overflow(&self) -> bool {
        self.ram_bytes_used >= self.config.ram_bytes_budget
            || self.video_bytes_used >= self.config.video_bytes_budget
    }

    fn image_is_locked(&self, image_id: &ImageId) -> bool {
        let Some(image) = self.images.get(image_id) else {
            return false;
        };
        image.requests().any(|request_id| {
            self.requests.get(request_id).is_some_and(|request| {
                let bucket_locked = self
                    .buckets
                    .get(request.bucket())
                    .is_some_and(Bucket::is_locked);
                request.is_locked(bucket_locked)
            })
        })
    }

    /// Runs the two-phase eviction algorithm: RAM first (whole Images),
    /// then video memory (per-request, falling back to whole Images once a
    /// last request is removed). Queues `RamOverflow`/`VideoOverflow` if
    /// budgets remain exceeded once no unlocked candidates remain.
    fn run_eviction(&mut self) {
        self.evict_ram();
        self.evict_video();
    }

    fn ram_candidates(&self) -> Vec<ImageId> {
        let mut candidates: Vec<ImageId> = self
            .images
            .keys()
            .filter(|id| !self.image_is_locked(id))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            let image_a = &self.images[a];
            let image_b = &self.images[b];
            image_a
                .last_rendered()
                .cmp(&image_b.last_rendered())
                .then_with(|| image_a.render_request_count().cmp(&image_b.render_request_count()))
                .then_with(|| image_b.get_bytes_ram().cmp(&image_a.get_bytes_ram()))
        });
        candidates
    }

    fn evict_ram(&mut self) {
        loop {
            self.recompute_usage();
            if self.ram_bytes_used <= self.config.ram_bytes_budget {
                return;
            }
            let candidates = self.ram_candidates();
            let Some(image_id) = candidates.into_iter().next() else {
                self.emit(ControllerEvent::RamOverflow);
                return;
            };
            self.evict_image(&image_id);
        }
    }

    fn video_candidates(&self) -> Vec<RenderRequestId> {
        let mut candidates: Vec<RenderRequestId> = self
            .requests
            .iter()
            .filter(|(_, request)| {
                let bucket_locked = self
                    .buckets
                    .get(request.bucket())
                    .is_some_and(Bucket::is_locked);
                let contributes = self
                    .images
                    .get(request.image())
                    .is_some_and(Image::decoded);
                !request.is_locked(bucket_locked) && contributes
            })
            .map(|(id, _)| *id)
            .collect();
        candidates.sort_by(|a, b| {
            let request_a = &self.requests[a];
            let request_b = &self.requests[b];
            request_a
                .last_rendered()
                .cmp(&request_b.last_rendered())
                .then_with(|| request_a.is_visible().cmp(&request_b.is_visible()))
                .then_with(|| request_b.bytes_video().cmp(&request_a.bytes_video()))
        });
        candidates
    }

    fn evict_video(&mut self) {
        loop {
            self.recompute_usage();
            if self.video_bytes_used <= self.config.video_bytes_budget {
                return;
            }
            let candidates = self.video_candidates();
            let Some(request_id) = candidates.into_iter().next() else {
                self.emit(ControllerEvent::VideoOverflow);
                return;
            };
            self.evict_video_request(request_id);
        }
    }

    fn evict_video_request(&mut self, request_id: RenderRequestId) {
        let Some(request) = self.requests.get(&request_id) else {
            return;
        };
        let image_id = request.image().clone();
        let sibling_count = self
            .images
            .get(&image_id)
            .map_or(0, Image::render_request_count);

        if sibling_count <= 1 {
            self.evict_image(&image_id);
        } else {
            self.detach_request(request_id);
        }
    }

    fn evict_image(&mut self, image_id: &ImageId) {
        let Some(mut image) = self.images.remove(image_id) else {
            return;
        };
        self.network.remove(image_id);
        for request_id in image.requests().copied().collect::<Vec<_>>() {
            if let Some(mut request) = self.requests.remove(&request_id) {
                request.mark_cleared();
                if let Some(bucket) = self.buckets.get_mut(request.bucket()) {
                    bucket.remove_request(request_id);
                }
            }
        }
        image.clear();
        self.emit(ControllerEvent::ImageRemoved {
            image: image_id.clone(),
        });
    }

    fn emit(&mut self, event: ControllerEvent) {
        self.events.emit(&event);
        self.pending.push_back(event);
    }

    /// Clears every Bucket, then every Image, then stops the Network.
    /// After this call the Image registry is empty, the Network queue is
    /// empty, and no Loaders remain in flight.
    pub fn shutdown(&mut self) {
        let bucket_names: Vec<BucketName> = self.buckets.keys().cloned().collect();
        for name in bucket_names {
            self.remove_bucket(&name);
        }
        let image_ids: Vec<ImageId> = self.images.keys().cloned().collect();
        for image_id in image_ids {
            self.evict_image(&image_id);
        }
        self.network.shutdown();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::errors::CacheError;
    use crate::domain::events::BucketEvent;
    use crate::domain::ports::mocks::{fake_image_bytes, FakeDecoder, FakePlan, FakeTransport};

    fn test_controller(config: CacheConfig) -> (Controller, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::new());
        let decoder = Arc::new(FakeDecoder);
        let controller = Controller::new(config, transport.clone(), decoder);
        (controller, transport)
    }

    /// Drives `next_event` until `pred` holds, bailing out rather than
    /// hanging forever if the engine never reaches the expected state.
    async fn drain_until(controller: &mut Controller, pred: impl Fn(&Controller) -> bool) {
        for _ in 0..100 {
            if pred(controller) {
                return;
            }
            controller.next_event().await;
        }
        panic!("next_event loop did not converge");
    }

    async fn load_and_render(
        controller: &mut Controller,
        transport: &FakeTransport,
        url: &str,
        bucket: &BucketName,
        width: u32,
        height: u32,
    ) -> RenderRequestId {
        transport.set(url, FakePlan::Success(fake_image_bytes(width, height)));
        let image_id = ImageId::from_url(url);
        let request_id = controller.request(RequestParams::new(url, Size::new(width, height), bucket.clone()));
        drain_until(controller, |c| {
            c.image(&image_id).is_some_and(Image::got_size)
        })
        .await;
        controller.mark_rendered(request_id);
        request_id
    }

    #[tokio::test]
    async fn dedup_request_for_same_url_reuses_one_image() {
        let (mut controller, transport) = test_controller(CacheConfig::default());
        let bucket = BucketName::new("b");
        controller.add_bucket(bucket.clone(), false);
        transport.set("https://example.com/a.png", FakePlan::Success(fake_image_bytes(10, 10)));

        let r1 = controller.request(RequestParams::new("https://example.com/a.png", Size::new(100, 100), bucket.clone()));
        let r2 = controller.request(RequestParams::new("https://example.com/a.png", Size::new(100, 100), bucket.clone()));

        assert_ne!(r1, r2);
        assert_eq!(controller.image_count(), 1);
        assert_eq!(controller.in_flight_count() + controller.queue_len(), 1);

        assert!(matches!(
            controller.next_event().await,
            Some(ControllerEvent::ImageAdded { .. })
        ));
        assert!(matches!(controller.next_event().await, Some(ControllerEvent::Update)));
        assert!(matches!(controller.next_event().await, Some(ControllerEvent::Update)));
    }

    #[tokio::test]
    async fn concurrency_cap_limits_in_flight_loaders() {
        let config = CacheConfig {
            loaders_max: 2,
            ..CacheConfig::default()
        };
        let (mut controller, transport) = test_controller(config);
        let bucket = BucketName::new("b");
        controller.add_bucket(bucket.clone(), false);

        for i in 0..5 {
            let url = format!("https://example.com/{i}.png");
            transport.set(url.clone(), FakePlan::Hang);
            controller.request(RequestParams::new(url, Size::new(10, 10), bucket.clone()));
        }

        assert_eq!(controller.in_flight_count(), 2);
        assert_eq!(controller.queue_len(), 3);
    }

    #[tokio::test]
    async fn eviction_evicts_least_recently_rendered_first() {
        let config = CacheConfig {
            ram_bytes_budget: 1_000_000,
            ..CacheConfig::default()
        };
        let (mut controller, transport) = test_controller(config);
        let bucket = BucketName::new("b");
        controller.add_bucket(bucket.clone(), false);

        // 400x250x4 = 400,000 bytes decoded each; two fit under budget, a
        // third does not.
        let _a = load_and_render(&mut controller, &transport, "https://example.com/a.png", &bucket, 400, 250).await;
        let image_a = ImageId::from_url("https://example.com/a.png");
        let _b = load_and_render(&mut controller, &transport, "https://example.com/b.png", &bucket, 400, 250).await;
        assert!(controller.image(&image_a).is_some(), "A and B alone must fit the budget");

        let _c = load_and_render(&mut controller, &transport, "https://example.com/c.png", &bucket, 400, 250).await;

        assert!(controller.image(&image_a).is_none(), "A was rendered first and should be evicted first");
        assert!(controller.ram_bytes_used() <= 1_000_000);
    }

    #[tokio::test]
    async fn locked_bucket_pins_its_images_against_eviction() {
        let config = CacheConfig {
            ram_bytes_budget: 500_000,
            ..CacheConfig::default()
        };
        let (mut controller, transport) = test_controller(config);
        let locked = BucketName::new("locked");
        controller.add_bucket(locked.clone(), true);

        let image_a = ImageId::from_url("https://example.com/a.png");
        let _a = load_and_render(&mut controller, &transport, "https://example.com/a.png", &locked, 400, 250).await;
        let _d = load_and_render(&mut controller, &transport, "https://example.com/d.png", &locked, 400, 250).await;

        // Both requests live in the locked bucket, so neither is an
        // eviction candidate: usage stays over budget and RamOverflow
        // fires instead of anything being removed.
        assert!(controller.image(&image_a).is_some());
        assert!(controller.ram_bytes_used() > 500_000);

        let mut saw_overflow = false;
        for _ in 0..4 {
            let event = tokio::time::timeout(std::time::Duration::from_secs(1), controller.next_event()).await;
            let Ok(event) = event else {
                break;
            };
            if let Some(ControllerEvent::RamOverflow) = event {
                saw_overflow = true;
                break;
            }
        }
        assert!(saw_overflow);
    }

    #[tokio::test]
    async fn video_bytes_used_sums_across_distinct_sizes_of_one_image() {
        let (mut controller, transport) = test_controller(CacheConfig::default());
        let bucket = BucketName::new("b");
        controller.add_bucket(bucket.clone(), false);
        let url = "https://example.com/a.png";
        transport.set(url, FakePlan::Success(fake_image_bytes(50, 50)));
        let image_id = ImageId::from_url(url);

        let small = controller.request(RequestParams::new(url, Size::new(100, 100), bucket.clone()));
        let large = controller.request(RequestParams::new(url, Size::new(200, 200), bucket.clone()));
        drain_until(&mut controller, |c| c.image(&image_id).is_some_and(Image::got_size)).await;

        controller.mark_rendered(small);
        controller.mark_rendered(large);
        controller.next_event().await;

        assert_eq!(controller.video_bytes_used(), 40_000 + 160_000);
    }

    #[tokio::test]
    async fn removing_a_bucket_cancels_its_in_flight_loader() {
        let (mut controller, transport) = test_controller(CacheConfig::default());
        let bucket = BucketName::new("b");
        controller.add_bucket(bucket.clone(), false);
        let url = "https://example.com/a.png";
        transport.set(url, FakePlan::Hang);
        controller.request(RequestParams::new(url, Size::new(100, 100), bucket.clone()));

        assert_eq!(controller.in_flight_count(), 1);

        controller.remove_bucket(&bucket);

        assert_eq!(controller.image_count(), 0);
        assert_eq!(controller.in_flight_count(), 0);
        assert_eq!(controller.loaded_count(), 0);
        assert_eq!(controller.errored_count(), 0);

        // remove_bucket's own settle() queues an Update; the synthesized
        // Abort from Network::remove then settles into a second Update.
        // Neither should ever surface as a load or an error.
        for _ in 0..2 {
            let event = tokio::time::timeout(std::time::Duration::from_secs(1), controller.next_event())
                .await
                .expect("cancellation must not hang the event loop");
            assert!(matches!(event, Some(ControllerEvent::Update)));
        }

        assert_eq!(controller.loaded_count(), 0);
        assert_eq!(controller.errored_count(), 0);
    }

    #[tokio::test]
    async fn network_failure_propagates_to_bucket_error_event() {
        let (mut controller, transport) = test_controller(CacheConfig::default());
        let bucket_name = BucketName::new("b");
        controller.add_bucket(bucket_name.clone(), false);
        let url = "https://example.com/broken.png";
        transport.set(url, FakePlan::Fail(CacheError::NetworkError("connection reset".into())));

        let errors: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        if let Some(bucket) = controller.buckets.get_mut(&bucket_name) {
            bucket.events.on(move |event| {
                if let BucketEvent::Error { message } = event {
                    errors_clone.lock().unwrap().push(message.clone());
                }
            });
        }

        controller.request(RequestParams::new(url, Size::new(100, 100), bucket_name.clone()));

        drain_until(&mut controller, |c| c.errored_count() == 1).await;

        assert_eq!(controller.errored_count(), 1);
        assert_eq!(controller.loaded_count(), 0);
        assert_eq!(errors.lock().unwrap().as_slice(), ["connection reset".to_string()]);
    }

    #[tokio::test]
    async fn timeout_propagates_as_load_error_not_success() {
        let config = CacheConfig {
            timeout: std::time::Duration::from_millis(10),
            ..CacheConfig::default()
        };
        let (mut controller, transport) = test_controller(config);
        let bucket_name = BucketName::new("b");
        controller.add_bucket(bucket_name.clone(), false);
        let url = "https://example.com/hangs.png";
        transport.set(url, FakePlan::Hang);

        controller.request(RequestParams::new(url, Size::new(100, 100), bucket_name.clone()));

        drain_until(&mut controller, |c| c.errored_count() == 1).await;

        assert_eq!(controller.errored_count(), 1);
        assert_eq!(controller.loaded_count(), 0);
    }
}
