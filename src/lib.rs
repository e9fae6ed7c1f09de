//! Budgeted client-side image render cache.
//!
//! This crate coordinates fetching, decoding, and tracking the memory cost
//! of many images under strict RAM and video-memory budgets. Consumers
//! register render requests through a [`Controller`] and drive it with
//! [`Controller::next_event`], observing lifecycle transitions through
//! per-entity event buses.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer: entities, errors, events, and the cache engine itself.
pub mod domain;
/// Infrastructure layer: default adapters for the domain's ports.
pub mod infrastructure;

pub use domain::engine::{Bucket, CacheConfig, Controller, Image, RenderRequest, RenderState, RequestParams};
pub use domain::entities::{BucketName, ImageId, RenderRequestId, Size};
pub use domain::errors::CacheError;
pub use domain::events::{BucketEvent, ControllerEvent, HandlerId, ImageEvent, RenderRequestEvent};
pub use domain::ports::{FetchRequest, ImageDecoder, ProgressSink, Transport};

/// Current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
