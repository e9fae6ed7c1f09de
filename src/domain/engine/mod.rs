//! The cache engine: Loader, Network, Image, RenderRequest, Bucket, and the
//! Controller that ties them together under memory budgets.

mod bucket;
mod controller;
mod image;
mod loader;
mod network;
mod render_request;

pub use bucket::Bucket;
pub use controller::{CacheConfig, Controller, RequestParams};
pub use image::Image;
pub use loader::LoaderEvent;
pub use render_request::{RenderRequest, RenderState};
