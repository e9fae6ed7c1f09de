use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixelcache::infrastructure::{CacheConfigArgs, ImageCrateDecoder, ReqwestTransport};
use pixelcache::{BucketName, Controller, ControllerEvent, RequestParams, Size};

fn init_logging(config: &CacheConfigArgs) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CacheConfigArgs::parse();
    init_logging(&args)?;

    info!(version = pixelcache::VERSION, "Starting cache-probe");

    let urls = args.urls.clone();
    let config = args.into_config();

    let transport = Arc::new(ReqwestTransport::new());
    let decoder = Arc::new(ImageCrateDecoder::new());
    let mut controller = Controller::new(config, transport, decoder);

    let bucket = BucketName::new("cache-probe");
    controller.add_bucket(bucket.clone(), false);

    for url in &urls {
        let request_id = controller.request(RequestParams::new(url.clone(), Size::new(256, 256), bucket.clone()));
        info!(%url, ?request_id, "requested");
    }

    while controller.in_flight_count() > 0 || controller.queue_len() > 0 {
        match controller.next_event().await {
            Some(ControllerEvent::ImageAdded { image }) => info!(%image, "image added"),
            Some(ControllerEvent::ImageRemoved { image }) => info!(%image, "image removed"),
            Some(ControllerEvent::RamOverflow) => tracing::warn!("ram overflow"),
            Some(ControllerEvent::VideoOverflow) => tracing::warn!("video overflow"),
            Some(ControllerEvent::Update) => {}
            None => break,
        }
    }

    info!(
        ram_bytes_used = controller.ram_bytes_used(),
        video_bytes_used = controller.video_bytes_used(),
        images = controller.image_count(),
        "settled"
    );

    controller.shutdown();
    Ok(())
}
