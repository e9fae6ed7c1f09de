//! One-shot byte fetch for a single Image, wired up by [`super::network::Network`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::entities::ImageId;
use crate::domain::ports::{FetchRequest, ProgressSink, Transport};

/// Events a Loader emits over its lifetime. Always `Start`, then zero or
/// more `Progress`, then exactly one terminal variant (`Load`, `Error`,
/// `Timeout`, or `Abort`). No events follow a terminal one.
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    /// The fetch has begun.
    Start,
    /// A chunk of bytes arrived.
    Progress {
        /// Bytes fetched so far.
        loaded: u64,
        /// Total expected bytes, if known.
        total: Option<u64>,
    },
    /// The fetch completed successfully.
    Load {
        /// The fetched bytes.
        bytes: Bytes,
    },
    /// The fetch failed (network error or non-2xx response).
    Error {
        /// Failure message.
        message: String,
    },
    /// The configured timeout elapsed before the fetch completed.
    Timeout,
    /// The fetch was cancelled before a terminal event fired.
    Abort,
}

/// Spawns a background task that fetches `request.url` via `transport` and
/// reports [`LoaderEvent`]s for `image_id` over `event_tx`. Returns the
/// task handle so the caller can abort it; aborting does not itself emit
/// `LoaderEvent::Abort` — the caller (Network) is responsible for
/// synthesizing that event, since a task abort does not guarantee any more
/// of the task's code runs.
pub fn spawn(
    image_id: ImageId,
    request: FetchRequest,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    event_tx: mpsc::UnboundedSender<(ImageId, LoaderEvent)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _ = event_tx.send((image_id.clone(), LoaderEvent::Start));

        let progress_tx = event_tx.clone();
        let progress_id = image_id.clone();
        let progress = ProgressSink::new(move |loaded, total| {
            let _ = progress_tx.send((progress_id.clone(), LoaderEvent::Progress { loaded, total }));
        });

        let fetch = transport.fetch(&request, &progress);
        let outcome = tokio::time::timeout(timeout, fetch).await;

        let event = match outcome {
            Ok(Ok(bytes)) => LoaderEvent::Load { bytes },
            Ok(Err(err)) => LoaderEvent::Error {
                message: err.to_string(),
            },
            Err(_elapsed) => LoaderEvent::Timeout,
        };
        let _ = event_tx.send((image_id, event));
    })
}
