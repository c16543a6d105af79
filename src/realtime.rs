//! Real-time preview relay
//!
//! Each incoming frame is processed independently in realtime-preview mode
//! and returned as encoded image bytes. Sessions stream many frames through
//! one relay and receive responses in request order.

use crate::{
    config::{PipelineConfig, RelayConfig},
    error::{BgRemovalError, Result},
    pipeline::FrameProcessingPipeline,
    services::OutputFormatHandler,
    types::Frame,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

/// One raw frame from a streaming client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMessage {
    /// Packed RGB bytes, row-major, `width * height * 3` long
    pub frame: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Reply to a [`FrameMessage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayResponse {
    /// Encoded preview image
    Frame { processed_frame: Vec<u8> },
    /// The frame could not be processed
    Error { error: String },
}

impl RelayResponse {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Encoded bytes of a successful response
    #[must_use]
    pub fn processed_frame(&self) -> Option<&[u8]> {
        match self {
            Self::Frame { processed_frame } => Some(processed_frame),
            Self::Error { .. } => None,
        }
    }
}

impl From<Result<Vec<u8>>> for RelayResponse {
    fn from(result: Result<Vec<u8>>) -> Self {
        match result {
            Ok(processed_frame) => Self::Frame { processed_frame },
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }
}

/// Stateless per-frame preview processor
#[derive(Debug)]
pub struct RealtimeFrameRelay {
    pipeline: FrameProcessingPipeline,
    config: RelayConfig,
    frames_handled: AtomicU64,
    over_budget: AtomicU64,
}

impl RealtimeFrameRelay {
    /// # Errors
    /// - `InvalidConfig` when the relay configuration fails validation
    pub fn new(pipeline: FrameProcessingPipeline, config: RelayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pipeline,
            config,
            frames_handled: AtomicU64::new(0),
            over_budget: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Process one raw RGB frame into an encoded preview image
    ///
    /// Exceeding the frame budget is logged and counted but never aborts
    /// the frame.
    ///
    /// # Errors
    /// - `InvalidFrame` when the buffer does not hold `width * height` RGB pixels
    /// - `Inference` when the model fails
    /// - `Image` / `InvalidConfig` when the output cannot be encoded
    pub fn handle(&self, frame_bytes: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>> {
        let start = instant::Instant::now();
        self.frames_handled.fetch_add(1, Ordering::Relaxed);

        let frame = Frame::from_raw_rgb(width, height, frame_bytes)?;
        let output = self
            .pipeline
            .process(&frame, &PipelineConfig::realtime_preview())?;
        let encoded =
            OutputFormatHandler::encode(&output, self.config.output_format, self.config.jpeg_quality)?;

        let elapsed = start.elapsed();
        if elapsed > self.config.frame_budget {
            self.over_budget.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.config.frame_budget.as_millis() as u64,
                "preview frame exceeded latency budget"
            );
        } else {
            debug!(elapsed_ms = elapsed.as_millis() as u64, bytes = encoded.len(), "preview frame");
        }

        Ok(encoded)
    }

    /// Process a client message, converting failures into an error reply
    pub fn handle_message(&self, message: FrameMessage) -> RelayResponse {
        let FrameMessage {
            frame,
            width,
            height,
        } = message;
        let result = self.handle(frame, width, height);
        if let Err(e) = &result {
            debug!(error = %e, "preview frame rejected");
        }
        RelayResponse::from(result)
    }

    /// Frames passed to [`RealtimeFrameRelay::handle`] so far
    #[must_use]
    pub fn frames_handled(&self) -> u64 {
        self.frames_handled.load(Ordering::Relaxed)
    }

    /// Frames that took longer than the configured budget
    #[must_use]
    pub fn over_budget_count(&self) -> u64 {
        self.over_budget.load(Ordering::Relaxed)
    }
}

/// Ordered stream of preview frames for one client
#[derive(Debug, Clone)]
pub struct RelaySession {
    id: Uuid,
    relay: Arc<RealtimeFrameRelay>,
}

impl RelaySession {
    #[must_use]
    pub fn new(relay: Arc<RealtimeFrameRelay>) -> Self {
        Self {
            id: Uuid::new_v4(),
            relay,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Open a session, returning its request sender and response stream
    ///
    /// Must be called from within a Tokio runtime. The session ends when the
    /// sender is dropped or the response stream is dropped.
    #[must_use]
    pub fn open(
        relay: Arc<RealtimeFrameRelay>,
    ) -> (mpsc::Sender<FrameMessage>, ReceiverStream<RelayResponse>) {
        let capacity = relay.config().channel_capacity;
        let (tx, rx) = mpsc::channel(capacity);
        let responses = Self::new(relay).spawn(ReceiverStream::new(rx));
        (tx, responses)
    }

    /// Consume `requests` on a background task, replying in request order
    ///
    /// Each frame runs on a blocking task; a failed frame yields an error
    /// reply and the session continues with the next message.
    #[must_use]
    pub fn spawn<S>(self, requests: S) -> ReceiverStream<RelayResponse>
    where
        S: Stream<Item = FrameMessage> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.relay.config().channel_capacity);
        let span = info_span!("relay_session", session = %self.id);

        tokio::spawn(
            async move {
                let mut requests = Box::pin(requests);
                let mut handled = 0u64;
                while let Some(message) = requests.next().await {
                    let relay = Arc::clone(&self.relay);
                    let response = tokio::task::spawn_blocking(move || relay.handle_message(message))
                        .await
                        .unwrap_or_else(|e| {
                            RelayResponse::from(Err(BgRemovalError::internal(format!(
                                "Relay task failed: {}",
                                e
                            ))))
                        });

                    if tx.send(response).await.is_err() {
                        debug!("client dropped response stream");
                        break;
                    }
                    handled += 1;
                }
                debug!(frames = handled, "relay session closed");
            }
            .instrument(span),
        );

        ReceiverStream::new(rx)
    }
}
