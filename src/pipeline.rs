// src/pipeline.rs - Capture thread, frame handoff and the processing loop
use crate::board::Board;
use crate::capture::{Frame, FrameSource};
use crate::config::SessionConfig;
use crate::matching::{GreedyMatcher, MatchStrategy};
use crate::perception::Perception;
use crate::session::TrackingSession;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// How captured frames reach the processing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHandoff {
    /// A single slot holding the newest frame. Frames captured while the
    /// loop is busy are overwritten and never processed.
    Latest,
    /// A bounded queue. Capture waits for the loop, so every frame is
    /// processed in order.
    Queued { capacity: usize },
}

impl FrameHandoff {
    pub const DEFAULT_QUEUE: usize = 8;

    /// Live sources keep only the newest frame; recordings are replayed in
    /// full.
    pub fn for_source(source: &dyn FrameSource) -> Self {
        if source.is_live() {
            FrameHandoff::Latest
        } else {
            FrameHandoff::Queued {
                capacity: Self::DEFAULT_QUEUE,
            }
        }
    }
}

/// Receiving end of the frame handoff.
pub enum FrameFeed {
    Latest(watch::Receiver<Option<Arc<Frame>>>),
    Queued(mpsc::Receiver<Arc<Frame>>),
}

impl FrameFeed {
    /// The next frame to process, or `None` once capture has ended and
    /// nothing is left to hand over.
    pub async fn next(&mut self) -> Option<Arc<Frame>> {
        match self {
            FrameFeed::Latest(rx) => match rx.changed().await {
                Ok(()) => rx.borrow_and_update().clone(),
                Err(_) => None,
            },
            FrameFeed::Queued(rx) => rx.recv().await,
        }
    }
}

enum FramePublisher {
    Latest(watch::Sender<Option<Arc<Frame>>>),
    Queued(mpsc::Sender<Arc<Frame>>),
}

impl FramePublisher {
    fn is_closed(&self) -> bool {
        match self {
            FramePublisher::Latest(tx) => tx.is_closed(),
            FramePublisher::Queued(tx) => tx.is_closed(),
        }
    }

    /// Hand `frame` over. Returns `false` once the loop has gone away.
    fn publish(&self, frame: Frame) -> bool {
        match self {
            FramePublisher::Latest(tx) => {
                tx.send_replace(Some(Arc::new(frame)));
                !tx.is_closed()
            }
            FramePublisher::Queued(tx) => tx.blocking_send(Arc::new(frame)).is_ok(),
        }
    }
}

/// What the capture thread did before it stopped.
#[derive(Debug, Default)]
pub struct CaptureSummary {
    pub captured: u64,
    /// The source error that ended capture early, if any.
    pub error: Option<anyhow::Error>,
}

/// Run `source` on a blocking thread and hand its frames over as `handoff`
/// says. Capture stops at end of stream, on the first capture error, or
/// once the feed is dropped.
pub fn spawn_capture(
    mut source: Box<dyn FrameSource>,
    handoff: FrameHandoff,
) -> (FrameFeed, JoinHandle<CaptureSummary>) {
    let (publisher, feed) = match handoff {
        FrameHandoff::Latest => {
            let (tx, rx) = watch::channel(None);
            (FramePublisher::Latest(tx), FrameFeed::Latest(rx))
        }
        FrameHandoff::Queued { capacity } => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (FramePublisher::Queued(tx), FrameFeed::Queued(rx))
        }
    };

    let handle = tokio::task::spawn_blocking(move || {
        let mut summary = CaptureSummary::default();
        while !publisher.is_closed() {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    summary.captured += 1;
                    if !publisher.publish(frame) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    summary.error = Some(e);
                    break;
                }
            }
        }
        tracing::debug!(captured = summary.captured, "capture finished");
        summary
    });

    (feed, handle)
}

pub struct SessionOutcome {
    pub session: TrackingSession,
    pub frames_captured: u64,
    pub frames_processed: u64,
    /// Frames the perception stage failed on.
    pub frames_failed: u64,
}

/// Everything a run needs: where frames come from, how hands are found in
/// them and how the session is tuned.
pub struct SessionContext {
    source: Box<dyn FrameSource>,
    perception: Box<dyn Perception>,
    config: SessionConfig,
    matcher: Box<dyn MatchStrategy>,
    handoff: FrameHandoff,
}

impl SessionContext {
    pub fn open(source: Box<dyn FrameSource>, perception: Box<dyn Perception>, config: SessionConfig) -> Self {
        let handoff = FrameHandoff::for_source(source.as_ref());
        Self {
            source,
            perception,
            config,
            matcher: Box::new(GreedyMatcher),
            handoff,
        }
    }

    pub fn with_matcher(mut self, matcher: Box<dyn MatchStrategy>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_handoff(mut self, handoff: FrameHandoff) -> Self {
        self.handoff = handoff;
        self
    }

    pub fn handoff(&self) -> FrameHandoff {
        self.handoff
    }

    /// Process frames until the source runs dry.
    pub async fn run(self) -> Result<SessionOutcome> {
        self.run_until(std::future::pending()).await
    }

    /// Process frames until the source runs dry or `shutdown` resolves.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<SessionOutcome> {
        let SessionContext {
            source,
            mut perception,
            config,
            matcher,
            handoff,
        } = self;

        let (width, height) = source.dimensions();
        tracing::debug!(?handoff, "starting capture");
        let (mut feed, capture) = spawn_capture(source, handoff);
        tokio::pin!(shutdown);

        let mut latest = next_frame(&mut feed, &mut shutdown).await;

        // The first frame doubles as the calibration image
        let board = match latest.as_deref() {
            Some(frame) => {
                let contours = perception.calibration_contours(frame).unwrap_or_else(|e| {
                    tracing::warn!("calibration failed, using default cell size: {e:#}");
                    Vec::new()
                });
                Board::calibrate(frame.width, frame.height, &contours, config.board.clone())
            }
            None => {
                tracing::warn!("no frames captured");
                Board::new(width, height, config.board.default_side_length, config.board.clone())
            }
        };

        let reconcile_when_idle = config.reconcile_when_idle;
        let mut session = TrackingSession::with_matcher(board, config, matcher);
        let mut last_index: Option<u64> = None;
        let mut frames_failed = 0u64;

        while let Some(frame) = latest.take() {
            if last_index.map_or(true, |last| frame.index > last) {
                last_index = Some(frame.index);

                match perception.observe(&frame) {
                    Ok(observations) => {
                        let report = session.process_frame_at(frame.index, observations);
                        if report.idle_triggered && reconcile_when_idle {
                            match perception.surface_blocks(&frame) {
                                Ok(blocks) => {
                                    session.reconcile_surface(&blocks);
                                }
                                Err(e) => tracing::warn!(frame = frame.index, "surface scan failed: {e:#}"),
                            }
                        }
                    }
                    Err(e) => {
                        frames_failed += 1;
                        tracing::warn!(frame = frame.index, "perception failed, skipping frame: {e:#}");
                    }
                }
            }

            latest = next_frame(&mut feed, &mut shutdown).await;
        }

        // Closing the feed tells the capture thread to stop
        drop(feed);
        let frames_captured = match capture.await {
            Ok(summary) => {
                if let Some(e) = summary.error {
                    tracing::error!(captured = summary.captured, "capture stopped with an error: {e:#}");
                }
                summary.captured
            }
            Err(e) => {
                tracing::error!("capture task failed: {e}");
                0
            }
        };

        let frames_processed = session.frames_processed();
        tracing::info!(
            frames_captured,
            frames_processed,
            frames_failed,
            events = session.log().len(),
            "session finished"
        );

        Ok(SessionOutcome {
            session,
            frames_captured,
            frames_processed,
            frames_failed,
        })
    }
}

/// Wait for the next frame. `None` once capture is over or shutdown was
/// requested.
async fn next_frame<F>(feed: &mut FrameFeed, shutdown: &mut std::pin::Pin<&mut F>) -> Option<Arc<Frame>>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        frame = feed.next() => frame,
        _ = shutdown.as_mut() => {
            tracing::info!("shutdown requested");
            None
        }
    }
}
