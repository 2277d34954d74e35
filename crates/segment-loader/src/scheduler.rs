// Fetch Scheduler: holds segment fetches back while enough media is buffered
// ahead of the playhead.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::SchedulerConfig;
use crate::error::LoaderError;
use crate::media::{BufferWindow, MediaSlot};

/// When a segment fetch should go out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    Immediate,
    Delayed(Duration),
}

impl Dispatch {
    pub fn delay(&self) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Delayed(delay) => *delay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchScheduler {
    preload_threshold: Duration,
}

impl FetchScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            preload_threshold: config.preload_threshold,
        }
    }

    pub fn preload_threshold(&self) -> Duration {
        self.preload_threshold
    }

    /// Below the threshold the fetch goes out at once; otherwise it waits
    /// `(buffered_ahead - threshold)` seconds. No window (media not mounted)
    /// means immediate.
    pub fn decide(&self, window: Option<BufferWindow>) -> Dispatch {
        let Some(window) = window else {
            trace!("No media element attached; dispatching immediately");
            return Dispatch::Immediate;
        };

        let ahead = window.buffered_ahead();
        let threshold = self.preload_threshold.as_secs_f64();

        if !ahead.is_finite() || ahead < threshold {
            return Dispatch::Immediate;
        }

        // Absurd buffer ends (e.g. 1e30 s) saturate instead of overflowing.
        let delay = Duration::try_from_secs_f64(ahead - threshold).unwrap_or(Duration::MAX);
        Dispatch::Delayed(delay)
    }

    /// Wait until the segment may be fetched. Cancelling `token` ends the wait
    /// with [`LoaderError::Aborted`].
    pub async fn wait_for_slot(
        &self,
        media: &MediaSlot,
        token: &CancellationToken,
    ) -> Result<Dispatch, LoaderError> {
        if token.is_cancelled() {
            return Err(LoaderError::Aborted);
        }

        let dispatch = self.decide(media.buffer_window());
        if let Dispatch::Delayed(delay) = dispatch {
            debug!(
                delay_ms = delay.as_millis() as u64,
                threshold_s = self.preload_threshold.as_secs_f64(),
                "Deferring segment fetch while buffer is ahead"
            );
            tokio::select! {
                _ = token.cancelled() => return Err(LoaderError::Aborted),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        Ok(dispatch)
    }
}
