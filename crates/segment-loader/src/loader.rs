// Loader Adapter: the object handed to the playback engine. Routes playlist
// requests straight to the transport and segment requests through the
// scheduler and translator, then reports through the engine's callbacks.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{LoaderConfig, SegmentLoaderConfig};
use crate::context::{
    LoaderContext, LoaderErrorDetail, LoaderResponse, LoaderStats, NetworkDetail, ResourceKind,
};
use crate::error::LoaderError;
use crate::identity::VideoIdentity;
use crate::media::MediaSlot;
use crate::resolution::{Resolution, ResolutionHandle};
use crate::scheduler::FetchScheduler;
use crate::transport::{Transport, TransportResponse};
use crate::translator::{SegmentTranslator, extract_segment_info};

/// Engine-side callbacks for one `load`.
pub trait LoaderCallbacks: Send + Sync {
    fn on_success(
        &self,
        response: LoaderResponse,
        stats: &LoaderStats,
        context: &LoaderContext,
        network_detail: Option<&NetworkDetail>,
    );

    fn on_error(
        &self,
        error: LoaderErrorDetail,
        context: &LoaderContext,
        network_detail: Option<&NetworkDetail>,
        stats: &LoaderStats,
    );

    fn on_abort(&self, _stats: &LoaderStats, _context: &LoaderContext) {}
}

/// Network loader contract expected by the playback engine.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Run one request to completion and report it through `callbacks`.
    async fn load(
        &self,
        context: LoaderContext,
        config: &LoaderConfig,
        callbacks: &dyn LoaderCallbacks,
    );

    /// Cancel a pending deferred dispatch or in-flight request.
    fn abort(&self);

    /// Abort and refuse further loads. A result still in flight is dropped
    /// without a callback; later loads are rejected through `on_error`.
    fn destroy(&self);

    fn stats(&self) -> LoaderStats;

    fn state(&self) -> LoaderState;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Loading,
    Success,
    Error,
    Aborted,
    Destroyed,
}

/// End-of-stream signal shared by every loader of one player.
///
/// Once ended, segment loads complete with an empty payload and no network
/// call.
#[derive(Debug, Clone, Default)]
pub struct EndOfStream {
    inner: Arc<EndOfStreamInner>,
}

#[derive(Debug)]
struct EndOfStreamInner {
    ended: AtomicBool,
    final_sequence: AtomicU64,
}

impl Default for EndOfStreamInner {
    fn default() -> Self {
        Self {
            ended: AtomicBool::new(false),
            final_sequence: AtomicU64::new(u64::MAX),
        }
    }
}

impl EndOfStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    pub fn finish(&self) {
        if !self.inner.ended.swap(true, Ordering::AcqRel) {
            info!("End of stream reached; further segment loads are short-circuited");
        }
    }

    /// Clear the flag (e.g. after a seek back into the stream). The announced
    /// final sequence number is kept.
    pub fn reset(&self) {
        self.inner.ended.store(false, Ordering::Release);
    }

    /// Announce the sequence number of the stream's last segment.
    pub fn set_final_sequence(&self, sequence_number: u64) {
        self.inner
            .final_sequence
            .store(sequence_number, Ordering::Release);
    }

    pub fn final_sequence(&self) -> Option<u64> {
        match self.inner.final_sequence.load(Ordering::Acquire) {
            u64::MAX => None,
            n => Some(n),
        }
    }

    fn observe(&self, sequence_number: u64, flagged_by_backend: bool) {
        let is_final = self
            .final_sequence()
            .is_some_and(|last| sequence_number >= last);
        if flagged_by_backend || is_final {
            debug!(sequence_number, flagged_by_backend, "Fetched final segment");
            self.finish();
        }
    }
}

struct LoaderShared {
    translator: SegmentTranslator,
    scheduler: FetchScheduler,
    media: MediaSlot,
    resolution: ResolutionHandle,
    transport: Arc<dyn Transport>,
    end_of_stream: EndOfStream,
}

/// Binds one video's context once so the engine can create loaders per request.
#[derive(Clone)]
pub struct LoaderFactory {
    shared: Arc<LoaderShared>,
}

impl fmt::Debug for LoaderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderFactory")
            .field("identity", self.shared.translator.identity())
            .field("media", &self.shared.media)
            .finish_non_exhaustive()
    }
}

impl LoaderFactory {
    pub fn new(
        identity: VideoIdentity,
        media: MediaSlot,
        resolution: ResolutionHandle,
        transport: Arc<dyn Transport>,
        config: &SegmentLoaderConfig,
    ) -> Result<Self, LoaderError> {
        let translator = SegmentTranslator::new(identity, &config.endpoints)?;
        Ok(Self {
            shared: Arc::new(LoaderShared {
                translator,
                scheduler: FetchScheduler::new(&config.scheduler),
                media,
                resolution,
                transport,
                end_of_stream: EndOfStream::new(),
            }),
        })
    }

    pub fn create(&self) -> SegmentLoader {
        SegmentLoader {
            shared: Arc::clone(&self.shared),
            inner: Mutex::new(LoaderInner::default()),
        }
    }

    pub fn translator(&self) -> &SegmentTranslator {
        &self.shared.translator
    }

    pub fn resolution(&self) -> &ResolutionHandle {
        &self.shared.resolution
    }

    pub fn media(&self) -> &MediaSlot {
        &self.shared.media
    }

    pub fn end_of_stream(&self) -> &EndOfStream {
        &self.shared.end_of_stream
    }

    /// Entry playlist URL for the bound video.
    pub fn playlist_url(&self) -> Url {
        self.shared.translator.playlist_url()
    }
}

struct LoaderInner {
    state: LoaderState,
    stats: LoaderStats,
    token: CancellationToken,
}

impl Default for LoaderInner {
    fn default() -> Self {
        Self {
            state: LoaderState::Idle,
            stats: LoaderStats::default(),
            token: CancellationToken::new(),
        }
    }
}

enum Fetched {
    Response(TransportResponse),
    EndOfStream,
}

pub struct SegmentLoader {
    shared: Arc<LoaderShared>,
    inner: Mutex<LoaderInner>,
}

impl fmt::Debug for SegmentLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentLoader")
            .field("identity", self.shared.translator.identity())
            .field("state", &self.inner.lock().state)
            .finish_non_exhaustive()
    }
}

impl SegmentLoader {
    /// Push the player's rendition choice into the shared state.
    pub fn set_resolution(&self, resolution: impl Into<Resolution>) {
        self.shared.resolution.set_resolution(resolution);
    }

    pub fn set_available_resolutions(&self, available: Vec<String>) {
        self.shared.resolution.set_available_resolutions(available);
    }

    pub fn resolution(&self) -> Resolution {
        self.shared.resolution.current()
    }

    /// Engine-side retry counter; kept across loads on this instance.
    pub fn set_retry_count(&self, retry: u32) {
        self.inner.lock().stats.retry = retry;
    }

    fn begin(&self, context: &LoaderContext) -> Result<CancellationToken, LoaderError> {
        let mut inner = self.inner.lock();
        match inner.state {
            LoaderState::Loading => {
                return Err(LoaderError::Busy {
                    url: context.url.clone(),
                });
            }
            LoaderState::Destroyed => return Err(LoaderError::Destroyed),
            _ => {}
        }

        inner.stats.reset();
        inner.stats.loading.start = Some(Instant::now());
        inner.token = CancellationToken::new();
        inner.state = LoaderState::Loading;
        Ok(inner.token.clone())
    }

    async fn load_playlist(
        &self,
        context: &LoaderContext,
        token: &CancellationToken,
    ) -> Result<Fetched, LoaderError> {
        let url = Url::parse(&context.url)
            .map_err(|e| LoaderError::invalid_url(&context.url, e.to_string()))?;
        debug!(url = %url, "Fetching playlist via default transport");
        self.fetch(&url, token).await.map(Fetched::Response)
    }

    async fn load_segment(
        &self,
        context: &LoaderContext,
        token: &CancellationToken,
    ) -> Result<Fetched, LoaderError> {
        let shared = &self.shared;
        if shared.end_of_stream.is_ended() {
            return Ok(Fetched::EndOfStream);
        }

        let descriptor = extract_segment_info(&context.url, &shared.resolution.available())?;

        shared
            .scheduler
            .wait_for_slot(&shared.media, token)
            .await?;

        // The stream may have ended while this request was deferred.
        if shared.end_of_stream.is_ended() {
            return Ok(Fetched::EndOfStream);
        }

        let request_url = shared
            .translator
            .segment_request(&descriptor, &shared.resolution.snapshot());
        debug!(
            sequence_number = descriptor.sequence_number,
            request_url = %request_url,
            "Fetching segment from segment API"
        );

        let response = self.fetch(&request_url, token).await?;
        shared
            .end_of_stream
            .observe(descriptor.sequence_number, response.is_last_segment());
        Ok(Fetched::Response(response))
    }

    async fn fetch(
        &self,
        url: &Url,
        token: &CancellationToken,
    ) -> Result<TransportResponse, LoaderError> {
        let response = tokio::select! {
            _ = token.cancelled() => return Err(LoaderError::Aborted),
            response = self.shared.transport.get(url) => response?,
        };

        if !response.status.is_success() {
            return Err(LoaderError::http_status(response.status, url.as_str()));
        }
        Ok(response)
    }

    fn finish(
        &self,
        result: Result<Fetched, LoaderError>,
        context: &LoaderContext,
        callbacks: &dyn LoaderCallbacks,
    ) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        if inner.state == LoaderState::Destroyed {
            debug!(url = %context.url, "Loader destroyed mid-request; dropping result");
            return;
        }

        match result {
            Ok(Fetched::Response(response)) => {
                inner.stats.record_payload(
                    response.body.len() as u64,
                    response.content_length,
                    response.chunk_count,
                );
                inner.stats.loading.first = Some(response.first_byte_at.unwrap_or(now));
                inner.stats.finish_loading(now);
                inner.state = LoaderState::Success;
                let stats = inner.stats.clone();
                drop(inner);

                let detail = NetworkDetail {
                    url: response.url.to_string(),
                    status: response.status.as_u16(),
                    content_type: response.content_type(),
                };
                debug!(
                    url = %context.url,
                    bytes = stats.loaded,
                    "Load succeeded"
                );
                callbacks.on_success(
                    LoaderResponse {
                        data: response.body,
                        url: context.url.clone(),
                    },
                    &stats,
                    context,
                    Some(&detail),
                );
            }
            Ok(Fetched::EndOfStream) => {
                inner.stats.record_payload(0, Some(0), 0);
                inner.stats.loading.first = Some(now);
                inner.stats.finish_loading(now);
                inner.state = LoaderState::Success;
                let stats = inner.stats.clone();
                drop(inner);

                debug!(url = %context.url, "Stream ended; answering with an empty segment");
                callbacks.on_success(
                    LoaderResponse {
                        data: Bytes::new(),
                        url: context.url.clone(),
                    },
                    &stats,
                    context,
                    None,
                );
            }
            Err(LoaderError::Aborted) => {
                inner.stats.aborted = true;
                inner.stats.loading.end = Some(now);
                inner.state = LoaderState::Aborted;
                let stats = inner.stats.clone();
                drop(inner);

                debug!(url = %context.url, "Load aborted");
                callbacks.on_abort(&stats, context);
            }
            Err(err) => {
                inner.stats.loading.end = Some(now);
                inner.state = LoaderState::Error;
                let stats = inner.stats.clone();
                drop(inner);

                let detail = match &err {
                    LoaderError::HttpStatus { status, url } => Some(NetworkDetail {
                        url: url.clone(),
                        status: status.as_u16(),
                        content_type: None,
                    }),
                    _ => None,
                };
                warn!(url = %context.url, error = %err, "Load failed");
                callbacks.on_error(LoaderErrorDetail::from(&err), context, detail.as_ref(), &stats);
            }
        }
    }
}

#[async_trait]
impl Loader for SegmentLoader {
    #[instrument(skip(self, _config, callbacks), fields(url = %context.url, kind = ?context.kind))]
    async fn load(
        &self,
        context: LoaderContext,
        _config: &LoaderConfig,
        callbacks: &dyn LoaderCallbacks,
    ) {
        let token = match self.begin(&context) {
            Ok(token) => token,
            Err(err) => {
                // The current request keeps its own state and stats.
                warn!(error = %err, "Rejected load");
                let stats = self.stats();
                callbacks.on_error(LoaderErrorDetail::from(&err), &context, None, &stats);
                return;
            }
        };

        let result = match context.kind {
            ResourceKind::Playlist => self.load_playlist(&context, &token).await,
            ResourceKind::Segment => self.load_segment(&context, &token).await,
        };

        self.finish(result, &context, callbacks);
    }

    fn abort(&self) {
        let inner = self.inner.lock();
        if inner.state == LoaderState::Loading {
            inner.token.cancel();
        }
    }

    fn destroy(&self) {
        let mut inner = self.inner.lock();
        inner.token.cancel();
        inner.state = LoaderState::Destroyed;
    }

    fn stats(&self) -> LoaderStats {
        self.inner.lock().stats.clone()
    }

    fn state(&self) -> LoaderState {
        self.inner.lock().state
    }
}

#[async_trait]
impl<L: Loader + ?Sized> Loader for Arc<L> {
    async fn load(
        &self,
        context: LoaderContext,
        config: &LoaderConfig,
        callbacks: &dyn LoaderCallbacks,
    ) {
        (**self).load(context, config, callbacks).await
    }

    fn abort(&self) {
        (**self).abort()
    }

    fn destroy(&self) {
        (**self).destroy()
    }

    fn stats(&self) -> LoaderStats {
        (**self).stats()
    }

    fn state(&self) -> LoaderState {
        (**self).state()
    }
}
