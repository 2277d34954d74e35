// Headless playback engine: plays the role the browser engine plays for the
// loader. Loads playlists and segments through loader instances, retries per
// the loader configuration and feeds events back to the player session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist};
use parking_lot::Mutex;
use segment_loader::{
    EngineError, EngineErrorKind, LevelInfo, LevelSelection, Loader, LoaderCallbacks,
    LoaderConfig, LoaderContext, LoaderError, LoaderErrorDetail, LoaderFactory, LoaderResponse,
    LoaderStats,
    MediaSlot, NetworkDetail, PlayerCommand, PlayerEvent, PlayerSession, PreferenceStore,
    RecoveryAction, ResolutionHandle, SegmentLoader, SegmentLoaderConfig, Transport,
    VideoIdentity, extract_segment_info,
};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::cli::LevelArg;
use crate::error::{AppError, Result};
use crate::media::SimulatedMedia;
use crate::retry::{RetryPolicy, reload_with_backoff};

/// Fatal network errors the engine tries to recover from with a fresh load
/// before giving up on playback.
const MAX_RECOVERIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    pub output: PathBuf,
    pub level: Option<LevelArg>,
    pub volume: Option<f32>,
    pub max_segments: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSummary {
    pub segments: usize,
    pub bytes: u64,
    pub level: Option<String>,
    pub volume: f32,
    pub ended: bool,
}

enum LoadOutcome {
    Loaded(Bytes),
    Failed(LoaderErrorDetail),
    Aborted,
}

/// Callbacks that keep the single outcome of one `load`.
#[derive(Default)]
struct OutcomeCallbacks {
    outcome: Mutex<Option<LoadOutcome>>,
}

impl OutcomeCallbacks {
    fn take(&self) -> LoadOutcome {
        // A destroyed loader reports nothing.
        self.outcome.lock().take().unwrap_or(LoadOutcome::Aborted)
    }
}

impl LoaderCallbacks for OutcomeCallbacks {
    fn on_success(
        &self,
        response: LoaderResponse,
        stats: &LoaderStats,
        context: &LoaderContext,
        _network_detail: Option<&NetworkDetail>,
    ) {
        debug!(
            url = %context.url,
            bytes = stats.loaded,
            bw_estimate = stats.bw_estimate as u64,
            "Loaded"
        );
        *self.outcome.lock() = Some(LoadOutcome::Loaded(response.data));
    }

    fn on_error(
        &self,
        error: LoaderErrorDetail,
        _context: &LoaderContext,
        _network_detail: Option<&NetworkDetail>,
        _stats: &LoaderStats,
    ) {
        *self.outcome.lock() = Some(LoadOutcome::Failed(error));
    }

    fn on_abort(&self, _stats: &LoaderStats, _context: &LoaderContext) {
        *self.outcome.lock() = Some(LoadOutcome::Aborted);
    }
}

pub struct HeadlessEngine {
    factory: LoaderFactory,
    session: PlayerSession,
    media: Arc<SimulatedMedia>,
    loader_config: LoaderConfig,
    retry: RetryPolicy,
    token: CancellationToken,
}

impl HeadlessEngine {
    pub fn new(
        identity: VideoIdentity,
        config: &SegmentLoaderConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn PreferenceStore>,
        playback_rate: f64,
        token: CancellationToken,
    ) -> Result<Self> {
        let resolution = ResolutionHandle::new();
        let factory = LoaderFactory::new(
            identity.clone(),
            MediaSlot::empty(),
            resolution.clone(),
            transport,
            config,
        )?;

        Ok(Self {
            factory,
            session: PlayerSession::new(identity, resolution, store),
            media: Arc::new(SimulatedMedia::new(playback_rate)),
            loader_config: config.loader.clone(),
            retry: RetryPolicy::from(&config.loader),
            token,
        })
    }

    pub fn session(&self) -> &PlayerSession {
        &self.session
    }

    pub fn factory(&self) -> &LoaderFactory {
        &self.factory
    }

    pub async fn run(&mut self, options: &PlaybackOptions) -> Result<PlaybackSummary> {
        if let Some(volume) = options.volume {
            self.session.set_volume(volume)?;
        }
        let volume = self.session.restore_volume();

        let manifest_url = self.factory.playlist_url();
        info!(identity = %self.session.identity(), url = %manifest_url, "Loading manifest");
        let manifest = self
            .fetch(LoaderContext::playlist(manifest_url.as_str()))
            .await?;

        let (media_url, playlist) = match parse_playlist(&manifest)? {
            Playlist::MasterPlaylist(master) => {
                let level = self.choose_level(&manifest_url, &master, options)?;
                let url = Url::parse(&level.url)
                    .map_err(|e| AppError::Playlist(format!("bad variant URL: {e}")))?;
                let body = self.fetch(LoaderContext::playlist(url.as_str())).await?;
                match parse_playlist(&body)? {
                    Playlist::MediaPlaylist(media) => (url, media),
                    Playlist::MasterPlaylist(_) => {
                        return Err(AppError::Playlist(
                            "variant points at another master playlist".to_string(),
                        ));
                    }
                }
            }
            Playlist::MediaPlaylist(media) => {
                self.session
                    .handle_event(PlayerEvent::ManifestParsed { levels: Vec::new() });
                (manifest_url, media)
            }
        };

        self.announce_final_segment(&media_url, &playlist);
        self.factory.media().attach(self.media.clone());

        let result = self.play(&media_url, &playlist, options).await;
        self.media.pause();
        self.factory.media().detach();

        let (segments, bytes, ended) = result?;
        Ok(PlaybackSummary {
            segments,
            bytes,
            level: self.session.resolution().snapshot().active().map(str::to_owned),
            volume,
            ended,
        })
    }

    fn choose_level(
        &mut self,
        manifest_url: &Url,
        master: &MasterPlaylist,
        options: &PlaybackOptions,
    ) -> Result<LevelInfo> {
        let levels = master
            .variants
            .iter()
            .filter(|variant| !variant.is_i_frame)
            .map(|variant| -> Result<LevelInfo> {
                let url = resolve(manifest_url, &variant.uri)?;
                let level = LevelInfo::new(url, variant.bandwidth);
                Ok(match &variant.resolution {
                    Some(resolution) => level.with_height(resolution.height),
                    None => level,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if levels.is_empty() {
            return Err(AppError::Playlist("manifest advertises no levels".to_string()));
        }

        if let Some(PlayerCommand::SelectLevel(selection)) =
            self.session.handle_event(PlayerEvent::ManifestParsed {
                levels: levels.clone(),
            })
        {
            info!(%selection, "Using saved level");
        }

        if let Some(level) = &options.level {
            let selection = match level {
                LevelArg::Auto => LevelSelection::Auto,
                LevelArg::Index(index) => LevelSelection::Level(*index),
                LevelArg::Label(label) => {
                    let index = self
                        .session
                        .resolution()
                        .snapshot()
                        .index_of(label)
                        .ok_or_else(|| {
                            AppError::InvalidInput(format!("level `{label}` is not advertised"))
                        })?;
                    LevelSelection::Level(index)
                }
            };
            self.session.select_level(selection)?;
        }

        let index = match self.session.selection() {
            LevelSelection::Level(index) => index,
            // Headless ABR: no bandwidth estimate yet, take the best rendition.
            LevelSelection::Auto => levels
                .iter()
                .enumerate()
                .max_by_key(|(_, level)| level.bandwidth)
                .map(|(index, _)| index)
                .unwrap_or(0),
        };

        self.session
            .handle_event(PlayerEvent::LevelSwitched { level: index });
        info!(level = index, label = %levels[index].label(), "Switched level");
        Ok(levels[index].clone())
    }

    fn announce_final_segment(&self, media_url: &Url, playlist: &MediaPlaylist) {
        if !playlist.end_list {
            return;
        }
        let Some(last) = playlist.segments.last() else {
            return;
        };
        let Ok(url) = resolve(media_url, &last.uri) else {
            return;
        };
        match extract_segment_info(&url, &self.session.resolution().available()) {
            Ok(descriptor) => {
                debug!(sequence_number = descriptor.sequence_number, "Final segment announced");
                self.factory
                    .end_of_stream()
                    .set_final_sequence(descriptor.sequence_number);
            }
            Err(e) => debug!(error = %e, "Final segment has no sequence number"),
        }
    }

    async fn play(
        &mut self,
        media_url: &Url,
        playlist: &MediaPlaylist,
        options: &PlaybackOptions,
    ) -> Result<(usize, u64, bool)> {
        let file = File::create(&options.output).await?;
        let mut writer = BufWriter::new(file);
        let limit = options.max_segments.unwrap_or(usize::MAX);

        let mut segments = 0usize;
        let mut bytes = 0u64;
        let mut recoveries = 0u32;
        let mut ended = false;

        let mut queue = playlist.segments.iter().take(limit);
        let mut pending = queue.next();
        while let Some(segment) = pending {
            let url = resolve(media_url, &segment.uri)?;
            let data = match self.fetch(LoaderContext::segment(url)).await {
                Ok(data) => data,
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(err) => {
                    if self.recover(&err, &mut recoveries)? {
                        continue;
                    }
                    return Err(err);
                }
            };

            if data.is_empty() && self.factory.end_of_stream().is_ended() {
                info!("Stream ended before the playlist did");
                ended = true;
                break;
            }

            writer.write_all(&data).await?;
            self.media.append(f64::from(segment.duration));
            if segments == 0 {
                self.media.play();
            }
            segments += 1;
            bytes += data.len() as u64;
            pending = queue.next();
        }

        writer.flush().await?;
        ended |=
            self.factory.end_of_stream().is_ended() || (playlist.end_list && pending.is_none());
        info!(segments, bytes, "Playback finished");
        Ok((segments, bytes, ended))
    }

    /// Report a failed segment to the session as a fatal engine error and
    /// follow its recovery instruction. `Ok(true)` means load again.
    fn recover(&mut self, err: &AppError, recoveries: &mut u32) -> Result<bool> {
        let network = matches!(err, AppError::Load(detail) if detail.retryable || detail.code != 0);
        let kind = if network && *recoveries < MAX_RECOVERIES {
            EngineErrorKind::Network
        } else {
            EngineErrorKind::Other
        };

        let event = PlayerEvent::Error(EngineError::fatal(kind, err.to_string()));
        match self.session.handle_event(event) {
            Some(PlayerCommand::Recover(RecoveryAction::StartLoad)) => {
                *recoveries += 1;
                warn!(
                    attempt = *recoveries,
                    error = %err,
                    "Restarting load after fatal network error"
                );
                Ok(true)
            }
            Some(PlayerCommand::Recover(RecoveryAction::Surface(message))) => {
                Err(AppError::Playback(message))
            }
            _ => Ok(false),
        }
    }

    async fn fetch(&self, context: LoaderContext) -> Result<Bytes> {
        let loader = self.factory.create();
        let result = reload_with_backoff(&self.retry, &self.token, |retry| {
            let context = context.clone();
            let loader = &loader;
            async move {
                if retry > 0 {
                    debug!(url = %context.url, retry, "Reloading");
                    loader.set_retry_count(retry);
                }
                match self.load_once(loader, context).await {
                    LoadOutcome::Loaded(data) => Ok(data),
                    LoadOutcome::Failed(detail) => Err(AppError::Load(detail)),
                    LoadOutcome::Aborted => Err(AppError::Cancelled),
                }
            }
        })
        .await;
        loader.destroy();
        result
    }

    async fn load_once(&self, loader: &SegmentLoader, context: LoaderContext) -> LoadOutcome {
        let callbacks = OutcomeCallbacks::default();
        let url = context.url.clone();
        let load = loader.load(context, &self.loader_config, &callbacks);
        tokio::pin!(load);

        let deadline = self.loader_config.load_deadline().unwrap_or(Duration::MAX);
        tokio::select! {
            _ = &mut load => {}
            _ = self.token.cancelled() => {
                loader.abort();
                load.await;
            }
            _ = tokio::time::sleep(deadline) => {
                warn!(url = %url, deadline_ms = deadline.as_millis() as u64, "Load timed out");
                loader.abort();
                load.await;
                let err = LoaderError::timeout(url, deadline);
                return LoadOutcome::Failed(LoaderErrorDetail::from(&err));
            }
        }
        callbacks.take()
    }
}

fn parse_playlist(body: &[u8]) -> Result<Playlist> {
    m3u8_rs::parse_playlist_res(body)
        .map_err(|e| AppError::Playlist(format!("failed to parse playlist: {e}")))
}

fn resolve(base: &Url, uri: &str) -> Result<String> {
    base.join(uri)
        .map(String::from)
        .map_err(|e| AppError::Playlist(format!("bad URI `{uri}` in playlist: {e}")))
}
