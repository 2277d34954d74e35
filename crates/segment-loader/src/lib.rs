//! Segment loader for course video playback over HLS.
//!
//! This crate provides the pluggable fragment loader an HLS playback engine
//! uses to fetch playlists and media segments from a course video backend.
//! Segment requests are rewritten against the backend's segment API and held
//! back while enough media is buffered ahead of the playhead.
//!
//! ## Component Overview
//!
//! - `translator`: Turns opaque segment URLs into segment API requests
//! - `resolution`: Shared rendition state and per-video persisted preferences
//! - `scheduler`: Buffer-aware dispatch of segment fetches
//! - `loader`: The [`Loader`] implementation handed to the engine, and its factory
//! - `player`: Player session reacting to engine events
//! - `transport`: The default HTTP transport built on `reqwest`
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use segment_loader::{
//!     HttpTransport, LoaderConfig, LoaderContext, LoaderFactory, MediaSlot, ResolutionHandle,
//!     SegmentLoaderConfig, VideoIdentity,
//! };
//!
//! # use segment_loader::{Loader, LoaderCallbacks, LoaderError};
//! # async fn run(callbacks: &dyn LoaderCallbacks) -> Result<(), LoaderError> {
//!
//! let config = SegmentLoaderConfig::default();
//! let transport = Arc::new(HttpTransport::new(&config.transport)?);
//! let factory = LoaderFactory::new(
//!     VideoIdentity::course("algebra", "intro-101"),
//!     MediaSlot::empty(),
//!     ResolutionHandle::new(),
//!     transport,
//!     &config,
//! )?;
//!
//! let loader = factory.create();
//! loader
//!     .load(
//!         LoaderContext::new("http://cdn.local/intro-101/720p/segment_0.ts"),
//!         &LoaderConfig::default(),
//!         callbacks,
//!     )
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod identity;
pub mod loader;
pub mod media;
pub mod player;
pub mod resolution;
pub mod scheduler;
pub mod store;
pub mod translator;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use config::{
    EndpointConfig, LoaderConfig, PlaylistAddressing, SchedulerConfig, SegmentLoaderConfig,
    TransportConfig,
};
pub use context::{
    LoaderContext, LoaderErrorDetail, LoaderResponse, LoaderStats, NetworkDetail, ResourceKind,
};
pub use error::LoaderError;
pub use events::{
    EngineError, EngineErrorKind, LevelInfo, LevelSelection, PlayerCommand, PlayerEvent,
    RecoveryAction,
};
pub use identity::VideoIdentity;
pub use loader::{EndOfStream, Loader, LoaderCallbacks, LoaderFactory, LoaderState, SegmentLoader};
pub use media::{BufferWindow, MediaElement, MediaSlot, TimeRange};
pub use player::{PLAYBACK_ERROR_MESSAGE, PlayerSession};
pub use resolution::{Resolution, ResolutionHandle, ResolutionPreferences, ResolutionState};
pub use scheduler::{Dispatch, FetchScheduler};
pub use store::{JsonFileStore, MemoryStore, PreferenceStore};
pub use translator::{SegmentDescriptor, SegmentPattern, SegmentTranslator, extract_segment_info};
pub use transport::{HttpTransport, Transport, TransportResponse};
