//! Headless course video player.
//!
//! Embeds the segment loader the way a browser playback engine does: playlists
//! and segments go through loader instances, fatal errors go through the
//! player session, and the fetched media is written to a file.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod retry;

pub use cli::{Args, LevelArg};
pub use config::AppConfig;
pub use engine::{HeadlessEngine, PlaybackOptions, PlaybackSummary};
pub use error::{AppError, Result};
