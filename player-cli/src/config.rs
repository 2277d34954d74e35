use std::path::{Path, PathBuf};
use std::time::Duration;

use segment_loader::config::{DEFAULT_API_BASE, DEFAULT_RESOLUTION};
use segment_loader::{
    EndpointConfig, LoaderConfig, PlaylistAddressing, SchedulerConfig, SegmentLoaderConfig,
    TransportConfig,
};
use serde::Deserialize;
use tracing::debug;

use crate::cli::Args;
use crate::error::{AppError, Result};

pub const DEFAULT_PREFERENCES_FILE: &str = "course-player-preferences.json";

/// File configuration. Every field is optional in the TOML file; command line
/// flags win over file values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base: String,
    pub preferences_file: PathBuf,
    pub preload_threshold_secs: f64,
    pub default_resolution: String,
    pub legacy_playlist: bool,
    pub playback_rate: f64,
    pub loader: LoaderSection,
    pub transport: TransportSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderSection {
    pub max_retry: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_load_time_secs: u64,
    pub max_time_to_first_byte_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub use_system_proxy: bool,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            preferences_file: PathBuf::from(DEFAULT_PREFERENCES_FILE),
            preload_threshold_secs: SchedulerConfig::default().preload_threshold.as_secs_f64(),
            default_resolution: DEFAULT_RESOLUTION.to_string(),
            legacy_playlist: false,
            playback_rate: 1.0,
            loader: LoaderSection::default(),
            transport: TransportSection::default(),
        }
    }
}

impl Default for LoaderSection {
    fn default() -> Self {
        let defaults = LoaderConfig::default();
        Self {
            max_retry: defaults.max_retry,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
            max_retry_delay_ms: defaults.max_retry_delay.as_millis() as u64,
            timeout_secs: defaults.timeout.as_secs(),
            max_load_time_secs: defaults.max_load_time.as_secs(),
            max_time_to_first_byte_secs: defaults.max_time_to_first_byte.as_secs(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        let defaults = TransportConfig::default();
        Self {
            user_agent: None,
            proxy: None,
            use_system_proxy: defaults.use_system_proxy,
            timeout_secs: defaults.timeout.as_secs(),
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
        }
    }
}

impl AppConfig {
    /// Load the file at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(api_base) = &args.api_base {
            self.api_base = api_base.clone();
        }
        if let Some(preferences) = &args.preferences {
            self.preferences_file = preferences.clone();
        }
        if let Some(threshold) = args.preload_threshold {
            self.preload_threshold_secs = threshold;
        }
        if let Some(rate) = args.rate {
            self.playback_rate = rate;
        }
        if args.legacy_playlist {
            self.legacy_playlist = true;
        }
        if let Some(proxy) = &args.proxy {
            self.transport.proxy = Some(proxy.clone());
        }
        if let Some(max_retry) = args.max_retry {
            self.loader.max_retry = max_retry;
        }
    }

    pub fn segment_loader_config(&self) -> Result<SegmentLoaderConfig> {
        let preload_threshold = Duration::try_from_secs_f64(self.preload_threshold_secs)
            .map_err(|e| {
                AppError::Config(format!(
                    "invalid preload threshold {}: {e}",
                    self.preload_threshold_secs
                ))
            })?;

        let mut endpoints = EndpointConfig::from_base(&self.api_base);
        endpoints.default_resolution = self.default_resolution.clone();
        if self.legacy_playlist {
            endpoints.playlist_addressing = PlaylistAddressing::LegacyQuery;
        }

        let loader = LoaderConfig {
            max_retry: self.loader.max_retry,
            retry_delay: Duration::from_millis(self.loader.retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.loader.max_retry_delay_ms),
            timeout: Duration::from_secs(self.loader.timeout_secs),
            max_load_time: Duration::from_secs(self.loader.max_load_time_secs),
            max_time_to_first_byte: Duration::from_secs(self.loader.max_time_to_first_byte_secs),
            ..LoaderConfig::default()
        };

        let mut transport = TransportConfig {
            proxy: self.transport.proxy.clone(),
            use_system_proxy: self.transport.use_system_proxy,
            timeout: Duration::from_secs(self.transport.timeout_secs),
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
            // Enforced when the response head arrives.
            first_byte_timeout: loader.max_time_to_first_byte,
            ..TransportConfig::default()
        };
        if let Some(user_agent) = &self.transport.user_agent {
            transport.user_agent = user_agent.clone();
        }

        Ok(SegmentLoaderConfig {
            endpoints,
            scheduler: SchedulerConfig { preload_threshold },
            loader,
            transport,
        })
    }
}
