use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

pub const DEFAULT_API_BASE: &str = "http://localhost:3000";

/// Seconds of media buffered ahead of the playhead before segment fetches get deferred.
pub const DEFAULT_PRELOAD_THRESHOLD: Duration = Duration::from_secs(15);

/// Rendition requested when neither the player nor the manifest names one.
pub const DEFAULT_RESOLUTION: &str = "1080p";

/// How a video identity is attached to the playlist endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaylistAddressing {
    /// `<playlist-endpoint>/<identity>`
    #[default]
    Path,
    /// `<playlist-endpoint>?name=<identity>`
    LegacyQuery,
}

/// Backend endpoints the loader talks to.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub segment_endpoint: String,
    pub playlist_endpoint: String,
    pub playlist_addressing: PlaylistAddressing,
    pub default_resolution: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::from_base(DEFAULT_API_BASE)
    }
}

impl EndpointConfig {
    /// Derive both endpoints from the API base (`<base>/segment`, `<base>/playlist`).
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            segment_endpoint: format!("{base}/segment"),
            playlist_endpoint: format!("{base}/playlist"),
            playlist_addressing: PlaylistAddressing::Path,
            default_resolution: DEFAULT_RESOLUTION.to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub preload_threshold: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            preload_threshold: DEFAULT_PRELOAD_THRESHOLD,
        }
    }
}

/// Retry and timeout policy handed to the playback engine alongside the loader.
///
/// The loader itself never enforces these values; they belong to the engine's
/// own retry/timeout machinery. A zero duration disables that limit.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    pub max_time_to_first_byte: Duration,
    pub max_load_time: Duration,
    pub max_retry: u32,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Maximum forward buffer in bytes.
    pub max_buffer_size: usize,
    /// Maximum forward buffer in media time.
    pub max_buffer_length: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_time_to_first_byte: Duration::from_secs(10),
            max_load_time: Duration::from_secs(120),
            max_retry: 6,
            timeout: Duration::from_secs(20),
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(8),
            max_buffer_size: 60 * 1000 * 1000,
            max_buffer_length: Duration::from_secs(30),
        }
    }
}

impl LoaderConfig {
    /// Wall-clock budget for one load attempt: the tighter of `timeout` and
    /// `max_load_time`. `None` when both are disabled.
    pub fn load_deadline(&self) -> Option<Duration> {
        [self.timeout, self.max_load_time]
            .into_iter()
            .filter(|limit| !limit.is_zero())
            .min()
    }
}

/// Options for the default HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall timeout for a request (zero disables it)
    pub timeout: Duration,

    /// Connection timeout (zero disables it)
    pub connect_timeout: Duration,

    /// Time allowed between sending a request and receiving the response
    /// head (zero disables it)
    pub first_byte_timeout: Duration,

    pub user_agent: String,

    pub headers: HeaderMap,

    /// Keep cookies between requests so authenticated playlist and segment
    /// calls carry the session credentials.
    pub include_credentials: bool,

    pub follow_redirects: bool,

    /// Explicit proxy URL (`http://`, `https://` or `socks5://`)
    pub proxy: Option<String>,

    /// Whether to use system proxy settings when no explicit proxy is set
    pub use_system_proxy: bool,

    pub pool_max_idle_per_host: usize,

    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            first_byte_timeout: Duration::ZERO,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: TransportConfig::get_default_headers(),
            include_credentials: true,
            follow_redirects: true,
            proxy: None,
            use_system_proxy: true,
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers
    }

    /// Merge custom headers over the defaults; custom values win.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }
}

/// Everything a [`crate::LoaderFactory`] needs besides its runtime collaborators.
#[derive(Debug, Clone, Default)]
pub struct SegmentLoaderConfig {
    pub endpoints: EndpointConfig,
    pub scheduler: SchedulerConfig,
    pub loader: LoaderConfig,
    pub transport: TransportConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_derive_from_base() {
        let endpoints = EndpointConfig::from_base("https://api.example.com/");
        assert_eq!(endpoints.segment_endpoint, "https://api.example.com/segment");
        assert_eq!(
            endpoints.playlist_endpoint,
            "https://api.example.com/playlist"
        );
        assert_eq!(endpoints.default_resolution, DEFAULT_RESOLUTION);
    }

    #[test]
    fn load_deadline_takes_tighter_enabled_limit() {
        let config = LoaderConfig {
            timeout: Duration::from_secs(20),
            max_load_time: Duration::from_secs(5),
            ..LoaderConfig::default()
        };
        assert_eq!(config.load_deadline(), Some(Duration::from_secs(5)));

        let config = LoaderConfig {
            max_load_time: Duration::ZERO,
            ..config
        };
        assert_eq!(config.load_deadline(), Some(Duration::from_secs(20)));

        let config = LoaderConfig {
            timeout: Duration::ZERO,
            ..config
        };
        assert_eq!(config.load_deadline(), None);
    }

    #[test]
    fn custom_headers_override_defaults() {
        let mut custom = HeaderMap::new();
        custom.insert(reqwest::header::ACCEPT, HeaderValue::from_static("video/mp2t"));
        let config = TransportConfig::default().with_headers(custom);
        assert_eq!(config.headers[reqwest::header::ACCEPT], "video/mp2t");
        assert!(config.headers.contains_key(reqwest::header::CONNECTION));
    }
}
