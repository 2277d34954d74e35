use std::fmt;
use std::time::Instant;

use bytes::Bytes;

use crate::error::LoaderError;

/// File extension of media segments served by the backend.
pub const SEGMENT_EXTENSION: &str = ".ts";

/// What the engine asked the loader for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Master or media playlist. Fetched unmodified.
    Playlist,
    /// Media segment. Routed through the segment API.
    Segment,
}

impl ResourceKind {
    /// Classify a requested URL by the extension of its path, ignoring query and fragment.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(SEGMENT_EXTENSION) {
            Self::Segment
        } else {
            Self::Playlist
        }
    }
}

/// A single request from the engine. Immutable for the duration of one `load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderContext {
    pub url: String,
    pub kind: ResourceKind,
}

impl LoaderContext {
    /// Build a context, inferring the resource kind from the URL.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let kind = ResourceKind::from_url(&url);
        Self { url, kind }
    }

    pub fn playlist(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: ResourceKind::Playlist,
        }
    }

    pub fn segment(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: ResourceKind::Segment,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingTiming {
    pub start: Option<Instant>,
    pub first: Option<Instant>,
    pub end: Option<Instant>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParsingTiming {
    pub start: Option<Instant>,
    pub end: Option<Instant>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferingTiming {
    pub start: Option<Instant>,
    pub first: Option<Instant>,
    pub end: Option<Instant>,
}

/// Per-request statistics read by the engine after a callback.
///
/// `parsing` and `buffering` belong to the engine; the loader only fills
/// the byte counters and the `loading` phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderStats {
    pub aborted: bool,
    pub loaded: u64,
    pub total: u64,
    pub retry: u32,
    pub chunk_count: u32,
    /// Bits per second measured over the loading phase.
    pub bw_estimate: f64,
    pub loading: LoadingTiming,
    pub parsing: ParsingTiming,
    pub buffering: BufferingTiming,
}

impl LoaderStats {
    /// Clear everything except the engine-maintained retry counter.
    pub fn reset(&mut self) {
        let retry = self.retry;
        *self = Self {
            retry,
            ..Self::default()
        };
    }

    pub(crate) fn record_payload(&mut self, loaded: u64, total: Option<u64>, chunk_count: u32) {
        self.loaded = loaded;
        self.total = total.unwrap_or(loaded).max(loaded);
        self.chunk_count = chunk_count;
    }

    pub(crate) fn finish_loading(&mut self, end: Instant) {
        self.loading.end = Some(end);
        if let Some(start) = self.loading.start {
            let elapsed = end.saturating_duration_since(start).as_secs_f64();
            if elapsed > 0.0 {
                self.bw_estimate = (self.loaded as f64 * 8.0) / elapsed;
            }
        }
    }

    /// Time from request start to the end of the loading phase.
    pub fn load_duration(&self) -> Option<std::time::Duration> {
        match (self.loading.start, self.loading.end) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }
}

/// Payload delivered with `on_success`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderResponse {
    pub data: Bytes,
    /// The URL the engine requested, not the rewritten backend URL.
    pub url: String,
}

/// Transport-level details for the request that produced a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDetail {
    /// URL actually requested from the backend.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
}

/// `{code, text}` pair handed to `on_error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderErrorDetail {
    pub code: u16,
    pub text: String,
    /// Whether the engine may retry the request.
    pub retryable: bool,
}

impl From<&LoaderError> for LoaderErrorDetail {
    fn from(err: &LoaderError) -> Self {
        Self {
            code: err.code(),
            text: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl fmt::Display for LoaderErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.text, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn classifies_by_path_extension() {
        assert_eq!(
            ResourceKind::from_url("http://cdn/v/720p/segment_3.ts"),
            ResourceKind::Segment
        );
        assert_eq!(
            ResourceKind::from_url("http://cdn/v/720p/segment_3.ts?token=abc"),
            ResourceKind::Segment
        );
        assert_eq!(
            ResourceKind::from_url("http://cdn/v/playlist.m3u8"),
            ResourceKind::Playlist
        );
        assert_eq!(
            ResourceKind::from_url("http://cdn/playlist?file=a.ts"),
            ResourceKind::Playlist
        );
    }

    #[test]
    fn reset_keeps_retry_counter() {
        let mut stats = LoaderStats {
            retry: 2,
            loaded: 10,
            aborted: true,
            ..Default::default()
        };
        stats.reset();
        assert_eq!(stats.retry, 2);
        assert_eq!(stats.loaded, 0);
        assert!(!stats.aborted);
    }

    #[test]
    fn bandwidth_estimate_uses_loading_phase() {
        let start = Instant::now();
        let mut stats = LoaderStats::default();
        stats.loading.start = Some(start);
        stats.record_payload(1000, None, 1);
        stats.finish_loading(start + Duration::from_secs(2));

        assert_eq!(stats.total, 1000);
        assert_eq!(stats.load_duration(), Some(Duration::from_secs(2)));
        assert!((stats.bw_estimate - 4000.0).abs() < f64::EPSILON);
    }
}
