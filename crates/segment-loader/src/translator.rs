// Segment Request Translator: turns the opaque fragment URLs the engine asks
// for into calls against the backend segment endpoint.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

use crate::config::{EndpointConfig, PlaylistAddressing};
use crate::error::LoaderError;
use crate::identity::VideoIdentity;
use crate::resolution::{Resolution, ResolutionState};

static NUMBERED_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"segment_(\d+)\.ts$").unwrap());

static TIMESTAMP_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\.ts$").unwrap());

static RENDITION_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+p(\d+)?$").unwrap());

/// Which filename pattern a segment URL matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentPattern {
    /// `segment_<n>.ts`
    Numbered,
    /// `<timestamp>.ts`
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub sequence_number: u64,
    /// Rendition named by the directory holding a numbered segment, if any.
    pub resolution_hint: Option<String>,
    pub pattern: SegmentPattern,
}

/// Parse a segment URL into a descriptor.
///
/// `available` is the list of advertised renditions; a parent directory that
/// is either advertised or shaped like a rendition label (`720p`, `1080p60`)
/// becomes the resolution hint.
pub fn extract_segment_info(
    url: &str,
    available: &[String],
) -> Result<SegmentDescriptor, LoaderError> {
    let parsed = Url::parse(url).map_err(|_| LoaderError::translation(url))?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let Some((filename, parents)) = segments.split_last() else {
        return Err(LoaderError::translation(url));
    };

    let (captures, pattern) = if let Some(captures) = NUMBERED_SEGMENT.captures(filename) {
        (captures, SegmentPattern::Numbered)
    } else if let Some(captures) = TIMESTAMP_SEGMENT.captures(filename) {
        (captures, SegmentPattern::Timestamp)
    } else {
        return Err(LoaderError::translation(url));
    };

    let sequence_number = captures
        .get(1)
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .ok_or_else(|| LoaderError::translation(url))?;

    let resolution_hint = match pattern {
        SegmentPattern::Numbered => parents
            .last()
            .filter(|parent| {
                RENDITION_LABEL.is_match(parent) || available.iter().any(|a| a == *parent)
            })
            .map(|parent| parent.to_string()),
        SegmentPattern::Timestamp => None,
    };

    trace!(url, sequence_number, ?resolution_hint, ?pattern, "Extracted segment info");

    Ok(SegmentDescriptor {
        sequence_number,
        resolution_hint,
        pattern,
    })
}

/// Builds backend URLs for one video.
#[derive(Debug, Clone)]
pub struct SegmentTranslator {
    identity: VideoIdentity,
    segment_endpoint: Url,
    playlist_endpoint: Url,
    playlist_addressing: PlaylistAddressing,
    default_resolution: String,
}

impl SegmentTranslator {
    pub fn new(identity: VideoIdentity, endpoints: &EndpointConfig) -> Result<Self, LoaderError> {
        let segment_endpoint = parse_endpoint(&endpoints.segment_endpoint)?;
        let playlist_endpoint = parse_endpoint(&endpoints.playlist_endpoint)?;

        Ok(Self {
            identity,
            segment_endpoint,
            playlist_endpoint,
            playlist_addressing: endpoints.playlist_addressing,
            default_resolution: endpoints.default_resolution.clone(),
        })
    }

    pub fn identity(&self) -> &VideoIdentity {
        &self.identity
    }

    /// Pick the rendition to request for `descriptor`.
    ///
    /// Order: explicit selection, URL hint (if advertised or nothing advertised
    /// yet), engine's active level, highest advertised rendition, configured default.
    pub fn resolve_resolution(
        &self,
        descriptor: &SegmentDescriptor,
        state: &ResolutionState,
    ) -> String {
        if let Resolution::Fixed(label) = state.selected() {
            return label.clone();
        }

        if let Some(hint) = &descriptor.resolution_hint
            && (state.available().is_empty() || state.is_advertised(hint))
        {
            return hint.clone();
        }

        if let Some(active) = state.active() {
            return active.to_owned();
        }

        state
            .available()
            .last()
            .cloned()
            .unwrap_or_else(|| self.default_resolution.clone())
    }

    /// `<segment-endpoint>?name=<identity>&resolution=<res>&number=<n>`
    pub fn segment_request(&self, descriptor: &SegmentDescriptor, state: &ResolutionState) -> Url {
        let resolution = self.resolve_resolution(descriptor, state);
        let mut url = self.segment_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("name", &self.identity.to_string())
            .append_pair("resolution", &resolution)
            .append_pair("number", &descriptor.sequence_number.to_string());
        url
    }

    /// Entry URL of the video's playlist.
    pub fn playlist_url(&self) -> Url {
        let mut url = self.playlist_endpoint.clone();
        match self.playlist_addressing {
            PlaylistAddressing::Path => {
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments.pop_if_empty();
                    for segment in self.identity.path_segments() {
                        segments.push(segment);
                    }
                }
            }
            PlaylistAddressing::LegacyQuery => {
                url.query_pairs_mut()
                    .append_pair("name", &self.identity.to_string());
            }
        }
        url
    }
}

fn parse_endpoint(input: &str) -> Result<Url, LoaderError> {
    let url = Url::parse(input).map_err(|e| LoaderError::invalid_url(input, e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(LoaderError::invalid_url(input, "endpoint must be a hierarchical URL"));
    }
    Ok(url)
}
