use std::collections::VecDeque;
use std::sync::Once;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::context::{LoaderContext, LoaderErrorDetail, LoaderResponse, LoaderStats, NetworkDetail};
use crate::error::LoaderError;
use crate::loader::LoaderCallbacks;
use crate::media::{MediaElement, TimeRange};
use crate::transport::{LAST_SEGMENT_HEADER, Transport, TransportResponse};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .init();
    });
}

pub struct FakeMedia {
    current_time: Mutex<f64>,
    buffered: Mutex<Vec<TimeRange>>,
}

impl FakeMedia {
    pub fn new(current_time: f64, ranges: &[(f64, f64)]) -> Self {
        Self {
            current_time: Mutex::new(current_time),
            buffered: Mutex::new(
                ranges
                    .iter()
                    .map(|&(start, end)| TimeRange::new(start, end))
                    .collect(),
            ),
        }
    }
}

impl MediaElement for FakeMedia {
    fn current_time(&self) -> f64 {
        *self.current_time.lock()
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.buffered.lock().clone()
    }
}

type ErrorFn = Box<dyn Fn() -> LoaderError + Send + Sync>;

enum Scripted {
    Response {
        status: StatusCode,
        body: &'static [u8],
        headers: HeaderMap,
    },
    Error(ErrorFn),
}

/// Transport that records requested URLs and replays scripted answers in
/// order. An empty script answers `200` with an empty body.
#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_ok(&self, body: &'static [u8]) {
        self.push(StatusCode::OK, body, HeaderMap::new());
    }

    pub fn respond_status(&self, status: StatusCode) {
        self.push(status, b"", HeaderMap::new());
    }

    pub fn respond_last_segment(&self, body: &'static [u8]) {
        let mut headers = HeaderMap::new();
        headers.insert(LAST_SEGMENT_HEADER, HeaderValue::from_static("true"));
        self.push(StatusCode::OK, body, headers);
    }

    pub fn respond_err(&self, make: impl Fn() -> LoaderError + Send + Sync + 'static) {
        self.script.lock().push_back(Scripted::Error(Box::new(make)));
    }

    fn push(&self, status: StatusCode, body: &'static [u8], headers: HeaderMap) {
        self.script.lock().push_back(Scripted::Response {
            status,
            body,
            headers,
        });
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, LoaderError> {
        self.requests.lock().push(url.to_string());
        let scripted = self.script.lock().pop_front();
        let (status, body, headers) = match scripted {
            Some(Scripted::Response {
                status,
                body,
                headers,
            }) => (status, body, headers),
            Some(Scripted::Error(make)) => return Err(make()),
            None => (StatusCode::OK, &b""[..], HeaderMap::new()),
        };

        Ok(TransportResponse {
            url: url.clone(),
            status,
            headers,
            body: Bytes::from_static(body),
            content_length: Some(body.len() as u64),
            chunk_count: u32::from(!body.is_empty()),
            first_byte_at: Some(Instant::now()),
        })
    }
}

#[derive(Debug, Clone)]
pub enum CallbackEvent {
    Success {
        data: Bytes,
        url: String,
        stats: LoaderStats,
    },
    Error {
        code: u16,
        text: String,
    },
    Abort,
}

#[derive(Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<CallbackEvent>>,
}

impl RecordingCallbacks {
    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().clone()
    }

    /// Take the one recorded event, failing if there were zero or several.
    pub fn single(&self) -> CallbackEvent {
        let mut events = self.events.lock();
        assert_eq!(events.len(), 1, "expected exactly one callback, got {events:?}");
        events.remove(0)
    }
}

impl LoaderCallbacks for RecordingCallbacks {
    fn on_success(
        &self,
        response: LoaderResponse,
        stats: &LoaderStats,
        _context: &LoaderContext,
        _network_detail: Option<&NetworkDetail>,
    ) {
        self.events.lock().push(CallbackEvent::Success {
            data: response.data,
            url: response.url,
            stats: stats.clone(),
        });
    }

    fn on_error(
        &self,
        error: LoaderErrorDetail,
        _context: &LoaderContext,
        _network_detail: Option<&NetworkDetail>,
        _stats: &LoaderStats,
    ) {
        self.events.lock().push(CallbackEvent::Error {
            code: error.code,
            text: error.text,
        });
    }

    fn on_abort(&self, _stats: &LoaderStats, _context: &LoaderContext) {
        self.events.lock().push(CallbackEvent::Abort);
    }
}
