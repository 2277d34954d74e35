// Default transport: a thin reqwest wrapper that reads whole responses and
// records when the first body byte arrived.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::TransportConfig;
use crate::error::LoaderError;

/// Header the segment API may set on the final segment of a finished stream.
pub const LAST_SEGMENT_HEADER: &str = "x-last-segment";

/// Upper bound on the body buffer reserved up front from `Content-Length`.
/// Larger bodies still load; the buffer grows as chunks arrive.
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub content_length: Option<u64>,
    pub chunk_count: u32,
    pub first_byte_at: Option<Instant>,
}

impl TransportResponse {
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    /// Whether the backend flagged this response as the last segment of the stream.
    pub fn is_last_segment(&self) -> bool {
        self.headers
            .get(LAST_SEGMENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true") || v.trim() == "1")
    }
}

/// Issues GET requests on behalf of a loader. Non-2xx statuses are returned,
/// not turned into errors; the loader decides what they mean.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<TransportResponse, LoaderError>;
}

pub struct HttpTransport {
    client: Client,
    first_byte_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, LoaderError> {
        Ok(Self {
            client: create_client(config)?,
            first_byte_timeout: config.first_byte_timeout,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            first_byte_timeout: Duration::ZERO,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, LoaderError> {
        let send = self.client.get(url.clone()).send();
        let response = if self.first_byte_timeout.is_zero() {
            send.await?
        } else {
            tokio::time::timeout(self.first_byte_timeout, send)
                .await
                .map_err(|_| LoaderError::timeout(url.as_str(), self.first_byte_timeout))??
        };

        let status = response.status();
        let headers = response.headers().clone();
        let content_length = response.content_length();
        let final_url = response.url().clone();

        trace!(
            url = %url,
            status = status.as_u16(),
            http_version = ?response.version(),
            "Received response headers"
        );

        let capacity = content_length.unwrap_or(0).min(MAX_PREALLOC) as usize;
        let mut buffer = BytesMut::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        let mut chunk_count = 0u32;
        let mut first_byte_at = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            first_byte_at.get_or_insert_with(Instant::now);
            chunk_count += 1;
            buffer.extend_from_slice(&chunk);
        }

        Ok(TransportResponse {
            url: final_url,
            status,
            headers,
            body: buffer.freeze(),
            content_length,
            chunk_count,
            first_byte_at,
        })
    }
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed a provider first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &TransportConfig) -> Result<Client, LoaderError> {
    install_rustls_provider();

    let mut client_builder = Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .cookie_store(config.include_credentials)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if let Some(proxy_url) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            LoaderError::configuration(format!("invalid proxy URL `{proxy_url}`: {e}"))
        })?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy_url = %proxy_url, "Using explicitly configured proxy");
    } else if config.use_system_proxy {
        // reqwest picks up system/env proxies unless `no_proxy()` is called.
        debug!("Using system proxy settings");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled");
    }

    client_builder.build().map_err(|e| {
        warn!(error = %e, "Failed to build HTTP client");
        LoaderError::from(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response_with(headers: HeaderMap) -> TransportResponse {
        TransportResponse {
            url: Url::parse("http://localhost/segment").unwrap(),
            status: StatusCode::OK,
            headers,
            body: Bytes::new(),
            content_length: None,
            chunk_count: 0,
            first_byte_at: None,
        }
    }

    #[test]
    fn recognizes_last_segment_header() {
        let mut headers = HeaderMap::new();
        assert!(!response_with(headers.clone()).is_last_segment());

        headers.insert(LAST_SEGMENT_HEADER, HeaderValue::from_static("TRUE"));
        assert!(response_with(headers.clone()).is_last_segment());

        headers.insert(LAST_SEGMENT_HEADER, HeaderValue::from_static("no"));
        assert!(!response_with(headers).is_last_segment());
    }

    #[tokio::test]
    async fn lying_content_length_fails_without_reserving_it() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4611686018427387904\r\n\r\nabc")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let transport = HttpTransport::new(&TransportConfig {
            use_system_proxy: false,
            ..Default::default()
        })
        .unwrap();
        let url = Url::parse(&format!("http://{addr}/segment?number=1")).unwrap();

        let result = transport.get(&url).await;
        assert!(
            matches!(result, Err(LoaderError::Network { .. })),
            "expected a network error, got {result:?}"
        );
    }

    #[tokio::test]
    async fn silent_server_hits_first_byte_timeout() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without ever answering.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let transport = HttpTransport::new(&TransportConfig {
            use_system_proxy: false,
            first_byte_timeout: Duration::from_millis(100),
            ..Default::default()
        })
        .unwrap();
        let url = Url::parse(&format!("http://{addr}/playlist/algebra/intro-101")).unwrap();

        let err = transport.get(&url).await.unwrap_err();
        assert!(matches!(err, LoaderError::Timeout { .. }), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[test]
    fn rejects_invalid_proxy() {
        let config = TransportConfig {
            proxy: Some("::not a proxy::".into()),
            ..Default::default()
        };
        assert!(matches!(
            create_client(&config),
            Err(LoaderError::Configuration { .. })
        ));
    }
}
