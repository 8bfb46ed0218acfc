//! HTTP client for the remote ledger REST API.
//!
//! Thin transport layer: it knows URLs, headers, and the page envelope, and
//! nothing about matching or persistence. The sync engine consumes it through
//! the `LedgerPageSource` trait.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use tallybook_core::documents::DocumentStream;
use tallybook_core::sync::{FetchError, LedgerPageSource, PageEnvelope};

use crate::error::{LedgerClientError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Error envelope the ledger service uses for non-success responses.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: String,
    message: String,
}

/// Client for the remote ledger API.
#[derive(Debug, Clone)]
pub struct LedgerApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl LedgerApiClient {
    /// Create a new ledger client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the ledger API (e.g., "https://api.ledger.example")
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create headers for an API request.
    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| LedgerClientError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[LedgerClient] API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[LedgerClient] API response error ({}): {}", status, preview);
    }

    fn api_error_from_body(status: reqwest::StatusCode, body: &str) -> LedgerClientError {
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
            return LedgerClientError::api(
                status.as_u16(),
                format!("{}: {}", error.code, error.message),
            );
        }
        LedgerClientError::api(status.as_u16(), format!("Request failed: {}", body))
    }

    /// Parse a JSON response body.
    ///
    /// A non-success status maps to an API error; a success status with a
    /// body that does not decode maps to a malformed-response error, which
    /// downstream must never treat as an empty collection.
    async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::api_error_from_body(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "[LedgerClient] Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            LedgerClientError::malformed(format!("Failed to parse response: {}", e))
        })
    }

    /// Fetch one page of a document collection.
    ///
    /// GET /api/v1/{stream}/documents?page={page}&per_page={per_page}
    pub async fn fetch_documents_page(
        &self,
        token: &str,
        stream: DocumentStream,
        page: u32,
        per_page: u32,
    ) -> Result<PageEnvelope> {
        let url = format!(
            "{}/api/v1/{}/documents?page={}&per_page={}",
            self.base_url,
            stream.as_str(),
            page,
            per_page
        );
        debug!("[LedgerClient] Fetching page: {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers(token)?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download a document PDF from its remote URL.
    pub async fn download_document_pdf(&self, token: &str, url: &str) -> Result<Vec<u8>> {
        debug!("[LedgerClient] Downloading PDF: {}", url);

        let response = self
            .client
            .get(url)
            .headers(self.headers(token)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            Self::log_response(status, &body);
            return Err(Self::api_error_from_body(status, &body));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl LedgerPageSource for LedgerApiClient {
    async fn fetch_page(
        &self,
        token: &str,
        stream: DocumentStream,
        page: u32,
        page_size: u32,
    ) -> std::result::Result<PageEnvelope, FetchError> {
        self.fetch_documents_page(token, stream, page, page_size)
            .await
            .map_err(Into::into)
    }

    async fn download_attachment(
        &self,
        token: &str,
        url: &str,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        self.download_document_pdf(token, url)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        request_line: String,
        authorization: Option<String>,
    }

    #[derive(Debug, Clone)]
    struct MockResponse {
        status: u16,
        body: String,
    }

    fn page_body() -> String {
        r#"{
            "data": [
                {"id": "q-1", "document_number": "EST-0001", "title": "Website redesign"},
                {"id": 2, "document_number": "EST-0002"}
            ],
            "pagination": {"current_page": 1, "total_pages": 3}
        }"#
        .to_string()
    }

    fn api_error_body(code: &str, message: &str) -> String {
        format!(r#"{{"code":"{}","message":"{}"}}"#, code, message)
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(
        stream: &mut tokio::net::TcpStream,
    ) -> Option<(String, HashMap<String, String>)> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        Some((request_line, headers))
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            401 => "Unauthorized",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        responses: Vec<MockResponse>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);
        let scripted_clone = Arc::clone(&scripted);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                let scripted_inner = Arc::clone(&scripted_clone);
                tokio::spawn(async move {
                    let Some((request_line, headers)) = read_http_request(&mut stream).await
                    else {
                        return;
                    };
                    captured_inner.lock().await.push(CapturedRequest {
                        request_line,
                        authorization: headers.get("authorization").cloned(),
                    });

                    let response =
                        scripted_inner
                            .lock()
                            .await
                            .pop_front()
                            .unwrap_or(MockResponse {
                                status: 500,
                                body: api_error_body("internal", "unexpected request"),
                            });
                    let _ = write_http_response(&mut stream, response.status, &response.body)
                        .await;
                });
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    #[tokio::test]
    async fn fetch_page_builds_url_and_sends_bearer_token() {
        let (base_url, captured, server) = start_mock_server(vec![MockResponse {
            status: 200,
            body: page_body(),
        }])
        .await;

        let client = LedgerApiClient::new(&base_url);
        let envelope = client
            .fetch_documents_page("token-1", DocumentStream::Quotes, 1, 50)
            .await
            .expect("fetch page");

        assert_eq!(envelope.data.len(), 2);
        assert_eq!(envelope.data[0].id.as_deref(), Some("q-1"));
        assert_eq!(envelope.data[1].id.as_deref(), Some("2"));
        assert_eq!(envelope.pagination.current_page, 1);
        assert_eq!(envelope.pagination.total_pages, 3);

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].request_line,
            "GET /api/v1/quotes/documents?page=1&per_page=50 HTTP/1.1"
        );
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer token-1"));

        server.abort();
    }

    #[tokio::test]
    async fn successful_status_with_wrong_shape_is_malformed_not_empty() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 200,
            body: r#"{"unexpected": true}"#.to_string(),
        }])
        .await;

        let client = LedgerApiClient::new(&base_url);
        let err = client
            .fetch_page("token-1", DocumentStream::Billings, 1, 50)
            .await
            .expect_err("must not decode");

        assert!(matches!(err, FetchError::Malformed(_)), "got {:?}", err);
        server.abort();
    }

    #[tokio::test]
    async fn api_error_envelope_is_surfaced_with_status() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 401,
            body: api_error_body("unauthorized", "token expired"),
        }])
        .await;

        let client = LedgerApiClient::new(&base_url);
        let err = client
            .fetch_documents_page("token-1", DocumentStream::Quotes, 1, 50)
            .await
            .expect_err("must fail");

        match err {
            LedgerClientError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "unauthorized: token expired");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        server.abort();
    }

    #[tokio::test]
    async fn pdf_download_returns_raw_bytes() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 200,
            body: "%PDF-1.7 payload".to_string(),
        }])
        .await;

        let client = LedgerApiClient::new(&base_url);
        let bytes = client
            .download_document_pdf("token-1", &format!("{}/pdfs/q-1", base_url))
            .await
            .expect("download");

        assert_eq!(bytes, b"%PDF-1.7 payload");
        server.abort();
    }
}
