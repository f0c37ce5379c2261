//! API client for the Lade REST API.
//!
//! Besides JSON requests this covers the two streaming transports the
//! interactive commands need: an HTTP/1.1 connection upgraded into a raw
//! duplex process stream, and newline-delimited JSON log streams.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Upgraded};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::TokenManager;
use crate::config::Config;
use crate::stream::{follow_log_stream, LogHandler, ResizeControl, StreamError, WindowSize};

use super::models::{LogStreamOpts, Process, ProcessCreateOpts, ProcessResizeOpts, Release};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL for API endpoints
const API_BASE_URL: &str = "https://lade.io/api/v1";

/// Timeout for plain JSON requests. Streams and uploads have none.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timeout for establishing a connection, streams included
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Protocol requested when upgrading to a raw process stream
const ATTACH_PROTOCOL: &str = "tcp";

/// API client for Lade.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<TokenManager>,
}

impl ApiClient {
    /// Create a client for the configured API, falling back to the public endpoint
    pub fn new(tokens: Arc<TokenManager>, config: &Config) -> Result<Self, ApiError> {
        Self::with_base_url(tokens, config.api_url.as_deref().unwrap_or(API_BASE_URL))
    }

    pub fn with_base_url(tokens: Arc<TokenManager>, base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn access_token(&self) -> Result<String, ApiError> {
        Ok(self.tokens.get_token().await?.access_token)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send an authorised request, backing off while rate limited.
    /// `build` is called once per attempt.
    async fn send<F>(&self, url: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.access_token().await?;
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().bearer_auth(&token).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    async fn json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .send(&url, || {
                self.client
                    .get(&url)
                    .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            })
            .await?;
        Self::json(&url, response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .send(&url, || {
                self.client
                    .post(&url)
                    .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                    .json(body)
            })
            .await?;
        Self::json(&url, response).await
    }

    // ===== Processes =====

    /// Start a one-off process running `opts.command`
    pub async fn create_process(&self, app: &str, opts: &ProcessCreateOpts) -> Result<Process, ApiError> {
        let process: Process = self.post(&format!("apps/{}/processes", app), opts).await?;
        debug!(app, number = process.number, "Created process");
        Ok(process)
    }

    pub async fn list_processes(&self, app: &str) -> Result<Vec<Process>, ApiError> {
        self.get(&format!("apps/{}/processes", app)).await
    }

    /// Set the terminal size of a running process
    pub async fn resize_process(&self, app: &str, number: u32, opts: ProcessResizeOpts) -> Result<(), ApiError> {
        let url = self.url(&format!("apps/{}/processes/{}/resize", app, number));
        self.send(&url, || {
            self.client
                .post(&url)
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .json(&opts)
        })
        .await?;
        Ok(())
    }

    /// Open the raw duplex stream of a running process.
    ///
    /// The connection is upgraded in place, so everything written is the
    /// process's stdin and everything read is its terminal output.
    pub async fn attach_process(&self, app: &str, number: u32) -> Result<Upgraded, ApiError> {
        let url = self.url(&format!("apps/{}/processes/{}/attach", app, number));
        let token = self.access_token().await?;

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, ATTACH_PROTOCOL)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::SWITCHING_PROTOCOLS {
            let body = response.text().await.unwrap_or_default();
            if status.is_success() {
                return Err(ApiError::InvalidResponse(format!(
                    "Expected 101 Switching Protocols from {}, got {}",
                    url, status
                )));
            }
            return Err(ApiError::from_status(status, &body));
        }

        debug!(app, number, "Attached to process");
        Ok(response.upgrade().await?)
    }

    // ===== Logs =====

    pub async fn app_log_stream(&self, app: &str, opts: &LogStreamOpts) -> Result<LogStream, ApiError> {
        self.open_log_stream(&format!("apps/{}/logs", app), opts).await
    }

    pub async fn addon_log_stream(&self, addon: &str, opts: &LogStreamOpts) -> Result<LogStream, ApiError> {
        self.open_log_stream(&format!("addons/{}/logs", addon), opts).await
    }

    /// Build output of a release
    pub async fn release_log_stream(
        &self,
        app: &str,
        release: &Release,
        opts: &LogStreamOpts,
    ) -> Result<LogStream, ApiError> {
        self.open_log_stream(&format!("apps/{}/releases/{}/logs", app, release.id), opts)
            .await
    }

    async fn open_log_stream(&self, path: &str, opts: &LogStreamOpts) -> Result<LogStream, ApiError> {
        let url = self.url(path);
        let query = opts.query();
        let response = self
            .send(&url, || self.client.get(&url).query(&query))
            .await?;
        debug!(url = %url, follow = opts.follow, "Opened log stream");
        Ok(LogStream { response })
    }

    // ===== Releases =====

    /// Upload a gzipped source tarball as a new release
    pub async fn create_release(&self, app: &str, tarball: Vec<u8>) -> Result<Release, ApiError> {
        let url = self.url(&format!("apps/{}/releases", app));
        let size = tarball.len();
        let response = self
            .send(&url, || {
                self.client
                    .post(&url)
                    .header(header::CONTENT_TYPE, "application/gzip")
                    .body(tarball.clone())
            })
            .await?;
        let release: Release = Self::json(&url, response).await?;
        debug!(app, release = release.id, bytes = size, "Created release");
        Ok(release)
    }
}

/// An open log stream, read line by line by [`LogStream::follow`]
pub struct LogStream {
    response: Response,
}

impl LogStream {
    /// Feed every line to `handler` until the stream ends or is cancelled
    pub async fn follow(self, handler: &mut dyn LogHandler, cancel: &CancellationToken) -> Result<(), StreamError> {
        follow_log_stream(self.response.bytes_stream(), handler, cancel).await
    }
}

/// Resize requests for one running process
pub struct ProcessResizer {
    client: ApiClient,
    app: String,
    number: u32,
}

impl ProcessResizer {
    pub fn new(client: ApiClient, app: impl Into<String>, number: u32) -> Self {
        Self {
            client,
            app: app.into(),
            number,
        }
    }
}

#[async_trait]
impl ResizeControl for ProcessResizer {
    async fn resize(&self, size: WindowSize) -> Result<(), ApiError> {
        self.client
            .resize_process(&self.app, self.number, size.into())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Credential, CredentialStore, LoginFlow, TokenExchange};
    use crate::stream::LogEntry;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_json, header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedStore(Credential);

    impl CredentialStore for FixedStore {
        fn load(&self) -> Result<Credential, AuthError> {
            Ok(self.0.clone())
        }

        fn save(&self, _credential: &Credential) -> Result<(), AuthError> {
            Ok(())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl TokenExchange for Unreachable {
        async fn password_grant(&self, _: &str, _: &str) -> Result<Credential, AuthError> {
            Err(AuthError::Connectivity("offline".to_string()))
        }

        async fn refresh_grant(&self, _: &str) -> Result<Credential, AuthError> {
            Err(AuthError::Connectivity("offline".to_string()))
        }
    }

    #[derive(Default)]
    struct CountingLogin {
        prompts: AtomicUsize,
    }

    #[async_trait]
    impl LoginFlow for CountingLogin {
        async fn login(&self) -> Result<Credential, AuthError> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            Err(AuthError::Interrupted)
        }
    }

    fn client_for(base_url: &str, login: Arc<CountingLogin>) -> ApiClient {
        let credential = Credential {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expiry: Some(Utc::now() + chrono::Duration::hours(1)),
        };
        let tokens = TokenManager::new(Arc::new(FixedStore(credential)), Arc::new(Unreachable), login).unwrap();
        ApiClient::with_base_url(Arc::new(tokens), base_url).unwrap()
    }

    #[derive(Default)]
    struct Collect(Vec<LogEntry>);

    impl LogHandler for Collect {
        fn handle(&mut self, entry: &LogEntry, _cancel: &CancellationToken) -> Result<(), StreamError> {
            self.0.push(entry.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_list_processes_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apps/shop/processes"))
            .and(header_eq("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"number": 1, "type": "web", "command": "npm start", "status": "running"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Arc::default());
        let processes = client.list_processes("shop").await.unwrap();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].kind, "web");
    }

    #[tokio::test]
    async fn test_create_process_posts_command() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/shop/processes"))
            .and(body_json(serde_json::json!({"command": "bash", "plan_id": "1x"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "number": 7, "type": "run", "command": "bash"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Arc::default());
        let opts = ProcessCreateOpts {
            command: "bash".to_string(),
            plan: Some("1x".to_string()),
        };
        let process = client.create_process("shop", &opts).await.unwrap();
        assert_eq!(process.number, 7);
    }

    #[tokio::test]
    async fn test_unavailable_backend_is_server_error_without_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apps/shop/processes"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable\n"))
            .mount(&server)
            .await;

        let login = Arc::new(CountingLogin::default());
        let client = client_for(&server.uri(), login.clone());
        let err = client.list_processes("shop").await.unwrap_err();

        assert!(matches!(err, ApiError::ServerError(ref msg) if msg == "upstream unavailable"));
        assert_eq!(login.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resizer_posts_window_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/shop/processes/3/resize"))
            .and(body_json(serde_json::json!({"height": 40, "width": 120})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let resizer = ProcessResizer::new(client_for(&server.uri(), Arc::default()), "shop", 3);
        resizer.resize(WindowSize { rows: 40, cols: 120 }).await.unwrap();
    }

    #[tokio::test]
    async fn test_app_log_stream_passes_options_and_reads_lines() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"name\":\"web.1\",\"line\":\"GET /\",\"source\":\"stdout\"}\n",
            "{\"name\":\"worker.1\",\"line\":\"job done\",\"source\":\"stdout\"}\n",
        );
        Mock::given(method("GET"))
            .and(path("/apps/shop/logs"))
            .and(query_param("follow", "true"))
            .and(query_param("tail", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Arc::default());
        let opts = LogStreamOpts {
            follow: true,
            tail: Some(10),
            since: None,
        };
        let stream = client.app_log_stream("shop", &opts).await.unwrap();
        let mut handler = Collect::default();
        stream.follow(&mut handler, &CancellationToken::new()).await.unwrap();

        let names: Vec<_> = handler.0.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["web.1", "worker.1"]);
    }

    #[tokio::test]
    async fn test_create_release_uploads_tarball() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/shop/releases"))
            .and(header_eq("content-type", "application/gzip"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 42, "version": 5, "status": "building"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Arc::default());
        let release = client.create_release("shop", vec![0x1f, 0x8b, 0x08]).await.unwrap();
        assert_eq!(release.id, 42);
        assert_eq!(release.status, "building");
    }

    #[tokio::test]
    async fn test_attach_refused_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apps/shop/processes/9/attach"))
            .respond_with(ResponseTemplate::new(404).set_body_string("process not found"))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Arc::default());
        let err = client.attach_process("shop", 9).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_attach_upgrades_to_raw_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "request ended early");
                request.extend_from_slice(&buf[..n]);
            }
            let request = String::from_utf8_lossy(&request).to_lowercase();
            assert!(request.starts_with("get /apps/shop/processes/2/attach"));
            assert!(request.contains("upgrade: tcp"));

            socket
                .write_all(b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: tcp\r\n\r\n")
                .await
                .unwrap();
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(&buf[..n]).await.unwrap();
        });

        let client = client_for(&format!("http://{}", addr), Arc::default());
        let mut conn = client.attach_process("shop", 2).await.unwrap();
        conn.write_all(b"ls\r").await.unwrap();
        conn.flush().await.unwrap();

        let mut echoed = [0u8; 3];
        conn.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"ls\r");
        server.await.unwrap();
    }
}
