//! Remote gateway to the demo catalog backend.
//!
//! # Architecture
//!
//! - [`Gateway`] - the three operations the reconciliation loop needs
//! - [`HttpGateway`] - reqwest implementation against the backend's REST routes
//! - [`retry`] - backoff policy used for the idempotent catalog listing
//!
//! | Operation | Route | Retried |
//! |-----------|-------|---------|
//! | `list_apps` | `GET /databricks/apps` | yes, per [`RetryConfig`] |
//! | `app_status` | `GET /databricks/apps/{name}/status` | no, next poll tick retries |
//! | `start_app` | `POST /databricks/apps/{name}/start` | never |
//! | `health` | `GET /health` | no |
//!
//! Every request carries `Authorization: Bearer <token>` when a token is set.
//! A missing token is not an error here; the backend decides.

mod error;
pub mod retry;

use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use url::Url;

use catalog_types::{App, AppsList, BearerToken, HealthStatus, StartAck, StatusReport};

pub use error::{DEFAULT_START_ERROR, FetchError, PollError, StartError};
pub use retry::RetryConfig;
use retry::{RetryOutcome, send_with_retry};

const APPS_ROUTE: [&str; 2] = ["databricks", "apps"];
const HEALTH_ROUTE: [&str; 1] = ["health"];

const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Backend operations used by the catalog reconciler.
///
/// Implementations must be cheap to share behind an `Arc`; the session issues
/// status polls for several apps concurrently.
pub trait Gateway: Send + Sync + 'static {
    /// Fetch the full catalog. `Ok(vec![])` means "no apps", never "unreachable".
    fn list_apps(&self) -> impl Future<Output = Result<Vec<App>, FetchError>> + Send;

    /// Fetch one app's current snapshot and optional server-asserted state.
    fn app_status(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<StatusReport, PollError>> + Send;

    /// Ask the backend to start an app.
    fn start_app(&self, name: &str) -> impl Future<Output = Result<StartAck, StartError>> + Send;
}

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayBuildError {
    #[error("backend URL '{0}' cannot carry path segments")]
    InvalidBaseUrl(Url),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

fn base_client_builder(options: &GatewayOptions) -> reqwest::ClientBuilder {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("demo-catalog/", env!("CARGO_PKG_VERSION"))),
    );

    reqwest::Client::builder()
        .connect_timeout(options.connect_timeout)
        .timeout(options.request_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers)
}

/// Read at most [`MAX_ERROR_BODY_BYTES`] of a response body as lossy UTF-8.
pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, FetchError> {
    let bytes = response.bytes().await.map_err(FetchError::Transport)?;
    serde_json::from_slice(&bytes).map_err(FetchError::Decode)
}

async fn status_error(response: reqwest::Response) -> FetchError {
    let status = response.status().as_u16();
    let body = read_capped_error_body(response).await;
    FetchError::Status { status, body }
}

/// HTTP implementation of [`Gateway`].
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: Url,
    token: RwLock<Option<BearerToken>>,
    retry: RetryConfig,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url.as_str())
            .field("has_token", &self.current_token().is_some())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpGateway {
    pub fn new(
        base_url: Url,
        token: Option<BearerToken>,
        options: GatewayOptions,
    ) -> Result<Self, GatewayBuildError> {
        if base_url.cannot_be_a_base() {
            return Err(GatewayBuildError::InvalidBaseUrl(base_url));
        }
        let client = base_client_builder(&options).build()?;
        Ok(Self {
            client,
            base_url,
            token: RwLock::new(token),
            retry: options.retry,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Replace the session credential used by subsequent requests.
    pub fn set_token(&self, token: Option<BearerToken>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn current_token(&self) -> Option<BearerToken> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn app_endpoint(&self, name: &str, action: &str) -> Result<Url, FetchError> {
        // Dot segments would be resolved by the URL parser, not encoded.
        if name.trim().is_empty() || name == "." || name == ".." {
            return Err(FetchError::InvalidName(name.to_string()));
        }
        let [root, collection] = APPS_ROUTE;
        Ok(self.endpoint([root, collection, name, action]))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.current_token() {
            Some(token) => match HeaderValue::from_str(&token.header_value()) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    builder.header(AUTHORIZATION, value)
                }
                Err(_) => {
                    tracing::warn!("Bearer token is not a valid header value; sending without it");
                    builder
                }
            },
            None => builder,
        }
    }

    /// Probe `GET /health`.
    pub async fn health(&self) -> Result<HealthStatus, FetchError> {
        let url = self.endpoint(HEALTH_ROUTE);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Transport)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        decode_json(response).await
    }

    async fn fetch_status(&self, name: &str) -> Result<StatusReport, FetchError> {
        let url = self.app_endpoint(name, "status")?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(FetchError::Transport)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let report: StatusReport = decode_json(response).await?;
        if report.has_unrecognized_override() {
            tracing::debug!(
                app = name,
                state = report.state.as_deref().unwrap_or_default(),
                "Ignoring unrecognized server state override"
            );
        }
        Ok(report)
    }
}

impl Gateway for HttpGateway {
    async fn list_apps(&self) -> Result<Vec<App>, FetchError> {
        let url = self.endpoint(APPS_ROUTE);
        let outcome =
            send_with_retry(|| self.authorize(self.client.get(url.clone())), &self.retry).await;

        let response = match outcome {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError { response, attempts } => {
                let err = status_error(response).await;
                tracing::warn!(attempts, error = %err, "Listing apps failed");
                return Err(err);
            }
            RetryOutcome::TransportError { attempts, source } => {
                tracing::warn!(attempts, error = %source, "Listing apps failed");
                return Err(FetchError::Transport(source));
            }
        };

        let list: AppsList = decode_json(response).await?;
        tracing::debug!(count = list.apps.len(), "Listed apps");
        Ok(list.apps)
    }

    async fn app_status(&self, name: &str) -> Result<StatusReport, PollError> {
        self.fetch_status(name)
            .await
            .map_err(|source| PollError::new(name, source))
    }

    async fn start_app(&self, name: &str) -> Result<StartAck, StartError> {
        let url = self
            .app_endpoint(name, "start")
            .map_err(|e| StartError::new(e.to_string()))?;

        let response = match self.authorize(self.client.post(url)).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(app = name, error = %e, "Start request failed");
                return Err(StartError::new(format!("{DEFAULT_START_ERROR}: {e}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = read_capped_error_body(response).await;
            let err = StartError::from_rejection_body(status.as_u16(), &body);
            tracing::warn!(app = name, status = %status, message = %err.message, "Start rejected");
            return Err(err);
        }

        // The acknowledgement body is informational; a 2xx is success regardless.
        let body = read_capped_error_body(response).await;
        let ack = serde_json::from_str::<StartAck>(&body).unwrap_or_default();
        tracing::info!(app = name, "Start accepted");
        Ok(ack)
    }
}
