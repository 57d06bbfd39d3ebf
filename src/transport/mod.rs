pub mod bridge;
pub mod direct;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::SyncError;
use crate::record::{Person, SessionRecord};

/// Max response body size accepted from the remote store.
pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Remote capability named by the `action` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Add,
    Reset,
    Ping,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Add => "add",
            Self::Reset => "reset",
            Self::Ping => "ping",
        }
    }
}

/// One request to the remote store, independent of how it is carried.
#[derive(Debug, Clone)]
pub struct RemoteCall {
    pub action: Action,
    pub params: Vec<(&'static str, String)>,
}

impl RemoteCall {
    pub fn list(person: Person) -> Self {
        Self {
            action: Action::List,
            params: vec![("person", person.remote_tag().to_string())],
        }
    }

    pub fn add(person: Person, record: &SessionRecord) -> Self {
        let mut params = vec![("person", person.remote_tag().to_string())];
        params.extend(record.to_params());
        Self {
            action: Action::Add,
            params,
        }
    }

    pub fn reset(person: Person) -> Self {
        Self {
            action: Action::Reset,
            params: vec![("person", person.remote_tag().to_string())],
        }
    }

    pub fn ping() -> Self {
        Self {
            action: Action::Ping,
            params: Vec::new(),
        }
    }

    /// All key/value pairs including `action`, in wire order.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::with_capacity(self.params.len() + 1);
        pairs.push(("action", self.action.as_str()));
        pairs.extend(self.params.iter().map(|(k, v)| (*k, v.as_str())));
        pairs
    }
}

/// How requests reach the remote store. Every implementation bounds each
/// call by its timeout and leaves nothing registered when a call ends.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one call and return the decoded response envelope.
    async fn call(&self, call: &RemoteCall) -> Result<Value, SyncError>;

    fn name(&self) -> &'static str;
}

/// Transport strategy, chosen once at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// GET with query-string parameters, JSON response.
    #[default]
    Direct,
    /// POST with a form-encoded body, JSON response.
    Post,
    /// GET with a `callback` parameter; the response is a script invoking
    /// a single-use callback registration.
    CallbackBridge,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Post => "post",
            Self::CallbackBridge => "callback_bridge",
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "direct" | "get" => Ok(Self::Direct),
            "post" => Ok(Self::Post),
            "callback_bridge" | "bridge" | "jsonp" => Ok(Self::CallbackBridge),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// Build the configured transport for `endpoint`.
pub fn build(
    kind: TransportKind,
    endpoint: &str,
    timeout: Duration,
) -> Result<Arc<dyn Transport>, SyncError> {
    Ok(match kind {
        TransportKind::Direct => Arc::new(direct::DirectTransport::new(
            endpoint,
            timeout,
            direct::RequestMethod::Get,
        )?),
        TransportKind::Post => Arc::new(direct::DirectTransport::new(
            endpoint,
            timeout,
            direct::RequestMethod::Post,
        )?),
        TransportKind::CallbackBridge => {
            Arc::new(bridge::CallbackBridgeTransport::new(endpoint, timeout)?)
        }
    })
}

/// Shared client settings for the HTTP-backed transports.
pub(crate) fn http_client() -> Result<reqwest::Client, SyncError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(2)
        .build()
        .map_err(|e| SyncError::Transport(format!("failed to build HTTP client: {e}")))
}

/// Read a successful response body, enforcing [`MAX_RESPONSE_BYTES`].
/// Non-success statuses become [`SyncError::Status`].
pub(crate) async fn read_body(response: reqwest::Response) -> Result<Vec<u8>, SyncError> {
    let status = response.status();

    if response
        .content_length()
        .is_some_and(|len| len as usize > MAX_RESPONSE_BYTES)
    {
        return Err(SyncError::Transport(format!(
            "response too large: {} bytes (max {MAX_RESPONSE_BYTES})",
            response.content_length().unwrap_or_default()
        )));
    }

    let bytes = response.bytes().await?;

    if !status.is_success() {
        let truncated = &bytes[..bytes.len().min(1024)];
        return Err(SyncError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(truncated).into_owned(),
        });
    }

    if bytes.len() > MAX_RESPONSE_BYTES {
        return Err(SyncError::Transport(format!(
            "response too large: {} bytes (max {MAX_RESPONSE_BYTES})",
            bytes.len()
        )));
    }

    Ok(bytes.to_vec())
}

/// Bound `fut` by `timeout`. On expiry the future is dropped, which
/// abandons the in-flight request.
pub(crate) async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, SyncError>>,
) -> Result<T, SyncError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| SyncError::Timeout(timeout.as_millis() as u64))?
}
