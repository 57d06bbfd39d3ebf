use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::SyncError;
use crate::payload;
use crate::transport::{RemoteCall, Transport, read_body, with_timeout};

/// Prefix of every generated callback name.
pub const CALLBACK_PREFIX: &str = "__livesync_cb_";

/// Callback-bridge transport. Each call registers a single-use callback
/// under a random name, asks the endpoint to wrap its JSON in an invocation
/// of that name, and resolves when the returned script invokes it.
pub struct CallbackBridgeTransport {
    client: Client,
    endpoint: String,
    timeout: Duration,
    callbacks: Arc<CallbackTable>,
}

impl CallbackBridgeTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, SyncError> {
        Ok(Self {
            client: super::http_client()?,
            endpoint: endpoint.to_string(),
            timeout,
            callbacks: Arc::new(CallbackTable::default()),
        })
    }

    /// Registrations still waiting for an invocation. Zero whenever no call
    /// is in flight.
    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    async fn exchange(
        &self,
        call: &RemoteCall,
        registration: &Registration,
        receiver: oneshot::Receiver<Value>,
    ) -> Result<Value, SyncError> {
        let mut pairs = call.query_pairs();
        pairs.push(("callback", registration.name()));

        let response = self
            .client
            .get(&self.endpoint)
            .header("Cache-Control", "no-store")
            .query(&pairs)
            .send()
            .await?;
        let body = read_body(response).await?;

        // Running the script is what fires the callback.
        self.callbacks.invoke(registration, &body)?;

        receiver.await.map_err(|_| {
            SyncError::PayloadFormat(format!(
                "script did not invoke {}",
                registration.name()
            ))
        })
    }
}

#[async_trait]
impl Transport for CallbackBridgeTransport {
    async fn call(&self, call: &RemoteCall) -> Result<Value, SyncError> {
        let start = Instant::now();
        let (registration, receiver) = CallbackTable::register(&self.callbacks);
        let result = with_timeout(self.timeout, self.exchange(call, &registration, receiver)).await;
        // Torn down on success, error and timeout alike.
        drop(registration);
        tracing::debug!(
            action = call.action.as_str(),
            transport = self.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "remote call finished"
        );
        result
    }

    fn name(&self) -> &'static str {
        "callback_bridge"
    }
}

/// Correlation table: callback name -> resolver of the call waiting on it.
#[derive(Default)]
pub struct CallbackTable {
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl CallbackTable {
    /// Register a fresh single-use callback. The entry lives until the
    /// returned [`Registration`] is dropped or the callback fires.
    pub fn register(table: &Arc<Self>) -> (Registration, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let mut pending = table.lock();
        let name = loop {
            let candidate = format!("{CALLBACK_PREFIX}{}", uuid::Uuid::new_v4().simple());
            if !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        pending.insert(name.clone(), tx);
        drop(pending);
        (
            Registration {
                name,
                table: Arc::clone(table),
            },
            rx,
        )
    }

    /// Run a callback script returned for `expected`. A script naming any
    /// other callback is rejected and fires nothing. Each registration fires
    /// at most once.
    pub fn invoke(&self, expected: &Registration, script: &[u8]) -> Result<(), SyncError> {
        let (name, value) = payload::parse_invocation(script)?;
        if name != expected.name() {
            return Err(SyncError::PayloadFormat(format!(
                "script invoked {name}, expected {}",
                expected.name()
            )));
        }
        let sender = self.lock().remove(&name).ok_or_else(|| {
            SyncError::PayloadFormat(format!("no pending callback named {name}"))
        })?;
        // Receiver gone means the caller already gave up; nothing to do.
        let _ = sender.send(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Value>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped ownership of one callback registration.
pub struct Registration {
    name: String,
    table: Arc<CallbackTable>,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.table.lock().remove(&self.name);
    }
}
