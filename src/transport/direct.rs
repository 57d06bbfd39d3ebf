use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::SyncError;
use crate::payload;
use crate::transport::{RemoteCall, Transport, read_body, with_timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// Parameters in the query string.
    Get,
    /// Parameters as a form-encoded body.
    Post,
}

/// Plain request/response transport: one HTTP exchange per call, JSON body
/// in the response.
pub struct DirectTransport {
    client: Client,
    endpoint: String,
    timeout: Duration,
    method: RequestMethod,
}

impl DirectTransport {
    pub fn new(
        endpoint: &str,
        timeout: Duration,
        method: RequestMethod,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            client: super::http_client()?,
            endpoint: endpoint.to_string(),
            timeout,
            method,
        })
    }

    async fn exchange(&self, call: &RemoteCall) -> Result<Value, SyncError> {
        let pairs = call.query_pairs();
        let request = match self.method {
            RequestMethod::Get => self
                .client
                .get(&self.endpoint)
                .header("Cache-Control", "no-store")
                .query(&pairs),
            RequestMethod::Post => self.client.post(&self.endpoint).form(&pairs),
        };

        let response = request.send().await?;
        let body = read_body(response).await?;
        payload::parse_json(&body)
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn call(&self, call: &RemoteCall) -> Result<Value, SyncError> {
        let start = Instant::now();
        let result = with_timeout(self.timeout, self.exchange(call)).await;
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
        match self.method {
            RequestMethod::Get => "direct",
            RequestMethod::Post => "post",
        }
    }
}
