use std::sync::Arc;

use serde_json::Value;

use crate::error::SyncError;
use crate::record::{Person, SessionRecord};
use crate::transport::{Action, RemoteCall, Transport};

/// Client for the remote record store. One method per remote capability;
/// each fails with [`SyncError`] on transport failure, malformed payload or
/// an `ok:false` envelope.
#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
}

impl RemoteClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Raw rows for `person`. Sanitizing is left to the caller.
    pub async fn list(&self, person: Person) -> Result<Vec<Value>, SyncError> {
        let mut envelope = self.send(RemoteCall::list(person)).await?;
        match envelope.get_mut("rows").map(Value::take) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(rows)) => Ok(rows),
            Some(other) => Err(SyncError::PayloadFormat(format!(
                "list rows is not an array (got {})",
                json_type(&other)
            ))),
        }
    }

    pub async fn add(&self, person: Person, record: &SessionRecord) -> Result<(), SyncError> {
        self.send(RemoteCall::add(person, record)).await.map(|_| ())
    }

    /// Clear every record of `person` on the remote side.
    pub async fn reset(&self, person: Person) -> Result<(), SyncError> {
        self.send(RemoteCall::reset(person)).await.map(|_| ())
    }

    /// Liveness probe. Returns the diagnostics object.
    pub async fn ping(&self) -> Result<Value, SyncError> {
        let envelope = self.send(RemoteCall::ping()).await?;
        match envelope.get("ping").and_then(Value::as_str) {
            Some("pong") => Ok(envelope),
            _ => Err(SyncError::PayloadFormat("ping answered without pong".into())),
        }
    }

    async fn send(&self, call: RemoteCall) -> Result<Value, SyncError> {
        tracing::debug!(
            action = call.action.as_str(),
            params = call.params.len(),
            "remote call"
        );
        let envelope = self.transport.call(&call).await?;
        check_envelope(call.action, envelope)
    }
}

/// Accept only `{ok: true, ...}`. `ok:false` becomes an application error
/// carrying the store's message.
pub fn check_envelope(action: Action, envelope: Value) -> Result<Value, SyncError> {
    let Some(object) = envelope.as_object() else {
        return Err(SyncError::PayloadFormat(format!(
            "{} response is not an object (got {})",
            action.as_str(),
            json_type(&envelope)
        )));
    };
    if object.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(envelope);
    }
    let message = object
        .get("error")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} error", action.as_str()));
    Err(SyncError::Application {
        action: action.as_str().to_string(),
        message,
    })
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_ok() {
        let v = check_envelope(Action::List, json!({"ok": true, "rows": []})).unwrap();
        assert_eq!(v["rows"], json!([]));
    }

    #[test]
    fn envelope_failure_carries_message() {
        let err = check_envelope(
            Action::List,
            json!({"ok": false, "error": "Sheet not found: BOB"}),
        )
        .unwrap_err();
        match err {
            SyncError::Application { action, message } => {
                assert_eq!(action, "list");
                assert_eq!(message, "Sheet not found: BOB");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn envelope_without_ok_is_rejected() {
        let err = check_envelope(Action::Add, json!({"rows": []})).unwrap_err();
        assert!(
            matches!(err, SyncError::Application { ref message, .. } if message == "add error")
        );
        let err = check_envelope(Action::Add, json!({"ok": "true"})).unwrap_err();
        assert!(matches!(err, SyncError::Application { .. }));
        let err = check_envelope(Action::Reset, json!([1])).unwrap_err();
        assert!(matches!(err, SyncError::PayloadFormat(_)));
    }
}
