//! The request/response/event transport the connection manager drives.
//!
//! [`Transport`] is the seam between obstools and whatever actually talks to
//! the remote application. [`crate::websocket::WsTransport`] is the production
//! implementation; tests substitute an in-memory fake.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event subscription categories sent during the handshake
pub mod event_subscription {
    pub const NONE: u32 = 0;
    pub const GENERAL: u32 = 1 << 0;
    pub const CONFIG: u32 = 1 << 1;
    pub const SCENES: u32 = 1 << 2;
    pub const INPUTS: u32 = 1 << 3;
    pub const TRANSITIONS: u32 = 1 << 4;
    pub const FILTERS: u32 = 1 << 5;
    pub const OUTPUTS: u32 = 1 << 6;
    pub const SCENE_ITEMS: u32 = 1 << 7;
    pub const MEDIA_INPUTS: u32 = 1 << 8;
    pub const VENDORS: u32 = 1 << 9;
    pub const UI: u32 = 1 << 10;
    /// Every low-volume category
    pub const ALL: u32 = GENERAL
        | CONFIG
        | SCENES
        | INPUTS
        | TRANSITIONS
        | FILTERS
        | OUTPUTS
        | SCENE_ITEMS
        | MEDIA_INPUTS
        | VENDORS
        | UI;
}

/// Parameters sent when identifying with the remote application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentificationParams {
    /// RPC version to negotiate
    pub rpc_version: u32,

    /// Bitmask of [`event_subscription`] categories; the server default applies when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_subscriptions: Option<u32>,
}

impl Default for IdentificationParams {
    fn default() -> Self {
        Self {
            rpc_version: 1,
            event_subscriptions: None,
        }
    }
}

/// One entry of a batched request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub request_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

impl BatchRequest {
    /// Create a batch entry with request data
    pub fn new(request_type: impl Into<String>, request_data: Value) -> Self {
        Self {
            request_type: request_type.into(),
            request_data: Some(request_data),
        }
    }
}

/// Outcome of a single request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RequestStatus {
    /// Convert a failed status into an error
    pub fn to_error(&self) -> Error {
        Error::Request {
            code: self.code,
            comment: self.comment.clone(),
        }
    }
}

/// Response to a single request, as delivered inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    #[serde(default)]
    pub request_type: String,
    pub request_status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// Whether the request succeeded
    pub fn is_ok(&self) -> bool {
        self.request_status.result
    }

    /// The response data, or the request error
    pub fn into_result(self) -> Result<Value> {
        if !self.request_status.result {
            return Err(self.request_status.to_error());
        }
        Ok(self.response_data.unwrap_or(Value::Null))
    }

    /// Deserialize the response data of a successful request
    pub fn data<T: DeserializeOwned>(&self) -> Option<T> {
        if !self.is_ok() {
            return None;
        }
        let data = self.response_data.clone()?;
        serde_json::from_value(data).ok()
    }
}

/// An unsolicited event pushed by the remote application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsEvent {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: Option<u32>,
    #[serde(default)]
    pub event_data: Value,
}

/// Notifications delivered by a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection was closed by either side
    ConnectionClosed,

    /// The transport hit an error; the connection may or may not survive it
    ConnectionError(Arc<Error>),

    /// An event from the remote application
    Event(ObsEvent),
}

/// Request/response/event client for the remote application
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection and complete the handshake
    async fn connect(
        &self,
        address: &str,
        password: Option<&str>,
        params: &IdentificationParams,
    ) -> Result<()>;

    /// Issue a single request and wait for its response data
    async fn call(&self, request_type: &str, request_data: Option<Value>) -> Result<Value>;

    /// Issue several requests at once; responses come back in request order
    async fn call_batch(&self, requests: Vec<BatchRequest>) -> Result<Vec<RequestResponse>>;

    /// Subscribe to connection notifications and remote events
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

impl dyn Transport {
    /// Issue a request and deserialize its response data
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> Result<T> {
        let data = self.call(request_type, request_data).await?;
        serde_json::from_value(data).map_err(|e| {
            Error::Deserialize(format!("Invalid {} response: {}", request_type, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_response_into_result() {
        let ok: RequestResponse = serde_json::from_value(json!({
            "requestType": "GetVersion",
            "requestStatus": {"result": true, "code": 100},
            "responseData": {"obsVersion": "30.0.0"}
        }))
        .unwrap();
        assert_eq!(ok.into_result().unwrap()["obsVersion"], "30.0.0");

        let failed: RequestResponse = serde_json::from_value(json!({
            "requestType": "GetVersion",
            "requestStatus": {"result": false, "code": 207, "comment": "not ready"}
        }))
        .unwrap();
        assert!(failed.data::<Value>().is_none());
        assert!(failed.into_result().unwrap_err().is_not_ready());
    }

    #[test]
    fn test_identification_params_serialization() {
        let params = IdentificationParams::default();
        assert_eq!(serde_json::to_value(&params).unwrap(), json!({"rpcVersion": 1}));

        let params = IdentificationParams {
            rpc_version: 1,
            event_subscriptions: Some(event_subscription::SCENE_ITEMS),
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"rpcVersion": 1, "eventSubscriptions": 128})
        );
    }
}
