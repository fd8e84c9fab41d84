//! Wire envelopes carried over the transport.
//!
//! Commands are `{id, guid, method, params, metadata}`, events from the
//! server are `{guid, method, params}`, and responses are `{id, result}` or
//! `{id, error}`. Responses and events are distinguished by the presence of
//! the `id` field, so [`Message`] is an untagged union with a
//! forward-compatible catch-all arm.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Serde helpers for `Arc<str>` fields.
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    Ok(Arc::from(s.as_str()))
}

/// Command message sent by a client to a dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for correlating responses.
    pub id: u32,
    /// GUID of the target dispatcher (format: "type@hash").
    #[serde(
        serialize_with = "serialize_arc_str",
        deserialize_with = "deserialize_arc_str"
    )]
    pub guid: Arc<str>,
    /// Method name to invoke.
    pub method: String,
    /// Method parameters as a JSON object.
    pub params: Value,
    /// Optional caller-supplied metadata (timing, source location).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

/// Response message for a completed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this response correlates to.
    pub id: u32,
    /// Success result (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error result (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorWrapper>,
}

impl Response {
    pub fn ok(id: u32, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u32, error: ErrorPayload) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorWrapper { error }),
        }
    }
}

/// Wrapper for the error payload, matching the wire nesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
    pub error: ErrorPayload,
}

/// Structured error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error message.
    pub message: String,
    /// Error kind name (e.g., "UnknownObject", "ValidationError").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Stack trace, if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorPayload {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: Some(name.into()),
            stack: None,
        }
    }
}

/// Event message pushed from a dispatcher to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// GUID of the dispatcher that emitted the event.
    #[serde(
        serialize_with = "serialize_arc_str",
        deserialize_with = "deserialize_arc_str"
    )]
    pub guid: Arc<str>,
    /// Event method name.
    pub method: String,
    /// Event parameters as a JSON object.
    pub params: Value,
}

/// Discriminated union of inbound protocol messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// Command message (has `id` and `method`).
    Request(Request),
    /// Response message (has `id` only).
    Response(Response),
    /// Event message (no `id`).
    Event(Event),
    /// Unknown message type (forward-compatible catch-all).
    Unknown(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let request = Request {
            id: 7,
            guid: Arc::from("page@abc123"),
            method: "click".to_string(),
            params: serde_json::json!({"selector": "#submit"}),
            metadata: Value::Null,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["guid"], "page@abc123");
        assert!(json.get("metadata").is_none());

        let back: Request = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, 7);
        assert_eq!(back.guid.as_ref(), "page@abc123");
        assert_eq!(back.params["selector"], "#submit");
    }

    #[test]
    fn message_distinguishes_request_response_event() {
        let req: Message = serde_json::from_str(
            r#"{"id": 1, "guid": "page@a", "method": "click", "params": {}}"#,
        )
        .unwrap();
        assert!(matches!(req, Message::Request(_)));

        let resp: Message = serde_json::from_str(r#"{"id": 1, "result": {}}"#).unwrap();
        assert!(matches!(resp, Message::Response(_)));

        let event: Message =
            serde_json::from_str(r#"{"guid": "page@a", "method": "close", "params": {}}"#).unwrap();
        assert!(matches!(event, Message::Event(_)));
    }

    #[test]
    fn error_response_shape() {
        let response = Response::err(3, ErrorPayload::new("UnknownObject", "no such guid"));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["error"]["name"], "UnknownObject");
        assert!(json.get("result").is_none());
    }
}
