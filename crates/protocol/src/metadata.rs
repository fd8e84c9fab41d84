//! Per-call metadata observed by instrumentation listeners.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::envelope::{deserialize_arc_str, serialize_arc_str};

/// Whether a call is user-visible or internal plumbing.
///
/// Internal calls (e.g., the recorder's synthetic "perform") bypass the
/// pause gate and are hidden from user-facing call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallType {
    Internal,
    User,
}

/// A point in page coordinates, used to highlight where an action landed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One frame of a caller stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Bookkeeping for one logical call through the dispatcher or recorder.
///
/// Created at call start, completed exactly once at call end. The session
/// keeps in-flight entries in a map keyed by `id`; successful entries are
/// dropped on completion, failed ones retained for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    /// Unique call token, allocated by the session.
    pub id: u64,
    /// GUID of the object the call targets.
    #[serde(
        serialize_with = "serialize_arc_str",
        deserialize_with = "deserialize_arc_str"
    )]
    pub object_guid: Arc<str>,
    /// Method name.
    pub method: String,
    /// Validated parameters.
    pub params: Value,
    /// Unix timestamp in milliseconds at call start.
    pub wall_time: i64,
    /// Monotonic-ish start time in milliseconds (same clock as `end_time`).
    pub start_time: f64,
    /// Set once, at completion. Zero while in flight.
    pub end_time: f64,
    /// Internal or user-visible.
    #[serde(rename = "type")]
    pub call_type: CallType,
    /// Error message, set at completion on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Where the action landed, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<Point>,
    /// Caller stack, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<StackFrame>,
}

impl CallMetadata {
    pub fn new(id: u64, object_guid: Arc<str>, method: &str, params: Value) -> Self {
        Self {
            id,
            object_guid,
            method: method.to_string(),
            params,
            wall_time: unix_millis(),
            start_time: unix_millis() as f64,
            end_time: 0.0,
            call_type: CallType::User,
            error: None,
            point: None,
            stack: Vec::new(),
        }
    }

    pub fn internal(id: u64, object_guid: Arc<str>, method: &str, params: Value) -> Self {
        Self {
            call_type: CallType::Internal,
            ..Self::new(id, object_guid, method, params)
        }
    }

    /// Marks the call finished. Must be called exactly once.
    pub fn complete(&mut self, error: Option<String>) {
        debug_assert_eq!(self.end_time, 0.0, "call completed twice");
        self.end_time = unix_millis() as f64;
        self.error = error;
    }

    pub fn is_internal(&self) -> bool {
        self.call_type == CallType::Internal
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
