//! Driver call protocol.
//!
//! Every invocation prints exactly one JSON object to stdout:
//!
//! ```json
//! {"status": "Success", "message": "", "capabilities": {"attach": false}}
//! ```
//!
//! `capabilities` is only present in the `init` reply.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result category of a driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Failure,
    #[serde(rename = "Not supported")]
    NotSupported,
}

/// Reply written to stdout for one driver call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverStatus {
    pub status: Status,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Map<String, Value>>,
}

impl DriverStatus {
    fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            capabilities: None,
        }
    }

    pub fn success() -> Self {
        Self::new(Status::Success, "")
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(Status::Failure, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(Status::NotSupported, message)
    }

    /// Reply to `init`: success without attach support.
    pub fn init() -> Self {
        let mut capabilities = Map::new();
        capabilities.insert("attach".to_string(), Value::Bool(false));
        Self {
            capabilities: Some(capabilities),
            ..Self::success()
        }
    }

    /// Process exit code for this reply.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            Status::Failure => 1,
            Status::Success | Status::NotSupported => 0,
        }
    }
}
