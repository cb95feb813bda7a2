//! Operator-facing response envelope.
//!
//! Every operation answers with a `success` flag plus either its payload
//! fields or an `error` message. The HTTP-style status code travels alongside
//! but is not serialized.

use serde::{Deserialize, Serialize};

use crate::error::{PlaygroundError, Result};
use crate::reconcile::ResetPhase;

/// Response envelope for one operation.
///
/// The payload is flattened into the envelope, so `T` must serialize as a
/// map (a struct or `serde_json::Value::Object`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Payload fields on success.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error description on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    status: u16,
}

impl<T> ApiResponse<T> {
    /// A successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status: 200,
        }
    }

    /// A failed response carrying the error's status code.
    pub fn failure(error: &PlaygroundError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            status: error.status_code(),
        }
    }

    /// Wraps an operation result.
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(&e),
        }
    }

    /// HTTP-style status: 200, 4xx for client errors, 5xx for backend failures.
    pub fn status_code(&self) -> u16 {
        self.status
    }
}

/// Immediate answer to a reset request; the work continues in the background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetAck {
    /// Human-readable summary.
    pub message: String,
    /// The phases the reset will run, in order.
    pub actions: Vec<String>,
}

impl Default for ResetAck {
    fn default() -> Self {
        Self {
            message: "Reset initiated. Services will restart in the background.".to_string(),
            actions: ResetPhase::STEPS
                .iter()
                .map(|phase| phase.description().to_string())
                .collect(),
        }
    }
}
