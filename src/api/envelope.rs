//! In-band status envelopes.
//!
//! The backend reports success inside the response body, and not the same
//! way everywhere: some endpoints send `status: true`, some `success: true`,
//! one sends `status: "true"`, and some send no flag at all. Each endpoint
//! declares its own [`Envelope`] and the check happens here, at the boundary,
//! so the rest of the crate only sees `ApiResult<T>`.

use serde_json::Value;

use super::error::{ApiError, ApiResult};

/// Literal type of the success flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// JSON boolean `true`.
    Bool,
    /// JSON string `"true"`.
    StringTrue,
}

/// Schema of one endpoint's in-band success flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    field: Option<&'static str>,
    kind: FlagKind,
    required: bool,
    failure_message: &'static str,
}

impl Envelope {
    /// No success flag; any parsed body counts as success.
    pub const UNFLAGGED: Envelope = Envelope {
        field: None,
        kind: FlagKind::Bool,
        required: false,
        failure_message: "The server reported a failure.",
    };

    /// Boolean flag under `field`.
    pub const fn boolean(field: &'static str) -> Self {
        Envelope {
            field: Some(field),
            kind: FlagKind::Bool,
            required: false,
            failure_message: Self::UNFLAGGED.failure_message,
        }
    }

    /// String flag under `field` that must equal `"true"`.
    pub const fn string_true(field: &'static str) -> Self {
        Envelope {
            field: Some(field),
            kind: FlagKind::StringTrue,
            required: false,
            failure_message: Self::UNFLAGGED.failure_message,
        }
    }

    /// A body without the flag is a failure.
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Message used when a failing body carries no `message` of its own.
    pub const fn failure_message(mut self, message: &'static str) -> Self {
        self.failure_message = message;
        self
    }

    pub fn field(&self) -> Option<&'static str> {
        self.field
    }

    /// Check the flag in `body`, returning the backend's message on failure.
    pub fn check(&self, body: &Value) -> ApiResult<()> {
        let Some(field) = self.field else {
            return Ok(());
        };

        let passed = match body.get(field) {
            None | Some(Value::Null) => !self.required,
            Some(flag) => match self.kind {
                FlagKind::Bool => flag.as_bool() == Some(true),
                FlagKind::StringTrue => flag.as_str() == Some("true"),
            },
        };

        if passed {
            Ok(())
        } else {
            Err(ApiError::application(
                message_of(body),
                self.failure_message,
            ))
        }
    }
}

/// Extract the backend's human-readable `message` field, if any.
pub fn message_of(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Extract `message` from raw bytes that may or may not be JSON.
pub fn message_of_bytes(bytes: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(bytes)
        .ok()
        .as_ref()
        .and_then(message_of)
}
