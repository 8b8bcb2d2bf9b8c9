use serde::{Deserialize, Serialize};

/// Outcome of a mutating call, local or remote: `{success, data?, message?}`.
///
/// `retryable` lets the server say whether a failure is worth retrying.
/// When it is absent a failure is treated as retryable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl<T> ActionResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            retryable: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            retryable: None,
        }
    }

    /// A failure that may succeed if tried again later.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            retryable: None,
        }
    }

    /// A failure that will never succeed (validation, duplicate key, missing record).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            retryable: Some(false),
        }
    }

    pub fn is_permanent_failure(&self) -> bool {
        !self.success && self.retryable == Some(false)
    }

    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message.as_deref().unwrap_or(fallback)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ActionResult<U> {
        ActionResult {
            success: self.success,
            data: self.data.map(f),
            message: self.message,
            retryable: self.retryable,
        }
    }
}

impl<T: Serialize> ActionResult<T> {
    /// Erases the payload type, for callers that handle every action uniformly.
    pub fn into_json(self) -> serde_json::Result<ActionResult<serde_json::Value>> {
        let ActionResult {
            success,
            data,
            message,
            retryable,
        } = self;
        Ok(ActionResult {
            success,
            data: data.map(serde_json::to_value).transpose()?,
            message,
            retryable,
        })
    }
}
