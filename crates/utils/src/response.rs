use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Machine-readable error payload carried in `error_data`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct ErrorData {
    pub code: String,
}

/// Uniform JSON envelope returned by every `/api` route.
#[derive(Debug, Serialize, Deserialize, TS)]
pub struct ApiResponse<T, E = T> {
    success: bool,
    data: Option<T>,
    error_data: Option<E>,
    message: Option<String>,
    /// Human-readable failure reason; only present on error responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T, E> ApiResponse<T, E> {
    /// Creates a successful response with data and no message.
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            message: None,
            error_data: None,
            error: None,
        }
    }

    /// Creates an error response with a message and no data.
    pub fn error(message: &str) -> Self {
        ApiResponse {
            success: false,
            data: None,
            message: Some(message.to_string()),
            error_data: None,
            error: Some(message.to_string()),
        }
    }

    /// Creates an error response carrying structured error data.
    pub fn error_with_data(message: &str, data: E) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error_data: Some(data),
            message: Some(message.to_string()),
            error: Some(message.to_string()),
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    pub fn error_data(&self) -> Option<&E> {
        self.error_data.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
