use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Internal,
}

/// Error body the platform may attach to a failed HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default = "ApiError::default_code")]
    pub code: ErrorCode,
    #[serde(default, alias = "error")]
    pub message: String,
}

impl ApiError {
    fn default_code() -> ErrorCode {
        ErrorCode::Internal
    }
}
