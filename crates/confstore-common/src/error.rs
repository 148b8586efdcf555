//! Error types and error codes for confstore
//!
//! This module defines:
//! - `CommonError`: errors raised while building shared types
//! - `ErrorCode`: structured error codes handed to the boundary layer

use serde::{Deserialize, Serialize};

/// Errors raised by the shared model types
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("invalid tenant id '{0}'")]
    InvalidTenant(String),

    #[error("value is not valid base64: {0}")]
    InvalidBase64(String),
}

/// Error code structure for boundary responses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

pub const RESOURCE_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 20004,
    message: "resource not found",
};

pub const RESOURCE_CONFLICT: ErrorCode<'static> = ErrorCode {
    code: 20005,
    message: "resource conflict",
};

pub const TENANT_PARAM_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20001,
    message: "'tenant' parameter error",
};

pub const ILLEGAL_STATE: ErrorCode<'static> = ErrorCode {
    code: 23000,
    message: "illegal state",
};

pub const DATA_ACCESS_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "data access error",
};

pub const CONNECTION_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10003,
    message: "storage unavailable",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_error_display() {
        let err = CommonError::InvalidTenant("Bad Tenant".to_string());
        assert_eq!(format!("{}", err), "invalid tenant id 'Bad Tenant'");
    }

    #[test]
    fn test_error_code_constants() {
        assert_eq!(SUCCESS.code, 0);
        assert_eq!(PARAMETER_VALIDATE_ERROR.code, 20002);
        assert_eq!(RESOURCE_NOT_FOUND.message, "resource not found");
        assert_ne!(CONNECTION_ERROR.code, DATA_ACCESS_ERROR.code);
    }
}
