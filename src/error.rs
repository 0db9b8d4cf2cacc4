//! Error types for the SOAP gateway.

use serde_json::{json, Value};
use thiserror::Error;

use crate::transport::TransportError;

/// Generic internal-error status used when no better mapping exists.
pub const INTERNAL_ERROR_STATUS: u16 = 500;

/// SOAP gateway errors.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected SOAP Service Exception:\n{0}")]
    TransportConstruction(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Function '{0}' does not exist on this service.")]
    OperationNotFound(String),

    #[error("{message} [Fault code:{fault_code}]")]
    RemoteFault {
        message: String,
        fault_code: String,
        status: u16,
    },

    #[error("SOAP call '{0}' timed out")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Schema cache error: {0}")]
    Cache(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Stable error codes exposed to REST callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Configuration,
    TransportConstruction,
    InvalidArgument,
    OperationNotFound,
    RemoteFault,
    Timeout,
    Transport,
    Internal,
}

impl ErrorCode {
    /// Get the string code for this error.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::TransportConstruction => "TRANSPORT_CONSTRUCTION_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::OperationNotFound => "OPERATION_NOT_FOUND",
            Self::RemoteFault => "REMOTE_FAULT",
            Self::Timeout => "TIMEOUT",
            Self::Transport => "TRANSPORT_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl GatewayError {
    /// Build a remote fault error, mapping the fault code to a status.
    pub fn remote_fault(message: impl Into<String>, fault_code: impl Into<String>) -> Self {
        let fault_code = fault_code.into();
        let status = fault_status(&fault_code);
        Self::RemoteFault {
            message: message.into(),
            fault_code,
            status,
        }
    }

    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::Configuration,
            Self::TransportConstruction(_) => ErrorCode::TransportConstruction,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::OperationNotFound(_) => ErrorCode::OperationNotFound,
            Self::RemoteFault { .. } => ErrorCode::RemoteFault,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Transport(_) => ErrorCode::Transport,
            Self::Cache(_) | Self::Xml(_) | Self::Io(_) | Self::Json(_) | Self::Yaml(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// HTTP-equivalent status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::OperationNotFound(_) => 404,
            Self::RemoteFault { status, .. } => *status,
            Self::Timeout(_) => 504,
            Self::Transport(_) => 502,
            _ => INTERNAL_ERROR_STATUS,
        }
    }

    /// JSON error body for the REST layer.
    pub fn to_body(&self) -> Value {
        let mut error = json!({
            "code": self.code().as_str(),
            "message": self.to_string(),
            "status": self.status_code(),
        });
        if let Self::RemoteFault { fault_code, .. } = self {
            error["fault_code"] = Value::String(fault_code.clone());
        }
        json!({ "error": error })
    }
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Fault(fault) => Self::remote_fault(fault.message, fault.code),
            TransportError::Timeout(operation) => Self::Timeout(operation),
            TransportError::Connection(message) => Self::Transport(message),
            TransportError::Load(message) => Self::TransportConstruction(message),
        }
    }
}

/// Map a fault code to an HTTP-equivalent status.
///
/// Only purely numeric codes without a `.` separator are used verbatim.
pub fn fault_status(fault_code: &str) -> u16 {
    let code = fault_code.trim();
    if code.is_empty() || code.contains('.') || !code.bytes().all(|b| b.is_ascii_digit()) {
        return INTERNAL_ERROR_STATUS;
    }
    code.parse().unwrap_or(INTERNAL_ERROR_STATUS)
}
