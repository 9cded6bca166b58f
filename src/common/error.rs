//! Error types for graphpd

use crate::proto::ErrorType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Domain Errors ===
    /// Expected condition with an explicit code, e.g. "graph not found".
    #[error("{message} (code {code})")]
    Business { code: i32, message: String },

    /// Unexpected failure raised inside a handler.
    #[error("{message}")]
    Runtime { code: i32, message: String },

    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Metadata Errors ===
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Metadata corrupted: {0}")]
    MetadataCorrupted(String),

    // === Leadership Errors ===
    #[error("Leader unknown")]
    LeaderUnknown,

    // === Network Errors ===
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("No coordinator address configured")]
    NoAddress,

    #[error("Discovery call failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: String },

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn business(code: ErrorType, message: impl Into<String>) -> Self {
        Error::Business {
            code: code as i32,
            message: message.into(),
        }
    }

    /// Business error with a raw code, for codes outside [`ErrorType`].
    pub fn business_code(code: i32, message: impl Into<String>) -> Self {
        Error::Business {
            code,
            message: message.into(),
        }
    }

    pub fn runtime(code: ErrorType, message: impl Into<String>) -> Self {
        Error::Runtime {
            code: code as i32,
            message: message.into(),
        }
    }

    /// Numeric type carried in response headers.
    pub fn error_code(&self) -> i32 {
        match self {
            Error::Business { code, .. } | Error::Runtime { code, .. } => *code,
            Error::LeaderUnknown => ErrorType::NotLeader as i32,
            Error::RocksDb(_) | Error::MetadataCorrupted(_) => ErrorType::StoreError as i32,
            _ => ErrorType::Unknown as i32,
        }
    }

    /// Message carried in response headers, without the code suffix.
    pub fn header_message(&self) -> String {
        match self {
            Error::Business { message, .. } | Error::Runtime { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Convert to gRPC status for RPC responses
    pub fn to_grpc_status(&self) -> tonic::Status {
        use tonic::Code;
        match self {
            Error::Business { .. } => tonic::Status::new(Code::FailedPrecondition, self.to_string()),
            Error::LeaderUnknown => tonic::Status::new(Code::Unavailable, self.to_string()),
            Error::InvalidConfig(_) => tonic::Status::new(Code::InvalidArgument, self.to_string()),
            Error::Grpc(status) => status.clone(),
            _ => tonic::Status::new(Code::Internal, self.to_string()),
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::Business { code, .. }
                if *code == ErrorType::GraphNotFound as i32
                    || *code == ErrorType::PartitionNotFound as i32 =>
            {
                StatusCode::NOT_FOUND
            }
            Error::Business { .. } | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::LeaderUnknown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::MetadataCorrupted(e.to_string())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_code_reaches_header() {
        let err = Error::business_code(-1, "core count can not be null");
        assert_eq!(err.error_code(), -1);
        assert_eq!(err.header_message(), "core count can not be null");
    }

    #[test]
    fn test_store_errors_share_a_code() {
        let err = Error::MetadataCorrupted("bad record".into());
        assert_eq!(err.error_code(), ErrorType::StoreError as i32);
        assert_eq!(Error::Other("x".into()).error_code(), ErrorType::Unknown as i32);
    }

    #[test]
    fn test_grpc_status_mapping() {
        assert_eq!(Error::LeaderUnknown.to_grpc_status().code(), tonic::Code::Unavailable);
        assert_eq!(Error::LeaderUnknown.error_code(), ErrorType::NotLeader as i32);

        let relayed = Error::Grpc(tonic::Status::cancelled("Timeout expired"));
        assert_eq!(relayed.to_grpc_status().code(), tonic::Code::Cancelled);
    }
}
