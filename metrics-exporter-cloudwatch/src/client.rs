use std::{error::Error as StdError, fmt, future::Future, pin::Pin};

use thiserror::Error;

use crate::datum::Datum;

/// Machine-readable error code returned by the remote ingestion API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// The caller is being throttled.
    Throttled,

    /// The service failed internally while handling the request.
    InternalServiceFault,

    /// Any other error code.
    Other(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Throttled => f.write_str("LimitExceeded"),
            ErrorCode::InternalServiceFault => f.write_str("InternalServiceError"),
            ErrorCode::Other(code) => f.write_str(code),
        }
    }
}

/// Errors that could occur while putting a batch of datums.
#[derive(Debug, Error)]
pub enum PutError {
    /// The remote ingestion API rejected the request with a structured error.
    #[error("{code}: {message}")]
    Service {
        /// Error code.
        code: ErrorCode,

        /// Human-readable error message.
        message: String,
    },

    /// The request failed in a way that could not be interpreted, such as a transport failure.
    #[error("unclassified failure: {0}")]
    Unclassified(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl PutError {
    /// Creates a service error with the given code and message.
    pub fn service<M>(code: ErrorCode, message: M) -> Self
    where
        M: Into<String>,
    {
        PutError::Service { code, message: message.into() }
    }

    /// Creates an unclassified error wrapping the given source error.
    pub fn unclassified<E>(source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        PutError::Unclassified(source.into())
    }

    /// Returns the service error code, if the error carried one.
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            PutError::Service { code, .. } => Some(code),
            PutError::Unclassified(_) => None,
        }
    }
}

/// Convenience type for the future returned by [`MetricsClient::put_batch`].
pub type PutFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PutError>> + Send + 'a>>;

/// A client for the remote ingestion API.
///
/// Implementations send a single request carrying the given datums, without retrying: retries and backoff are handled
/// by the publisher.
pub trait MetricsClient: Send + Sync + 'static {
    /// Puts a batch of datums into the given namespace.
    fn put_batch<'a>(&'a self, namespace: &'a str, datums: &'a [Datum]) -> PutFuture<'a>;
}
