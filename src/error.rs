//! Error types for cassandra-cql.
//!
//! Errors are grouped by the stage that produced them. The pool uses
//! [`CqlError::is_application`] and [`CqlError::is_caller_error`] to decide
//! whether a failure says something about the node or about the query.

use std::time::Duration;

use thiserror::Error;

/// Binding a parameter into a query template failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    /// A null or missing argument for the placeholder at this position.
    #[error("null/undefined query parameter at position {0}")]
    NullArgument(usize),
}

/// Establishing a connection (dial + handshake) failed.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("login to {addr} timed out")]
    LoginTimeout { addr: String },

    #[error("learn (describe_keyspace) on {addr} timed out")]
    LearnTimeout { addr: String },

    #[error("use (set_keyspace) on {addr} timed out")]
    UseTimeout { addr: String },

    #[error("transport error on {addr}: {message}")]
    Transport { addr: String, message: String },

    /// The server raised NotFoundException while describing the keyspace.
    #[error("ColumnFamily or Keyspace does not exist: {keyspace} ({addr})")]
    KeyspaceNotFound { addr: String, keyspace: String },

    #[error("authentication failed on {addr}: {why}")]
    Authentication { addr: String, why: String },

    #[error("authorization failed on {addr}: {why}")]
    Authorization { addr: String, why: String },
}

impl ConnectError {
    /// Node did not answer in time or the link broke.
    ///
    /// Anything else points at configuration (bad keyspace, bad credentials)
    /// and would fail the same way on every node.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ConnectError::ConnectTimeout { .. }
                | ConnectError::LoginTimeout { .. }
                | ConnectError::LearnTimeout { .. }
                | ConnectError::UseTimeout { .. }
                | ConnectError::Transport { .. }
        )
    }
}

/// Executing a query on an established connection failed.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("No results")]
    NoResult,

    #[error("unexpected result type {0}")]
    UnexpectedResultType(i32),

    #[error("connection is not open")]
    NotConnected,
}

/// Server-reported errors about the query itself. Never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplicationException {
    #[error("InvalidRequestException: {0}")]
    InvalidRequest(String),

    #[error("TimedOutException")]
    Timeout,

    #[error("UnavailableException")]
    Unavailable,

    #[error("SchemaDisagreementException")]
    SchemaDisagreement,
}

/// Pool-level failures.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("All connections are unhealthy.")]
    AllUnhealthy,

    #[error("timed out acquiring a connection after {0:?}")]
    AcquireTimeout(Duration),

    #[error("query failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        last: Box<CqlError>,
    },

    #[error("pool is shut down")]
    Closed,

    #[error("no usable hosts configured")]
    NoHosts,
}

/// The main error type for cassandra-cql.
#[derive(Debug, Error)]
pub enum CqlError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Application(#[from] ApplicationException),

    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Link-level failure while a query was in flight.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed Thrift frame or unexpected message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Column bytes did not match their validator.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The statement text could not be understood.
    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CqlError {
    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Server-side exception about the query (invalid, timed out, unavailable,
    /// schema disagreement).
    pub fn is_application(&self) -> bool {
        matches!(self, CqlError::Application(_))
    }

    /// The query or configuration is at fault, whichever node runs it.
    pub fn is_caller_error(&self) -> bool {
        match self {
            CqlError::Bind(_)
            | CqlError::Statement(_)
            | CqlError::Decode(_)
            | CqlError::Config(_) => true,
            CqlError::Connect(e) => !e.is_unreachable(),
            _ => false,
        }
    }

    /// Errors the pool retries against another node.
    pub fn is_retryable(&self) -> bool {
        !self.is_application() && !self.is_caller_error() && !matches!(self, CqlError::Pool(_))
    }
}

/// Result type alias for cassandra-cql operations.
pub type CqlResult<T> = Result<T, CqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CqlError::from(BindError::NullArgument(2));
        assert_eq!(err.to_string(), "null/undefined query parameter at position 2");

        let err = CqlError::from(PoolError::AllUnhealthy);
        assert_eq!(err.to_string(), "All connections are unhealthy.");
    }

    #[test]
    fn test_retry_classification() {
        assert!(!CqlError::from(ApplicationException::Unavailable).is_retryable());
        assert!(!CqlError::from(BindError::NullArgument(0)).is_retryable());
        assert!(CqlError::Transport("broken pipe".into()).is_retryable());
        assert!(CqlError::from(ExecError::QueryTimeout(Duration::from_millis(5))).is_retryable());

        let unreachable = ConnectError::ConnectTimeout {
            addr: "a:9160".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(CqlError::from(unreachable).is_retryable());

        let missing = ConnectError::KeyspaceNotFound {
            addr: "a:9160".into(),
            keyspace: "ks".into(),
        };
        assert!(CqlError::from(missing).is_caller_error());
    }
}
