//! Error types for the Scope explorer.
use thiserror::Error;

/// Failures of the in-memory block window and its queues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("not found: {0}")] NotFound(String),
    #[error("empty: {0}")] Empty(&'static str),
    #[error("index conflict: {0}")] Index(String),
    #[error("store: {0}")] Store(String),
    #[error("range out of bounds: skip {skip} + limit {limit} exceeds {available}")] OutOfRange { skip: u64, limit: u64, available: u64 },
}

/// Failures of the durable database tier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("not found: {0}")] NotFound(String),
    #[error("storage: {0}")] Storage(String),
    #[error("serialization: {0}")] Serialization(String),
}

/// Failures of the live node RPC tier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("transport: {0}")] Transport(String),
    #[error("node error {code}: {message}")] Node { code: i64, message: String },
    #[error("not found: {0}")] NotFound(String),
    #[error("decode: {0}")] Decode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error(transparent)] Cache(#[from] CacheError),
    #[error(transparent)] Database(#[from] DatabaseError),
    #[error(transparent)] Rpc(#[from] RpcError),
    #[error("{0} timed out")] Timeout(&'static str),
    #[error("request cancelled")] Cancelled,
    #[error("invalid input: {0}")] InvalidInput(String),
}

impl ScopeError {
    /// Whether the error means "no such record" rather than a malfunction.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ScopeError::Cache(CacheError::NotFound(_) | CacheError::Empty(_))
                | ScopeError::Database(DatabaseError::NotFound(_))
                | ScopeError::Rpc(RpcError::NotFound(_))
        )
    }

    /// Whether the error was caused by the caller's request.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            ScopeError::InvalidInput(_) | ScopeError::Cache(CacheError::OutOfRange { .. })
        )
    }
}
