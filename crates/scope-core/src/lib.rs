//! # scope-core
//! Foundation types, errors, pagination, and tier traits for the Scope explorer.

pub mod error;
pub mod pagination;
pub mod traits;
pub mod types;

pub use error::{CacheError, DatabaseError, RpcError, ScopeError};
pub use pagination::{PageQuery, Pagination, PagingResponse};
pub use traits::{BlockStore, NodeClient};
pub use types::{Block, DecodedCall, Log, Receipt, Transaction, Validator};
