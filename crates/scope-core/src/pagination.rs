//! Page/limit/skip normalization shared by every list endpoint.
//!
//! Pages are 1-indexed: page `p` with limit `l` skips `(p - 1) * l` items.
//! [`PageQuery`] parses raw query-string values and falls back to the first
//! page and [`DEFAULT_LIMIT`] for anything missing, non-positive, or
//! unparsable.

use serde::{Deserialize, Serialize};

/// Limit substituted when the caller supplies none.
pub const DEFAULT_LIMIT: u64 = 10;

/// Largest limit a single request may ask for.
pub const MAX_LIMIT: u64 = 100;

/// A normalized `(skip, limit)` window over an ordered collection.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    skip: u64,
    limit: u64,
}

impl Pagination {
    /// Pagination for a 1-indexed `page` of `limit` items.
    ///
    /// A page of 0 is treated as the first page and a limit of 0 as
    /// [`DEFAULT_LIMIT`].
    pub fn new(page: u64, limit: u64) -> Self {
        let limit = Self::sanitize_limit(limit);
        let page = page.max(1);
        Self {
            skip: (page - 1).saturating_mul(limit),
            limit,
        }
    }

    /// Pagination from an explicit skip count.
    pub fn from_skip(skip: u64, limit: u64) -> Self {
        Self {
            skip,
            limit: Self::sanitize_limit(limit),
        }
    }

    /// Number of leading items to skip.
    pub fn skip(&self) -> u64 {
        self.skip
    }

    /// Maximum number of items in the page.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Exclusive end offset, `skip + limit`.
    pub fn end(&self) -> u64 {
        self.skip.saturating_add(self.limit)
    }

    /// The page of `items` selected by this pagination, bounds clamped to
    /// `[0, len]`. An out-of-range skip yields an empty page.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let len = items.len();
        let start = usize::try_from(self.skip).unwrap_or(usize::MAX).min(len);
        let end = usize::try_from(self.end()).unwrap_or(usize::MAX).min(len);
        &items[start..end]
    }

    fn sanitize_limit(limit: u64) -> u64 {
        if limit == 0 {
            DEFAULT_LIMIT
        } else {
            limit.min(MAX_LIMIT)
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_LIMIT)
    }
}

/// Raw `?page=&limit=` query values as received over HTTP.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    /// Normalized `(pagination, page, limit)`; `page` and `limit` are echoed
    /// back in list responses.
    pub fn resolve(&self) -> (Pagination, u64, u64) {
        let page = parse_positive(self.page.as_deref()).unwrap_or(1);
        let limit = parse_positive(self.limit.as_deref()).unwrap_or(DEFAULT_LIMIT);
        let pagination = Pagination::new(page, limit);
        (pagination, page, pagination.limit())
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u64> {
    raw?.trim().parse::<i64>().ok().filter(|v| *v > 0).map(|v| v as u64)
}

/// A list response body: the page echoed back with the data and total.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PagingResponse<T> {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub data: Vec<T>,
}
