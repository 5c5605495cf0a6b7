//! Ordered tier lookup: window → database → node RPC.
//!
//! A read is expressed as a list of [`Tier`]s, each wrapping a lazy lookup.
//! [`FallbackPath::resolve`] runs them in order and returns the first hit.
//! Misses and failures are logged and skipped; when every tier comes up
//! empty the last tier's error is returned. Nothing found in a later tier is
//! written back into an earlier one.
//!
//! Remote tiers run under the path's deadline and cancellation token. A tier
//! that overruns the deadline counts as failed and the next tier is tried;
//! cancellation aborts the whole lookup.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scope_core::error::{CacheError, ScopeError};

type Lookup<'a, T> = Pin<Box<dyn Future<Output = Result<T, ScopeError>> + Send + 'a>>;

/// Result of a single tier lookup.
#[derive(Debug)]
pub enum TierOutcome<T> {
    /// The tier answered.
    Hit(T),
    /// The tier does not hold the record.
    Miss(ScopeError),
    /// The tier malfunctioned, timed out, or rejected the request.
    Failed(ScopeError),
}

impl<T> TierOutcome<T> {
    /// Classify a raw lookup result.
    pub fn classify(result: Result<T, ScopeError>) -> Self {
        match result {
            Ok(value) => TierOutcome::Hit(value),
            Err(e) if e.is_not_found() || matches!(e, ScopeError::Cache(CacheError::OutOfRange { .. })) => {
                TierOutcome::Miss(e)
            }
            Err(e) => TierOutcome::Failed(e),
        }
    }
}

/// One step of a fallback lookup.
pub struct Tier<'a, T> {
    name: &'static str,
    bounded: bool,
    lookup: Lookup<'a, T>,
}

impl<'a, T> Tier<'a, T> {
    /// An in-memory tier. Runs without a deadline.
    pub fn local<F>(name: &'static str, lookup: F) -> Self
    where
        F: Future<Output = Result<T, ScopeError>> + Send + 'a,
    {
        Self {
            name,
            bounded: false,
            lookup: Box::pin(lookup),
        }
    }

    /// A database or RPC tier. Runs under the path's deadline and
    /// cancellation token.
    pub fn remote<F>(name: &'static str, lookup: F) -> Self
    where
        F: Future<Output = Result<T, ScopeError>> + Send + 'a,
    {
        Self {
            name,
            bounded: true,
            lookup: Box::pin(lookup),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Deadline and cancellation shared by every remote tier of a lookup.
#[derive(Clone, Debug)]
pub struct FallbackPath {
    deadline: Duration,
    cancel: CancellationToken,
}

impl FallbackPath {
    pub fn new(deadline: Duration, cancel: CancellationToken) -> Self {
        Self { deadline, cancel }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run a single tier to an outcome.
    pub async fn attempt<T>(&self, tier: Tier<'_, T>) -> TierOutcome<T> {
        if !tier.bounded {
            return TierOutcome::classify(tier.lookup.await);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => TierOutcome::Failed(ScopeError::Cancelled),
            result = tokio::time::timeout(self.deadline, tier.lookup) => match result {
                Ok(result) => TierOutcome::classify(result),
                Err(_) => TierOutcome::Failed(ScopeError::Timeout(tier.name)),
            },
        }
    }

    /// Return the first hit among `tiers`, in order.
    pub async fn resolve<T>(&self, op: &'static str, tiers: Vec<Tier<'_, T>>) -> Result<T, ScopeError> {
        let mut last = ScopeError::Cache(CacheError::NotFound(format!("{op}: no tier configured")));
        for tier in tiers {
            let name = tier.name;
            match self.attempt(tier).await {
                TierOutcome::Hit(value) => {
                    debug!(op, tier = name, "tier hit");
                    return Ok(value);
                }
                TierOutcome::Miss(e) => {
                    debug!(op, tier = name, error = %e, "tier miss");
                    last = e;
                }
                TierOutcome::Failed(ScopeError::Cancelled) => {
                    debug!(op, tier = name, "lookup cancelled");
                    return Err(ScopeError::Cancelled);
                }
                TierOutcome::Failed(e) => {
                    warn!(op, tier = name, error = %e, "tier failed");
                    last = e;
                }
            }
        }
        Err(last)
    }
}
