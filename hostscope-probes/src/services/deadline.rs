//! Deadline race shared by every probe.
//!
//! The operation future is owned by the race: when the deadline wins, the
//! future is dropped on the spot, which closes any socket or pending DNS
//! exchange it holds. When the operation wins, the timer is dropped instead.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, timeout, timeout_at};

use crate::error::{HostscopeResult, ProbeError};

/// Run `operation` with a time budget.
pub async fn with_deadline<F, T>(budget: Duration, operation: F) -> HostscopeResult<T>
where
    F: Future<Output = T>,
{
    timeout(budget, operation)
        .await
        .map_err(|_| ProbeError::Timeout(format!("exceeded {} ms", budget.as_millis())))
}

/// [`with_deadline`] for fallible operations, flattening the two error layers.
pub async fn try_with_deadline<F, T>(budget: Duration, operation: F) -> HostscopeResult<T>
where
    F: Future<Output = HostscopeResult<T>>,
{
    with_deadline(budget, operation).await?
}

/// Run `operation` until an absolute `deadline`, for stages sharing one budget.
pub async fn with_deadline_at<F, T>(deadline: Instant, operation: F) -> HostscopeResult<T>
where
    F: Future<Output = T>,
{
    timeout_at(deadline, operation)
        .await
        .map_err(|_| ProbeError::Timeout("shared deadline elapsed".to_string()))
}

/// [`with_deadline_at`] for fallible operations.
pub async fn try_with_deadline_at<F, T>(deadline: Instant, operation: F) -> HostscopeResult<T>
where
    F: Future<Output = HostscopeResult<T>>,
{
    with_deadline_at(deadline, operation).await?
}
