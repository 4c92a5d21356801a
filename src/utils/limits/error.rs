// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use core::time::Duration;

/// Errors reported when a search session runs out of time or expression budget.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum LimitError {
    /// Reported when the execution timer observes elapsed time beyond the configured limit.
    TimeLimitExceeded {
        /// Elapsed duration when the threshold was exceeded.
        elapsed: Duration,
        /// Configured time limit.
        limit: Duration,
    },
    /// Reported when a session has resolved as many expressions as it is allowed to.
    ExpressionLimitExceeded {
        /// Expressions resolved so far.
        resolved: u64,
        /// Configured ceiling.
        limit: u64,
    },
}

impl fmt::Debug for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeLimitExceeded { elapsed, limit } => f
                .debug_struct("TimeLimitExceeded")
                .field("elapsed", elapsed)
                .field("limit", limit)
                .finish(),
            Self::ExpressionLimitExceeded { resolved, limit } => f
                .debug_struct("ExpressionLimitExceeded")
                .field("resolved", resolved)
                .field("limit", limit)
                .finish(),
        }
    }
}

impl fmt::Display for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeLimitExceeded { elapsed, limit } => {
                write!(
                    f,
                    "resolution exceeded time limit (elapsed={}ms, limit={}ms)",
                    elapsed.as_millis(),
                    limit.as_millis()
                )
            }
            Self::ExpressionLimitExceeded { resolved, limit } => {
                write!(
                    f,
                    "resolution exceeded expression limit (resolved={resolved}, limit={limit})"
                )
            }
        }
    }
}

impl core::error::Error for LimitError {}
