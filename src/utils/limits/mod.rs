// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Helpers for cooperative time and expression budget limits.

mod error;
mod time;

pub use error::LimitError;
pub use time::{
    clear_time_source, monotonic_now, set_time_source, ExecutionTimer, ExecutionTimerConfig,
    TimeSource, TimeSourceRegistrationError,
};

#[cfg(test)]
pub use time::acquire_limits_test_lock;
