// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use alloc::collections::BTreeMap;
use core::num::NonZeroU32;
use core::time::Duration;

use serde::Deserialize;

use crate::utils::limits::ExecutionTimerConfig;

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("invalid type analysis options: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),
    #[error("timer_check_interval must be at least 1")]
    ZeroCheckInterval,
}

/// Bounds and switches for one search session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypeAnalysisOptions {
    /// Maximum nesting of expression resolutions.
    pub max_depth: u32,
    /// Expressions resolved per session before every further resolve
    /// returns empty.
    pub max_total_expressions: u64,
    pub timeout_seconds: Option<f64>,
    /// Whether abstract method calls bind the call-site arguments when
    /// resolving overriding implementations.
    pub pass_args_to_implementations: bool,
    /// Nesting allowed for backward inference from usages.
    pub usage_depth: u32,
    /// Resolves between clock reads when a timeout is set.
    pub timer_check_interval: u32,
    pub brief_max_len: usize,
    /// Columns of each table, used for `SELECT *`.
    pub table_columns: BTreeMap<String, Vec<String>>,
}

impl Default for TypeAnalysisOptions {
    fn default() -> Self {
        Self::explicit()
    }
}

impl TypeAnalysisOptions {
    /// Options for completion popping up while typing.
    pub fn auto_popup() -> Self {
        Self {
            max_depth: 25,
            ..Self::explicit()
        }
    }

    /// Options for completion requested explicitly by the user.
    pub fn explicit() -> Self {
        Self {
            max_depth: 40,
            max_total_expressions: 10_000,
            timeout_seconds: None,
            pass_args_to_implementations: true,
            usage_depth: 5,
            timer_check_interval: 64,
            brief_max_len: 50,
            table_columns: BTreeMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if let Some(timeout) = self.timeout_seconds {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(OptionsError::InvalidTimeout(timeout));
            }
        }
        if self.timer_check_interval == 0 {
            return Err(OptionsError::ZeroCheckInterval);
        }
        Ok(())
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn timer_config(&self) -> Option<ExecutionTimerConfig> {
        let seconds = self.timeout_seconds.filter(|s| s.is_finite() && *s > 0.0)?;
        Some(ExecutionTimerConfig {
            limit: Duration::from_secs_f64(seconds),
            check_interval: NonZeroU32::new(self.timer_check_interval).unwrap_or(NonZeroU32::MIN),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_in_depth_only() {
        let auto = TypeAnalysisOptions::auto_popup();
        let explicit = TypeAnalysisOptions::explicit();
        assert_eq!(auto.max_depth, 25);
        assert_eq!(explicit.max_depth, 40);
        assert_eq!(auto.max_total_expressions, explicit.max_total_expressions);
        assert_eq!(TypeAnalysisOptions::default(), explicit);
    }

    #[test]
    fn json_fills_defaults() -> anyhow::Result<()> {
        let options = TypeAnalysisOptions::from_json(r#"{ "max_depth": 3, "timeout_seconds": 0.5 }"#)?;
        assert_eq!(options.max_depth, 3);
        assert_eq!(options.usage_depth, 5);
        let timer = options.timer_config();
        assert_eq!(timer.map(|t| t.limit), Some(Duration::from_millis(500)));
        Ok(())
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            TypeAnalysisOptions::from_json(r#"{ "timeout_seconds": -1 }"#),
            Err(OptionsError::InvalidTimeout(_))
        ));
        assert!(matches!(
            TypeAnalysisOptions::from_json(r#"{ "timer_check_interval": 0 }"#),
            Err(OptionsError::ZeroCheckInterval)
        ));
        assert!(matches!(
            TypeAnalysisOptions::from_json(r#"{ "depth": 1 }"#),
            Err(OptionsError::Parse(_))
        ));
        assert_eq!(TypeAnalysisOptions::explicit().timer_config(), None);
    }
}
