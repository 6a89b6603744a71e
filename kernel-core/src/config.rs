//! Typed kernel configuration.
//!
//! Replaces the free-form-dictionary pattern flagged in the design notes:
//! every tunable named anywhere in the specification is a required field
//! here. There are no silent defaults — `validate()` is the only thing
//! standing between a malformed file and a running kernel, and the CLI
//! treats a validation failure as a configuration error (exit code 1).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to a principal's compute bucket balance across a
/// checkpoint restart. Resolves the open question of whether a long
/// downtime should let an agent wake up with a full bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ComputeBucketRestartPolicy {
    /// Balance is reset to zero on restart (the kernel's default policy).
    ResetToZero,
    /// Balance resumes refilling from wherever it was at checkpoint time.
    ResumeFromCheckpoint,
}

/// Per-resource token-bucket calibration. A deployment concern, per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BucketCalibration {
    /// Units refilled per second.
    pub rate: f64,
    /// Maximum balance.
    pub capacity: f64,
}

/// Master configuration struct. All fields are required; there is no
/// `Default` impl on purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct KernelConfig {
    // Execution engine
    pub max_invocation_depth: u32,
    pub max_permission_depth: u32,
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub per_call_timeout: Duration,

    // Artifact store
    pub max_content_size_bytes: usize,
    pub max_code_size_bytes: usize,
    pub default_disk_quota_bytes: u64,
    pub tombstone_retention_count: u32,

    // Token buckets
    pub compute_bucket: BucketCalibration,
    pub external_api_bucket: BucketCalibration,
    pub compute_bucket_restart_policy: ComputeBucketRestartPolicy,

    // Contract evaluator
    pub contract_cache_ttl: Duration,

    // Agent loop supervisor
    pub crash_backoff_initial: Duration,
    pub crash_backoff_max: Duration,
    pub crash_backoff_multiplier: f64,
    pub quarantine_after_failures: u32,
    pub predicate_poll_interval: Duration,

    // Persistence
    pub state_dir: String,
}

impl KernelConfig {
    /// Validate cross-field and range constraints not expressible in the
    /// type system alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_invocation_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_invocation_depth".into(),
                value: self.max_invocation_depth.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        if self.max_permission_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_permission_depth".into(),
                value: self.max_permission_depth.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        if self.max_permission_depth >= self.max_invocation_depth {
            return Err(ConfigError::InvalidValue {
                field: "max_permission_depth".into(),
                value: self.max_permission_depth.to_string(),
                reason: "must be strictly smaller than max_invocation_depth".into(),
            });
        }
        if self.per_call_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "per_call_timeout".into(),
                value: format!("{:?}", self.per_call_timeout),
                reason: "must be positive".into(),
            });
        }
        if self.max_content_size_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_content_size_bytes".into(),
                value: self.max_content_size_bytes.to_string(),
                reason: "must be positive".into(),
            });
        }
        for (field, bucket) in [
            ("compute_bucket", &self.compute_bucket),
            ("external_api_bucket", &self.external_api_bucket),
        ] {
            if bucket.rate <= 0.0 || bucket.capacity <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    value: format!("{bucket:?}"),
                    reason: "rate and capacity must both be positive".into(),
                });
            }
        }
        if self.crash_backoff_multiplier <= 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "crash_backoff_multiplier".into(),
                value: self.crash_backoff_multiplier.to_string(),
                reason: "must be greater than 1.0".into(),
            });
        }
        if self.quarantine_after_failures == 0 {
            return Err(ConfigError::InvalidValue {
                field: "quarantine_after_failures".into(),
                value: self.quarantine_after_failures.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        if self.state_dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "state_dir".into(),
                value: self.state_dir.clone(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// A configuration suitable for unit/property tests: every field
    /// filled in, nothing left to chance, but not claimed to be a sane
    /// production default.
    pub fn for_tests() -> Self {
        Self {
            max_invocation_depth: 5,
            max_permission_depth: 3,
            per_call_timeout: Duration::from_secs(5),
            max_content_size_bytes: 64 * 1024,
            max_code_size_bytes: 16 * 1024,
            default_disk_quota_bytes: 1024 * 1024,
            tombstone_retention_count: 100,
            compute_bucket: BucketCalibration {
                rate: 10.0,
                capacity: 100.0,
            },
            external_api_bucket: BucketCalibration {
                rate: 5.0,
                capacity: 50.0,
            },
            compute_bucket_restart_policy: ComputeBucketRestartPolicy::ResetToZero,
            contract_cache_ttl: Duration::from_secs(30),
            crash_backoff_initial: Duration::from_millis(100),
            crash_backoff_max: Duration::from_secs(60),
            crash_backoff_multiplier: 2.0,
            quarantine_after_failures: 5,
            predicate_poll_interval: Duration::from_millis(250),
            state_dir: "./run".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_tests_config_is_valid() {
        KernelConfig::for_tests().validate().unwrap();
    }

    #[test]
    fn zero_invocation_depth_is_rejected() {
        let mut cfg = KernelConfig::for_tests();
        cfg.max_invocation_depth = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn permission_depth_must_be_smaller_than_invocation_depth() {
        let mut cfg = KernelConfig::for_tests();
        cfg.max_permission_depth = cfg.max_invocation_depth;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_positive_bucket_rate_is_rejected() {
        let mut cfg = KernelConfig::for_tests();
        cfg.compute_bucket.rate = 0.0;
        assert!(cfg.validate().is_err());
    }
}
