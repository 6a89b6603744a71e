//! TOML configuration for a kernel run.
//!
//! Every field kernel-core's [`kernel_core::KernelConfig`] and
//! kernel-supervisor's `SupervisorConfig` require is named here; there is
//! no `Default` impl, matching `KernelConfig`'s own stance that a
//! deployment's tunables are never silently assumed.

use kernel_core::{
    ArtifactId, BucketCalibration, ComputeBucketRestartPolicy, ConfigError, KernelConfig,
};
use kernel_supervisor::SupervisorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    pub run_dir: PathBuf,
    /// Hex/dashed UUID string of the principal allowed to `mint`/`burn`
    /// through `genesis.ledger`.
    pub oracle_principal: String,
    pub kernel: KernelConfigFile,
    pub supervisor: SupervisorConfigFile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KernelConfigFile {
    pub max_invocation_depth: u32,
    pub max_permission_depth: u32,
    pub per_call_timeout_ms: u64,
    pub max_content_size_bytes: usize,
    pub max_code_size_bytes: usize,
    pub default_disk_quota_bytes: u64,
    pub tombstone_retention_count: u32,
    pub compute_bucket_rate: f64,
    pub compute_bucket_capacity: f64,
    pub external_api_bucket_rate: f64,
    pub external_api_bucket_capacity: f64,
    /// `"reset_to_zero"` or `"resume_from_checkpoint"`.
    pub compute_bucket_restart_policy: String,
    pub contract_cache_ttl_ms: u64,
    pub crash_backoff_initial_ms: u64,
    pub crash_backoff_max_ms: u64,
    pub crash_backoff_multiplier: f64,
    pub quarantine_after_failures: u32,
    pub predicate_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfigFile {
    pub backoff_threshold: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub quarantine_threshold: u32,
    pub poll_interval_ms: u64,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: CliConfig = toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Ok(config)
    }

    pub fn oracle_principal(&self) -> Result<ArtifactId, ConfigError> {
        self.oracle_principal
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "oracle_principal".into(),
                value: self.oracle_principal.clone(),
                reason: "not a valid artifact id".into(),
            })
    }

    pub fn kernel_config(&self) -> Result<KernelConfig, ConfigError> {
        let k = &self.kernel;
        let restart_policy = match k.compute_bucket_restart_policy.as_str() {
            "reset_to_zero" => ComputeBucketRestartPolicy::ResetToZero,
            "resume_from_checkpoint" => ComputeBucketRestartPolicy::ResumeFromCheckpoint,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "kernel.compute_bucket_restart_policy".into(),
                    value: other.to_string(),
                    reason: "must be \"reset_to_zero\" or \"resume_from_checkpoint\"".into(),
                })
            }
        };
        let config = KernelConfig {
            max_invocation_depth: k.max_invocation_depth,
            max_permission_depth: k.max_permission_depth,
            per_call_timeout: Duration::from_millis(k.per_call_timeout_ms),
            max_content_size_bytes: k.max_content_size_bytes,
            max_code_size_bytes: k.max_code_size_bytes,
            default_disk_quota_bytes: k.default_disk_quota_bytes,
            tombstone_retention_count: k.tombstone_retention_count,
            compute_bucket: BucketCalibration { rate: k.compute_bucket_rate, capacity: k.compute_bucket_capacity },
            external_api_bucket: BucketCalibration { rate: k.external_api_bucket_rate, capacity: k.external_api_bucket_capacity },
            compute_bucket_restart_policy: restart_policy,
            contract_cache_ttl: Duration::from_millis(k.contract_cache_ttl_ms),
            crash_backoff_initial: Duration::from_millis(k.crash_backoff_initial_ms),
            crash_backoff_max: Duration::from_millis(k.crash_backoff_max_ms),
            crash_backoff_multiplier: k.crash_backoff_multiplier,
            quarantine_after_failures: k.quarantine_after_failures,
            predicate_poll_interval: Duration::from_millis(k.predicate_poll_interval_ms),
            state_dir: self.run_dir.display().to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        let s = &self.supervisor;
        SupervisorConfig {
            backoff_threshold: s.backoff_threshold,
            backoff_base: Duration::from_millis(s.backoff_base_ms),
            backoff_cap: Duration::from_millis(s.backoff_cap_ms),
            quarantine_threshold: s.quarantine_threshold,
            poll_interval: Duration::from_millis(s.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml(oracle: ArtifactId) -> String {
        format!(
            r#"
            run_dir = "/tmp/kernel-run"
            oracle_principal = "{oracle}"

            [kernel]
            max_invocation_depth = 5
            max_permission_depth = 3
            per_call_timeout_ms = 5000
            max_content_size_bytes = 65536
            max_code_size_bytes = 16384
            default_disk_quota_bytes = 1048576
            tombstone_retention_count = 100
            compute_bucket_rate = 10.0
            compute_bucket_capacity = 100.0
            external_api_bucket_rate = 5.0
            external_api_bucket_capacity = 50.0
            compute_bucket_restart_policy = "reset_to_zero"
            contract_cache_ttl_ms = 1000
            crash_backoff_initial_ms = 500
            crash_backoff_max_ms = 60000
            crash_backoff_multiplier = 2.0
            quarantine_after_failures = 10
            predicate_poll_interval_ms = 200

            [supervisor]
            backoff_threshold = 3
            backoff_base_ms = 500
            backoff_cap_ms = 60000
            quarantine_threshold = 10
            poll_interval_ms = 200
            "#
        )
    }

    #[test]
    fn well_formed_toml_parses_into_a_valid_kernel_config() {
        let oracle = ArtifactId::now_v7();
        let config: CliConfig = toml::from_str(&sample_toml(oracle)).unwrap();
        assert_eq!(config.oracle_principal().unwrap(), oracle);
        config.kernel_config().unwrap();
    }

    #[test]
    fn unknown_restart_policy_is_rejected() {
        let oracle = ArtifactId::now_v7();
        let mut raw = sample_toml(oracle);
        raw = raw.replace("\"reset_to_zero\"", "\"whenever\"");
        let config: CliConfig = toml::from_str(&raw).unwrap();
        let err = config.kernel_config().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "kernel.compute_bucket_restart_policy"));
    }

    #[test]
    fn missing_file_is_reported_as_unreadable() {
        let err = CliConfig::load(Path::new("/nonexistent/kernel.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }
}
