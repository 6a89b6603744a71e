//! Proptest strategies for the kernel's entity and configuration types.

use kernel_core::{ActionKind, ArtifactCode, ArtifactId, ArtifactSpec, BucketCalibration, Interface, KernelConfig, ResourceKind};
use proptest::prelude::*;
use std::time::Duration;
use uuid::Uuid;

/// A reproducible-under-shrinking artifact id — proptest shrinks the
/// backing `u128`, not the UUID's bit layout, which is fine since nothing
/// here depends on a v4/v7 version tag.
pub fn arb_artifact_id() -> impl Strategy<Value = ArtifactId> {
    any::<u128>().prop_map(|n| ArtifactId::new(Uuid::from_u128(n)))
}

pub fn arb_action_kind() -> impl Strategy<Value = ActionKind> {
    prop_oneof![
        Just(ActionKind::Read),
        Just(ActionKind::Write),
        Just(ActionKind::Edit),
        Just(ActionKind::Delete),
        Just(ActionKind::Invoke),
    ]
}

pub fn arb_resource_kind() -> impl Strategy<Value = ResourceKind> {
    prop_oneof![
        Just(ResourceKind::Compute),
        Just(ResourceKind::Disk),
        Just(ResourceKind::ExternalApi),
    ]
}

/// Arbitrary JSON content: scalars and small maps, matching the content
/// shapes an artifact actually holds (no need to exercise deeply nested
/// structures here — `ArtifactStore` treats content opaquely).
pub fn arb_content() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::json!(null)),
        any::<i64>().prop_map(|n| serde_json::json!(n)),
        ".{0,32}".prop_map(|s| serde_json::json!(s)),
        proptest::collection::hash_map(".{1,8}", any::<i64>(), 0..4)
            .prop_map(|m| serde_json::to_value(m).expect("map of string/i64 always serializes")),
    ]
}

/// A data artifact spec: no code, no interface, an arbitrary owner and
/// content. Good for exercising `create`/`read`/`write`/`edit`/`delete`
/// without dragging in the invocation path.
pub fn arb_data_spec() -> impl Strategy<Value = ArtifactSpec> {
    (arb_artifact_id(), arb_content()).prop_map(|(owner_id, content)| ArtifactSpec {
        content,
        code: None,
        interface: None,
        access_contract_id: None,
        has_standing: false,
        has_executable: false,
        owner_id,
    })
}

/// A tool artifact spec: executable, with a named program and an empty
/// interface — enough to exercise the invoke path against a registered
/// handler the caller supplies separately.
pub fn arb_tool_spec(program: impl Into<String>) -> impl Strategy<Value = ArtifactSpec> {
    let program = program.into();
    arb_artifact_id().prop_map(move |owner_id| ArtifactSpec {
        content: serde_json::json!({}),
        code: Some(ArtifactCode {
            program: program.clone(),
            params: serde_json::json!({}),
        }),
        interface: Some(Interface::default()),
        access_contract_id: None,
        has_standing: false,
        has_executable: true,
        owner_id,
    })
}

/// A bucket calibration with a positive rate and capacity, matching
/// `KernelConfig::validate`'s constraint on `compute_bucket`/
/// `external_api_bucket`.
pub fn arb_bucket_calibration() -> impl Strategy<Value = BucketCalibration> {
    (0.01f64..1000.0, 0.01f64..10_000.0).prop_map(|(rate, capacity)| BucketCalibration { rate, capacity })
}

/// A `KernelConfig` that always passes `validate()` — every field drawn
/// from the range `validate` actually enforces, built on top of
/// `KernelConfig::for_tests` so fields without a meaningful range (e.g.
/// `state_dir`) stay fixed.
pub fn arb_valid_config() -> impl Strategy<Value = KernelConfig> {
    (
        1u32..10,
        1u32..500,
        arb_bucket_calibration(),
        arb_bucket_calibration(),
        1.01f64..8.0,
        1u32..20,
    )
        .prop_map(|(max_permission_depth, extra_invocation_depth, compute_bucket, external_api_bucket, crash_backoff_multiplier, quarantine_after_failures)| {
            let mut config = KernelConfig::for_tests();
            config.max_permission_depth = max_permission_depth;
            config.max_invocation_depth = max_permission_depth + extra_invocation_depth;
            config.compute_bucket = compute_bucket;
            config.external_api_bucket = external_api_bucket;
            config.crash_backoff_multiplier = crash_backoff_multiplier;
            config.quarantine_after_failures = quarantine_after_failures;
            config.per_call_timeout = Duration::from_millis(1);
            config
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_configs_always_validate(config in arb_valid_config()) {
            config.validate().expect("arb_valid_config must only produce valid configs");
        }

        #[test]
        fn generated_data_specs_are_never_executable(spec in arb_data_spec()) {
            prop_assert!(!spec.has_executable);
            prop_assert!(spec.code.is_none());
        }

        #[test]
        fn generated_tool_specs_carry_the_requested_program(spec in arb_tool_spec("probe.tool")) {
            prop_assert_eq!(spec.code.as_ref().map(|c| c.program.as_str()), Some("probe.tool"));
        }
    }
}
