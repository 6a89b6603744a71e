//! The closed set of contract behaviours named in an artifact's `code`.

use kernel_core::{ActionKind, Artifact, ArtifactId, PermissionDecision};

#[derive(Debug, Clone, PartialEq)]
pub enum ContractProgram {
    /// Anyone reads or invokes; only the creator writes or deletes.
    Freeware,
    /// Only the gated artifact itself passes — the agent self-control
    /// template. `requester_id` must equal the artifact being accessed,
    /// not the contract.
    SelfOwned,
    /// Only the creator, for every action.
    Private,
    /// Names a kernel-registered predicate invoked through the execution
    /// engine, charged as a sub-invocation to the top-level requester.
    CustomPredicate(String),
}

impl ContractProgram {
    /// Parses the `code.program` field of a contract artifact. Anything
    /// that doesn't match a known genesis template name is treated as a
    /// custom predicate dispatched through `invoke`.
    pub fn from_program_name(name: &str) -> Self {
        match name {
            "contract.freeware" => ContractProgram::Freeware,
            "contract.self_owned" => ContractProgram::SelfOwned,
            "contract.private" => ContractProgram::Private,
            other => ContractProgram::CustomPredicate(other.to_string()),
        }
    }

    /// Evaluates the three built-in templates directly. Returns `None` for
    /// `CustomPredicate`, which the caller must dispatch through an
    /// [`kernel_core::Invoker`].
    pub fn evaluate_builtin(
        &self,
        gated_artifact: &Artifact,
        action: ActionKind,
        requester_id: ArtifactId,
    ) -> Option<PermissionDecision> {
        match self {
            ContractProgram::Freeware => Some(match action {
                ActionKind::Read | ActionKind::Invoke => {
                    PermissionDecision::allow("freeware: read/invoke open to all")
                }
                ActionKind::Write | ActionKind::Edit | ActionKind::Delete => {
                    if requester_id == gated_artifact.created_by {
                        PermissionDecision::allow("freeware: creator has write access")
                    } else {
                        PermissionDecision::deny("freeware: only the creator may write or delete")
                    }
                }
            }),
            ContractProgram::SelfOwned => Some(if requester_id == gated_artifact.id {
                PermissionDecision::allow("self_owned: artifact acting on itself")
            } else {
                PermissionDecision::deny("self_owned: only the artifact itself passes")
            }),
            ContractProgram::Private => Some(if requester_id == gated_artifact.created_by {
                PermissionDecision::allow("private: creator access")
            } else {
                PermissionDecision::deny("private: creator-only")
            }),
            ContractProgram::CustomPredicate(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn artifact(created_by: ArtifactId) -> Artifact {
        Artifact {
            id: ArtifactId::now_v7(),
            content: serde_json::json!(null),
            code: None,
            interface: None,
            access_contract_id: None,
            has_standing: false,
            has_executable: false,
            created_by,
            created_at: Utc::now(),
            owner_id: created_by,
        }
    }

    #[test]
    fn unrecognized_program_name_becomes_custom_predicate() {
        let program = ContractProgram::from_program_name("my_dsl.check");
        assert_eq!(program, ContractProgram::CustomPredicate("my_dsl.check".into()));
    }

    #[test]
    fn freeware_allows_read_denies_write_to_strangers() {
        let creator = ArtifactId::now_v7();
        let stranger = ArtifactId::now_v7();
        let target = artifact(creator);
        let program = ContractProgram::Freeware;
        assert!(program.evaluate_builtin(&target, ActionKind::Read, stranger).unwrap().allowed);
        assert!(!program.evaluate_builtin(&target, ActionKind::Write, stranger).unwrap().allowed);
        assert!(program.evaluate_builtin(&target, ActionKind::Write, creator).unwrap().allowed);
    }

    #[test]
    fn self_owned_requires_requester_to_be_the_artifact() {
        let creator = ArtifactId::now_v7();
        let target = artifact(creator);
        let program = ContractProgram::SelfOwned;
        assert!(program.evaluate_builtin(&target, ActionKind::Write, target.id).unwrap().allowed);
        assert!(!program.evaluate_builtin(&target, ActionKind::Write, creator).unwrap().allowed);
    }

    #[test]
    fn private_denies_everyone_but_the_creator() {
        let creator = ArtifactId::now_v7();
        let target = artifact(creator);
        let program = ContractProgram::Private;
        assert!(program.evaluate_builtin(&target, ActionKind::Read, creator).unwrap().allowed);
        assert!(!program.evaluate_builtin(&target, ActionKind::Read, ArtifactId::now_v7()).unwrap().allowed);
    }

    #[test]
    fn custom_predicate_has_no_builtin_evaluation() {
        let creator = ArtifactId::now_v7();
        let target = artifact(creator);
        let program = ContractProgram::CustomPredicate("x".into());
        assert!(program.evaluate_builtin(&target, ActionKind::Read, creator).is_none());
    }
}
