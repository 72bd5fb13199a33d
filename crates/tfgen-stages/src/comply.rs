//! Compliance checker stage.

use async_trait::async_trait;
use std::sync::Arc;

use tfgen_core::{Next, Phase, Stage, StageError, StageKind, WorkflowState};
use tfgen_policy::{evaluate, PolicyProvider};

/// Evaluates every enabled policy against the canonical resource list.
pub struct ComplianceCheckerStage {
    policies: Arc<dyn PolicyProvider>,
}

impl ComplianceCheckerStage {
    pub fn new(policies: Arc<dyn PolicyProvider>) -> Self {
        Self { policies }
    }
}

#[async_trait]
impl Stage for ComplianceCheckerStage {
    fn kind(&self) -> StageKind {
        StageKind::Comply
    }

    async fn run(&self, state: &mut WorkflowState) -> Result<Next, StageError> {
        state.phase = Phase::CheckingCompliance;

        let policies = self
            .policies
            .enabled_policies()
            .await
            .map_err(|e| StageError::Internal(e.to_string()))?;

        if policies.is_empty() {
            state.compliance_passed = Some(true);
            state.push_assistant(
                "No compliance policies configured. Proceeding to code generation...",
            );
            return Ok(Next::Continue);
        }

        let report = evaluate(&policies, &state.resources);
        state.violations = report.violations.clone();
        state.compliance_passed = Some(report.passed);

        if report.passed {
            let mut message = format!(
                "Compliance check passed ({} policies checked).",
                report.policies_checked
            );
            let warnings: Vec<_> = report.warnings().collect();
            if !warnings.is_empty() {
                message.push_str("\n\nWarnings:\n");
                for warning in warnings {
                    message.push_str(&format!("- {}: {}\n", warning.resource_name, warning.detail));
                }
            }
            state.push_assistant(message);
            Ok(Next::Continue)
        } else {
            state.phase = Phase::ComplianceFailed;
            let mut message = format!(
                "Compliance check failed with {} violation(s):\n",
                report.blocking().count()
            );
            for violation in report.blocking() {
                message.push_str(&format!(
                    "- {} [{}]: {}\n",
                    violation.resource_name, violation.policy_name, violation.detail
                ));
            }
            message.push_str("\nPlease fix these issues before proceeding.");
            state.push_assistant(message);
            Ok(Next::Halt)
        }
    }
}
