//! Policy evaluation over the canonical resource list.

use async_trait::async_trait;
use serde::Serialize;

use tfgen_core::{CanonicalResource, StoreError, Violation};

use crate::policy::Policy;

/// Source of enabled policies; implemented by the policy store and by
/// fixed in-memory doubles in tests.
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    async fn enabled_policies(&self) -> Result<Vec<Policy>, StoreError>;
}

/// Outcome of evaluating every enabled policy against every resource.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ComplianceReport {
    pub violations: Vec<Violation>,
    pub policies_checked: usize,
    pub passed: bool,
}

impl ComplianceReport {
    pub fn blocking(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.blocking)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.blocking)
    }
}

/// Deterministic: fixed policies and resources yield the same violation set.
pub fn evaluate(policies: &[Policy], resources: &[CanonicalResource]) -> ComplianceReport {
    let mut report = ComplianceReport {
        passed: true,
        ..Default::default()
    };

    for policy in policies.iter().filter(|p| p.enabled) {
        let Some(rule) = &policy.compiled else {
            tracing::warn!(policy = %policy.name, "policy has no compiled rule, skipping");
            continue;
        };
        report.policies_checked += 1;

        for resource in resources {
            if !policy.cloud_platform.matches(resource.platform) {
                continue;
            }
            if let Some(detail) = rule.evaluate(resource) {
                report.violations.push(Violation {
                    policy_id: policy.id.clone(),
                    policy_name: policy.name.clone(),
                    resource_name: resource.name.clone(),
                    detail,
                    blocking: policy.severity.is_blocking(),
                });
            }
        }
    }

    let passed = report.blocking().next().is_none();
    report.passed = passed;
    report
}
