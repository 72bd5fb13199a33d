//! Deployment records and their status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Deployment lifecycle.
///
/// ```text
/// pending → planning → {plan_ready | plan_failed}
/// plan_ready → applying → {apply_success | apply_failed}
/// apply_success → destroying → destroyed
/// ```
///
/// Records are immutable once they reach a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Planning,
    PlanReady,
    PlanFailed,
    Applying,
    ApplySuccess,
    ApplyFailed,
    Destroying,
    Destroyed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::PlanFailed
                | DeploymentStatus::ApplyFailed
                | DeploymentStatus::Destroyed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Planning => "planning",
            DeploymentStatus::PlanReady => "plan_ready",
            DeploymentStatus::PlanFailed => "plan_failed",
            DeploymentStatus::Applying => "applying",
            DeploymentStatus::ApplySuccess => "apply_success",
            DeploymentStatus::ApplyFailed => "apply_failed",
            DeploymentStatus::Destroying => "destroying",
            DeploymentStatus::Destroyed => "destroyed",
        }
    }
}

/// Parsed `+/~/-` counts from the human plan output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub add: u32,
    pub change: u32,
    pub destroy: u32,
}

/// One plan/apply lifecycle against one environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub deployment_id: String,
    pub session_id: String,
    pub environment_id: String,
    pub status: DeploymentStatus,
    /// Filename -> content, as handed over by the generator.
    pub terraform_code: BTreeMap<String, String>,
    pub plan_output: Option<String>,
    pub plan_summary: Option<PlanSummary>,
    pub apply_output: Option<String>,
    pub terraform_outputs: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub work_dir: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Deployment {
    pub fn new(
        session_id: impl Into<String>,
        environment_id: impl Into<String>,
        terraform_code: BTreeMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            deployment_id: format!("dep_{}", &Uuid::new_v4().simple().to_string()[..16]),
            session_id: session_id.into(),
            environment_id: environment_id.into(),
            status: DeploymentStatus::Pending,
            terraform_code,
            plan_output: None,
            plan_summary: None,
            apply_output: None,
            terraform_outputs: None,
            error_message: None,
            work_dir: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
