//! Stage contract shared by every pipeline step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::WorkflowState;

/// The five cooperating stages, in DAG order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Parse,
    Collect,
    Comply,
    Generate,
    Review,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::Parse,
        StageKind::Collect,
        StageKind::Comply,
        StageKind::Generate,
        StageKind::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Parse => "input_parser",
            StageKind::Collect => "information_collector",
            StageKind::Comply => "compliance_checker",
            StageKind::Generate => "code_generator",
            StageKind::Review => "code_reviewer",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision returned by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Proceed to the next stage in the DAG.
    Continue,
    /// Stop this run and return the state as-is (awaiting user input, a
    /// compliance failure, or normal completion).
    Halt,
    /// Skip forward to a later stage (spreadsheet seed goes straight to
    /// compliance).
    Jump(StageKind),
}

/// Non-recoverable stage failures. Incomplete information and compliance
/// violations are routing outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The LLM reply was not valid JSON or violated the output schema.
    #[error("parse: {0}")]
    Parse(String),

    /// No template registered for a resource.
    #[error("no template for {platform} kind '{kind}' (resource '{resource}'); available: {available}")]
    Template {
        resource: String,
        platform: String,
        kind: String,
        available: String,
    },

    /// Generation produced an empty or suspiciously short file.
    #[error("generated {file} is suspiciously short ({bytes} bytes)")]
    EmptyOutput { file: String, bytes: usize },

    /// The chat-completion backend failed.
    #[error("llm: {0}")]
    Llm(String),

    #[error("internal: {0}")]
    Internal(String),
}

/// Contract implemented by each pipeline stage.
///
/// A stage is a pure function over the workflow state plus its externalized
/// collaborators; it must not hold state between runs.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, state: &mut WorkflowState) -> Result<Next, StageError>;
}
