//! Durable per-session workflow state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::resource::CanonicalResource;
use crate::stage::StageKind;

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of the ordered conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// How the session was seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Spreadsheet,
}

/// Stage labels the workflow moves through.
///
/// Monotonically advancing except on an explicit follow-up turn, which
/// re-enters at parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialized,
    Parsing,
    CollectingInformation,
    WaitingForUser,
    CheckingCompliance,
    ComplianceFailed,
    GeneratingCode,
    ReviewingCode,
    Completed,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initialized => "initialized",
            Phase::Parsing => "parsing",
            Phase::CollectingInformation => "collecting_information",
            Phase::WaitingForUser => "waiting_for_user",
            Phase::CheckingCompliance => "checking_compliance",
            Phase::ComplianceFailed => "compliance_failed",
            Phase::GeneratingCode => "generating_code",
            Phase::ReviewingCode => "reviewing_code",
            Phase::Completed => "completed",
            Phase::Error => "error",
        }
    }
}

/// One policy violation attributed to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub policy_id: String,
    pub policy_name: String,
    pub resource_name: String,
    pub detail: String,
    /// `error` violations gate generation; `warning` ones are reported only.
    pub blocking: bool,
}

/// An error captured at a stage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: StageKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Everything the pipeline knows about one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    /// Insertion order preserves the order of first mention.
    pub resources: Vec<CanonicalResource>,
    pub input_type: InputType,
    pub information_complete: bool,
    /// Resource name -> required fields still absent.
    pub missing_fields: BTreeMap<String, BTreeSet<String>>,
    pub phase: Phase,
    pub compliance_passed: Option<bool>,
    pub violations: Vec<Violation>,
    /// Filename -> rendered content; non-empty only on completion.
    pub generated_code: BTreeMap<String, String>,
    pub errors: Vec<ErrorRecord>,
}

impl WorkflowState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            resources: Vec::new(),
            input_type: InputType::Text,
            information_complete: false,
            missing_fields: BTreeMap::new(),
            phase: Phase::Initialized,
            compliance_passed: None,
            violations: Vec::new(),
            generated_code: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    /// Latest user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Latest assistant message, if any. This is what the chat surface
    /// returns to the caller.
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn record_error(&mut self, stage: StageKind, message: impl Into<String>) {
        self.errors.push(ErrorRecord {
            stage,
            message: message.into(),
            at: Utc::now(),
        });
        self.phase = Phase::Error;
    }

    /// Reset the per-turn outcome fields before a re-entry at parse.
    ///
    /// Resources and messages survive across turns; completeness,
    /// compliance, and generation results are recomputed every run.
    pub fn begin_turn(&mut self) {
        self.phase = Phase::Parsing;
        self.information_complete = false;
        self.missing_fields.clear();
        self.compliance_passed = None;
        self.violations.clear();
        self.generated_code.clear();
    }
}
