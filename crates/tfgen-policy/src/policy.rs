//! Policy records.

use serde::{Deserialize, Serialize};

use tfgen_core::Platform;

use crate::rule::CompiledRule;

/// Severity determines whether a violation gates generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    /// Should a violation of this severity block code generation?
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

/// Which platform a policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformScope {
    Aws,
    Azure,
    All,
}

impl PlatformScope {
    pub fn matches(&self, platform: Platform) -> bool {
        match self {
            PlatformScope::All => true,
            PlatformScope::Aws => platform == Platform::Aws,
            PlatformScope::Azure => platform == Platform::Azure,
        }
    }
}

/// A stored security policy. The compiled form is cached on the record and
/// refreshed whenever the natural-language rule changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub natural_language_rule: String,
    #[serde(default = "default_scope")]
    pub cloud_platform: PlatformScope,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled: Option<CompiledRule>,
}

fn default_scope() -> PlatformScope {
    PlatformScope::All
}

fn default_severity() -> Severity {
    Severity::Error
}

fn default_true() -> bool {
    true
}

impl Policy {
    pub fn new(id: impl Into<String>, name: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            natural_language_rule: rule.into(),
            cloud_platform: PlatformScope::All,
            severity: Severity::Error,
            enabled: true,
            compiled: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_scope(mut self, scope: PlatformScope) -> Self {
        self.cloud_platform = scope;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_compiled(mut self, compiled: CompiledRule) -> Self {
        self.compiled = Some(compiled);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
