//! tfgen-policy: organization security policies.
//!
//! Natural-language rules compile once into small typed rule objects which
//! evaluate as pure functions over canonical resources.
//!
//! ```text
//! NL rule ──compile──► CompiledRule ──evaluate──► violations ──► pass/fail
//! ```

pub mod compile;
pub mod engine;
pub mod policy;
pub mod rule;

pub use compile::{parse_rule_value, CompileError, RuleCompiler};
pub use engine::{evaluate, ComplianceReport, PolicyProvider};
pub use policy::{PlatformScope, Policy, Severity};
pub use rule::{CompiledRule, Direction};
