//! Natural-language rule compilation.
//!
//! A pattern table handles the explicit phrasings; anything else goes to a
//! bounded LLM call with a strict translation prompt. The compiled form is
//! cached on the policy record and only refreshed when the rule text
//! changes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

use tfgen_llm::{extract_json, ChatClient, ChatTurn};

use crate::rule::{CompiledRule, Direction};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("rule not recognized: {0}")]
    Unrecognized(String),

    #[error("rule translation failed: {0}")]
    Llm(String),
}

static CIDR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}/\d{1,2}\b").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,5})\b").unwrap());
static AFTER_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)tags?\b\s*[:：]?\s*(.+)$").unwrap());
static AFTER_REGIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)regions?\b\s*[:：]?\s*(.+)$").unwrap());
static LIST_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9_-]*").unwrap());

/// Filler words dropped when extracting tag/region lists.
const STOPWORDS: [&str; 18] = [
    "a", "an", "the", "and", "or", "must", "be", "present", "required", "require", "on", "all",
    "resources", "resource", "every", "each", "have", "has",
];

const TRANSLATOR_PROMPT: &str = r#"You are a security policy translator.
Convert the user's natural language security rule into a JSON object strictly following one of these schemas:

1. For blocking ports:
   {"block_ports": [22, 3389], "cidrs": ["0.0.0.0/0"]}

2. For required tags:
   {"required_tags": ["Environment", "Owner"]}

3. For allowed regions:
   {"allowed_regions": ["us-east-1", "eu-west-1"]}

Output ONLY the JSON object. Do not explain."#;

/// Compiles NL rules; the LLM is optional and only consulted when the
/// pattern table abstains.
#[derive(Clone, Default)]
pub struct RuleCompiler {
    client: Option<Arc<dyn ChatClient>>,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self { client: None }
    }

    pub fn with_client(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub async fn compile(&self, rule_text: &str) -> Result<CompiledRule, CompileError> {
        if let Some(rule) = compile_pattern(rule_text) {
            return Ok(rule);
        }

        let Some(client) = &self.client else {
            return Err(CompileError::Unrecognized(rule_text.to_string()));
        };

        let reply = client
            .chat(&[
                ChatTurn::system(TRANSLATOR_PROMPT),
                ChatTurn::user(rule_text),
            ])
            .await
            .map_err(|e| CompileError::Llm(e.to_string()))?;

        extract_json(&reply)
            .as_ref()
            .and_then(parse_rule_value)
            .ok_or_else(|| CompileError::Llm(format!("unusable translation: {}", reply.trim())))
    }
}

/// Deterministic pattern compiler for the explicit phrasings.
pub fn compile_pattern(rule_text: &str) -> Option<CompiledRule> {
    let lower = rule_text.to_lowercase();

    if lower.contains("port") {
        // Strip CIDRs first so their octets are not mistaken for ports.
        let without_cidrs = CIDR.replace_all(rule_text, " ");
        let ports: Vec<u16> = NUMBER
            .find_iter(&without_cidrs)
            .filter_map(|m| m.as_str().parse::<u16>().ok())
            .filter(|p| *p > 0)
            .fold(Vec::new(), |mut acc, p| {
                if !acc.contains(&p) {
                    acc.push(p);
                }
                acc
            });
        if ports.is_empty() {
            return None;
        }

        let cidrs: Vec<String> = CIDR
            .find_iter(rule_text)
            .map(|m| m.as_str().to_string())
            .collect();
        let cidrs = if cidrs.is_empty() {
            vec!["0.0.0.0/0".to_string()]
        } else {
            cidrs
        };

        let egress = lower.contains("egress") || lower.contains("outbound");
        let ingress = !egress || lower.contains("ingress") || lower.contains("inbound");
        let mut directions = Vec::new();
        if ingress {
            directions.push(Direction::Ingress);
        }
        if egress {
            directions.push(Direction::Egress);
        }

        return Some(CompiledRule::BlockPorts {
            ports,
            directions,
            cidrs,
        });
    }

    if lower.contains("tag") {
        let tail = AFTER_TAGS.captures(rule_text)?.get(1)?.as_str();
        let tags = list_tokens(tail);
        if tags.is_empty() {
            return None;
        }
        return Some(CompiledRule::RequiredTags { tags });
    }

    if lower.contains("region") {
        let tail = AFTER_REGIONS.captures(rule_text)?.get(1)?.as_str();
        let regions = list_tokens(tail);
        if regions.is_empty() {
            return None;
        }
        return Some(CompiledRule::AllowedRegions { regions });
    }

    None
}

fn list_tokens(tail: &str) -> Vec<String> {
    LIST_TOKEN
        .find_iter(tail)
        .map(|m| m.as_str().to_string())
        .filter(|token| !STOPWORDS.contains(&token.to_lowercase().as_str()))
        .collect()
}

/// Accepts both the tagged enum form and the flat translator output
/// (`{"block_ports": [...]}`).
pub fn parse_rule_value(value: &Value) -> Option<CompiledRule> {
    if let Ok(rule) = serde_json::from_value::<CompiledRule>(value.clone()) {
        return Some(rule);
    }
    let obj = value.as_object()?;

    if let Some(ports) = obj.get("block_ports").and_then(Value::as_array) {
        let ports: Vec<u16> = ports
            .iter()
            .filter_map(Value::as_u64)
            .filter_map(|p| u16::try_from(p).ok())
            .collect();
        if ports.is_empty() {
            return None;
        }
        let cidrs = obj
            .get("cidrs")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|cidrs| !cidrs.is_empty())
            .unwrap_or_else(|| vec!["0.0.0.0/0".to_string()]);
        return Some(CompiledRule::BlockPorts {
            ports,
            directions: vec![Direction::Ingress],
            cidrs,
        });
    }

    if let Some(tags) = obj.get("required_tags").and_then(Value::as_array) {
        let tags: Vec<String> = tags
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
        if tags.is_empty() {
            return None;
        }
        return Some(CompiledRule::RequiredTags { tags });
    }

    if let Some(regions) = obj.get("allowed_regions").and_then(Value::as_array) {
        let regions: Vec<String> = regions
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
        if regions.is_empty() {
            return None;
        }
        return Some(CompiledRule::AllowedRegions { regions });
    }

    None
}
