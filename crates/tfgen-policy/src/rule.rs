//! Executable rule objects.
//!
//! Each kind is a pure function over one canonical resource. Adding a kind
//! means adding a clause here *and* a clause in the compiler; the `match`
//! statements keep the two honest.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tfgen_core::CanonicalResource;

/// Traffic direction for port rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

/// Azure resources that cannot carry tags; checking them would report
/// violations Terraform itself could never fix.
const TAG_EXEMPT_KINDS: [&str; 1] = ["azure_subnet"];

fn default_directions() -> Vec<Direction> {
    vec![Direction::Ingress]
}

fn default_cidrs() -> Vec<String> {
    vec!["0.0.0.0/0".to_string()]
}

/// The compiled, executable form of a natural-language policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompiledRule {
    /// Violated when a security rule opens a listed port for a listed
    /// direction from a listed CIDR.
    BlockPorts {
        ports: Vec<u16>,
        #[serde(default = "default_directions")]
        directions: Vec<Direction>,
        #[serde(default = "default_cidrs")]
        cidrs: Vec<String>,
    },
    /// Violated when `Tags` is missing any listed key (case-insensitive).
    RequiredTags { tags: Vec<String> },
    /// Violated when a resource's Region/Location falls outside the list.
    AllowedRegions { regions: Vec<String> },
}

impl CompiledRule {
    /// Evaluate against one resource. Returns a violation detail, or `None`.
    pub fn evaluate(&self, resource: &CanonicalResource) -> Option<String> {
        match self {
            CompiledRule::BlockPorts {
                ports,
                directions,
                cidrs,
            } => evaluate_block_ports(resource, ports, directions, cidrs),
            CompiledRule::RequiredTags { tags } => evaluate_required_tags(resource, tags),
            CompiledRule::AllowedRegions { regions } => evaluate_allowed_regions(resource, regions),
        }
    }
}

fn evaluate_block_ports(
    resource: &CanonicalResource,
    ports: &[u16],
    directions: &[Direction],
    cidrs: &[String],
) -> Option<String> {
    for direction in directions {
        let key = match direction {
            Direction::Ingress => "IngressRules",
            Direction::Egress => "EgressRules",
        };
        if let Some(rules) = resource.properties.get(key).and_then(Value::as_array) {
            for rule in rules {
                if let Some(detail) = check_aws_rule(rule, ports, cidrs) {
                    return Some(detail);
                }
            }
        }
    }

    // Azure NSG shape; only inbound allow rules matter for ingress checks.
    if directions.contains(&Direction::Ingress) {
        if let Some(rules) = resource
            .properties
            .get("SecurityRules")
            .and_then(Value::as_array)
        {
            for rule in rules {
                if let Some(detail) = check_azure_rule(rule, ports, cidrs) {
                    return Some(detail);
                }
            }
        }
    }

    None
}

fn check_aws_rule(rule: &Value, ports: &[u16], cidrs: &[String]) -> Option<String> {
    let port = rule.get("to_port").and_then(Value::as_u64)? as u16;
    if !ports.contains(&port) {
        return None;
    }
    let blocks = rule.get("cidr_blocks").and_then(Value::as_array)?;
    let open = blocks
        .iter()
        .filter_map(Value::as_str)
        .find(|block| cidrs.iter().any(|cidr| cidr == block))?;
    Some(format!(
        "port {port} is blocked by policy but open to {open}"
    ))
}

fn check_azure_rule(rule: &Value, ports: &[u16], cidrs: &[String]) -> Option<String> {
    let direction = rule.get("direction").and_then(Value::as_str).unwrap_or("");
    let access = rule.get("access").and_then(Value::as_str).unwrap_or("");
    if !direction.eq_ignore_ascii_case("inbound") || !access.eq_ignore_ascii_case("allow") {
        return None;
    }

    let source = rule
        .get("source_address_prefix")
        .and_then(Value::as_str)
        .unwrap_or("");
    let internet_open = matches!(source, "*" | "0.0.0.0/0" | "Internet");
    let source_listed = cidrs.iter().any(|cidr| cidr == source)
        || (internet_open && cidrs.iter().any(|cidr| cidr == "0.0.0.0/0"));
    if !source_listed {
        return None;
    }

    let range = rule
        .get("destination_port_range")
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        })
        .unwrap_or_default();

    for port in parse_port_range(&range) {
        if ports.contains(&port) {
            let name = rule.get("name").and_then(Value::as_str).unwrap_or("unnamed");
            return Some(format!(
                "port {port} (rule: {name}) is blocked by policy but open to {source}"
            ));
        }
    }
    None
}

/// `"443"` → [443]; `"80-443"` → 80..=443; `"*"` or junk → empty.
fn parse_port_range(range: &str) -> Vec<u16> {
    let range = range.trim();
    if range.is_empty() || range == "*" {
        return Vec::new();
    }
    if let Some((start, end)) = range.split_once('-') {
        if let (Ok(start), Ok(end)) = (start.trim().parse::<u16>(), end.trim().parse::<u16>()) {
            if start <= end {
                return (start..=end).collect();
            }
        }
        return Vec::new();
    }
    range.parse::<u16>().map(|p| vec![p]).unwrap_or_default()
}

fn evaluate_required_tags(resource: &CanonicalResource, tags: &[String]) -> Option<String> {
    if TAG_EXEMPT_KINDS.contains(&resource.kind.as_str()) {
        return None;
    }
    let present = resource.tags();
    let missing: Vec<&str> = tags
        .iter()
        .filter(|required| {
            !present
                .keys()
                .any(|key| key.eq_ignore_ascii_case(required))
        })
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(format!("missing required tag(s): {}", missing.join(", ")))
    }
}

fn evaluate_allowed_regions(resource: &CanonicalResource, regions: &[String]) -> Option<String> {
    let region = resource
        .prop_str("Region")
        .or_else(|| resource.prop_str("Location"))?;
    if regions.iter().any(|r| r.eq_ignore_ascii_case(region)) {
        None
    } else {
        Some(format!(
            "region '{region}' is not in the allowed list ({})",
            regions.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tfgen_core::{CanonicalResource, Platform};

    fn resource_with(kind: &str, properties: Value) -> CanonicalResource {
        let platform = Platform::from_kind(kind).unwrap_or(Platform::Aws);
        let mut resource = CanonicalResource::new(platform, kind, "test");
        if let Value::Object(map) = properties {
            for (k, v) in map {
                resource.properties.insert(k, v);
            }
        }
        resource.normalize();
        resource
    }

    #[test]
    fn test_block_ports_aws_open_to_world() {
        let rule = CompiledRule::BlockPorts {
            ports: vec![22],
            directions: default_directions(),
            cidrs: default_cidrs(),
        };
        let sg = resource_with(
            "aws_security_group",
            json!({"IngressRules": [{"to_port": 22, "cidr_blocks": ["0.0.0.0/0"]}]}),
        );
        assert!(rule.evaluate(&sg).unwrap().contains("port 22"));

        let restricted = resource_with(
            "aws_security_group",
            json!({"IngressRules": [{"to_port": 22, "cidr_blocks": ["10.0.0.0/8"]}]}),
        );
        assert!(rule.evaluate(&restricted).is_none());
    }

    #[test]
    fn test_block_ports_azure_range_and_star_source() {
        let rule = CompiledRule::BlockPorts {
            ports: vec![3389],
            directions: default_directions(),
            cidrs: default_cidrs(),
        };
        let nsg = resource_with(
            "azure_nsg",
            json!({"SecurityRules": [{
                "name": "allow-rdp",
                "direction": "Inbound",
                "access": "Allow",
                "protocol": "Tcp",
                "destination_port_range": "3300-3400",
                "source_address_prefix": "*"
            }]}),
        );
        let detail = rule.evaluate(&nsg).unwrap();
        assert!(detail.contains("3389"));
        assert!(detail.contains("allow-rdp"));
    }

    #[test]
    fn test_block_ports_ignores_deny_and_outbound() {
        let rule = CompiledRule::BlockPorts {
            ports: vec![22],
            directions: default_directions(),
            cidrs: default_cidrs(),
        };
        let nsg = resource_with(
            "azure_nsg",
            json!({"SecurityRules": [
                {"direction": "Inbound", "access": "Deny", "destination_port_range": "22", "source_address_prefix": "*"},
                {"direction": "Outbound", "access": "Allow", "destination_port_range": "22", "source_address_prefix": "*"}
            ]}),
        );
        assert!(rule.evaluate(&nsg).is_none());
    }

    #[test]
    fn test_required_tags_case_insensitive() {
        let rule = CompiledRule::RequiredTags {
            tags: vec!["project".to_string()],
        };
        let tagged = resource_with("azure_vm", json!({"Tags": {"Project": "abc"}}));
        assert!(rule.evaluate(&tagged).is_none());

        let untagged = resource_with("azure_vm", json!({"Tags": {}}));
        assert!(rule.evaluate(&untagged).unwrap().contains("project"));
    }

    #[test]
    fn test_required_tags_exempts_azure_subnet() {
        let rule = CompiledRule::RequiredTags {
            tags: vec!["Project".to_string()],
        };
        let subnet = resource_with("azure_subnet", json!({"Tags": {}}));
        assert!(rule.evaluate(&subnet).is_none());
    }

    #[test]
    fn test_allowed_regions() {
        let rule = CompiledRule::AllowedRegions {
            regions: vec!["us-east-1".to_string(), "eu-west-1".to_string()],
        };
        let ok = resource_with("aws_ec2", json!({"Region": "US-EAST-1"}));
        assert!(rule.evaluate(&ok).is_none());

        let bad = resource_with("aws_ec2", json!({"Region": "ap-south-1"}));
        assert!(rule.evaluate(&bad).unwrap().contains("ap-south-1"));

        let silent = resource_with("aws_ec2", json!({}));
        assert!(rule.evaluate(&silent).is_none());
    }

    #[test]
    fn test_port_range_parsing() {
        assert_eq!(parse_port_range("443"), vec![443]);
        assert_eq!(parse_port_range("80-82"), vec![80, 81, 82]);
        assert!(parse_port_range("*").is_empty());
        assert!(parse_port_range("junk").is_empty());
        assert!(parse_port_range("90-80").is_empty());
    }
}
