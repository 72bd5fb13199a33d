//! Canonical resource model and normalization.
//!
//! Every stage after input parsing operates on [`CanonicalResource`]:
//! a platform, a normalized kind, a logical name, and a property map that
//! always carries a `Tags` object. Aliases collapse here so the rest of the
//! pipeline never sees `EC2` next to `aws_ec2`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Cloud platform of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Aws,
    Azure,
}

impl Platform {
    /// Parse from a loose string (`"aws"`, `"AWS"`, `"azure"`).
    pub fn parse(value: &str) -> Option<Platform> {
        match value.trim().to_lowercase().as_str() {
            "aws" => Some(Platform::Aws),
            "azure" => Some(Platform::Azure),
            _ => None,
        }
    }

    /// Infer the platform from a (normalized) kind prefix.
    pub fn from_kind(kind: &str) -> Option<Platform> {
        let lower = kind.to_lowercase();
        if lower.starts_with("aws") {
            Some(Platform::Aws)
        } else if lower.starts_with("azure") {
            Some(Platform::Azure)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Aws => "aws",
            Platform::Azure => "azure",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata columns mirrored into `Tags` at ingestion time.
pub const METADATA_KEYS: [&str; 4] = ["Environment", "Project", "Owner", "CostCenter"];

/// Properties templates iterate over; these must be native lists, never
/// comma-joined strings.
pub const LIST_PROPERTIES: [&str; 10] = [
    "Subnets",
    "SecurityGroups",
    "SecurityGroupIds",
    "AddressSpace",
    "AddressPrefixes",
    "DnsServers",
    "ServiceEndpoints",
    "BlobContainers",
    "Targets",
    "BackendPoolResources",
];

/// Canonical kinds with a template behind them.
pub const KNOWN_KINDS: [&str; 20] = [
    "aws_vpc",
    "aws_subnet",
    "aws_security_group",
    "aws_ec2",
    "aws_s3",
    "aws_rds",
    "aws_internet_gateway",
    "aws_nat_gateway",
    "aws_elastic_ip",
    "aws_load_balancer",
    "azure_resource_group",
    "azure_vnet",
    "azure_subnet",
    "azure_nsg",
    "azure_vm",
    "azure_storage",
    "azure_sql",
    "azure_public_ip",
    "azure_nat_gateway",
    "azure_load_balancer",
];

/// Unambiguous aliases, already lowercased with separators collapsed.
static KIND_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    // AWS
    m.insert("ec2", "aws_ec2");
    m.insert("instance", "aws_ec2");
    m.insert("s3", "aws_s3");
    m.insert("bucket", "aws_s3");
    m.insert("vpc", "aws_vpc");
    m.insert("rds", "aws_rds");
    m.insert("security_group", "aws_security_group");
    m.insert("securitygroup", "aws_security_group");
    m.insert("aws_securitygroup", "aws_security_group");
    m.insert("internet_gateway", "aws_internet_gateway");
    m.insert("internetgateway", "aws_internet_gateway");
    m.insert("elastic_ip", "aws_elastic_ip");
    m.insert("elasticip", "aws_elastic_ip");
    m.insert("eip", "aws_elastic_ip");
    // Azure
    m.insert("vm", "azure_vm");
    m.insert("virtual_machine", "azure_vm");
    m.insert("vnet", "azure_vnet");
    m.insert("virtual_network", "azure_vnet");
    m.insert("nsg", "azure_nsg");
    m.insert("network_security_group", "azure_nsg");
    m.insert("storage", "azure_storage");
    m.insert("storage_account", "azure_storage");
    m.insert("azure_storage_account", "azure_storage");
    m.insert("sql", "azure_sql");
    m.insert("resource_group", "azure_resource_group");
    m.insert("resourcegroup", "azure_resource_group");
    m.insert("azure_resourcegroup", "azure_resource_group");
    m.insert("public_ip", "azure_public_ip");
    m.insert("publicip", "azure_public_ip");
    m
});

/// Normalize a raw resource kind to its canonical `<platform>_<kind>` form.
///
/// Bare kinds that exist on both platforms (`subnet`, `nat_gateway`,
/// `load_balancer`) resolve through the platform hint and default to AWS.
/// Unknown kinds keep their cleaned input form; the second tuple element
/// says whether the result is a kind the registry knows.
pub fn normalize_kind(raw: &str, platform: Option<Platform>) -> (String, bool) {
    let cleaned = raw
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_");
    if cleaned.is_empty() {
        return (cleaned, false);
    }

    if let Some(canonical) = KIND_ALIASES.get(cleaned.as_str()) {
        return ((*canonical).to_string(), true);
    }

    // Platform-ambiguous bare kinds.
    let prefix = match platform {
        Some(Platform::Azure) => "azure",
        _ => "aws",
    };
    if matches!(cleaned.as_str(), "subnet" | "nat_gateway" | "natgateway" | "load_balancer" | "loadbalancer") {
        let base = match cleaned.as_str() {
            "natgateway" => "nat_gateway",
            "loadbalancer" => "load_balancer",
            other => other,
        };
        return (format!("{prefix}_{base}"), true);
    }

    if KNOWN_KINDS.contains(&cleaned.as_str()) {
        return (cleaned, true);
    }

    // Try completing a bare kind with the platform prefix.
    if let Some(p) = platform {
        if !cleaned.starts_with("aws_") && !cleaned.starts_with("azure_") {
            let candidate = format!("{}_{}", p.as_str(), cleaned);
            if let Some(canonical) = KIND_ALIASES.get(candidate.as_str()) {
                return ((*canonical).to_string(), true);
            }
            if KNOWN_KINDS.contains(&candidate.as_str()) {
                return (candidate, true);
            }
        }
    }

    (cleaned, false)
}

/// Whether a normalized kind has a template behind it.
pub fn is_known_kind(kind: &str) -> bool {
    KNOWN_KINDS.contains(&kind)
}

/// Derive a Terraform-safe label from a logical name.
///
/// Lowercase, `[a-z0-9_]` only, guaranteed to start with a letter.
pub fn safe_id(name: &str) -> String {
    let mut id: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if id.is_empty() {
        id.push_str("res");
    }
    if !id.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        id = format!("res_{id}");
    }
    id
}

/// The single resource representation all stages operate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResource {
    pub platform: Platform,
    /// Normalized `<platform>_<kind>` form.
    #[serde(rename = "type")]
    pub kind: String,
    /// Logical identifier. The Terraform label is derived via [`safe_id`].
    pub name: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl CanonicalResource {
    pub fn new(platform: Platform, kind: impl Into<String>, name: impl Into<String>) -> Self {
        let mut resource = Self {
            platform,
            kind: kind.into(),
            name: name.into(),
            properties: Map::new(),
        };
        resource.normalize();
        resource
    }

    /// Build from loosely-shaped JSON, as produced by the LLM extractor or a
    /// spreadsheet row. Returns `None` when neither an explicit platform nor
    /// a platform-prefixed kind makes the resource placeable.
    pub fn from_value(value: &Value) -> Option<CanonicalResource> {
        let obj = value.as_object()?;
        let raw_kind = obj
            .get("type")
            .or_else(|| obj.get("resource_type"))
            .and_then(Value::as_str)?;
        let name = obj
            .get("name")
            .or_else(|| obj.get("resource_name"))
            .and_then(Value::as_str)?
            .trim()
            .to_string();
        if name.is_empty() {
            return None;
        }
        let hint = obj
            .get("platform")
            .or_else(|| obj.get("cloud_platform"))
            .and_then(Value::as_str)
            .and_then(Platform::parse);

        let (first_pass, _) = normalize_kind(raw_kind, hint);
        let platform = hint.or_else(|| Platform::from_kind(&first_pass))?;
        let (kind, _) = normalize_kind(raw_kind, Some(platform));

        let properties = obj
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut resource = CanonicalResource {
            platform,
            kind,
            name,
            properties,
        };
        resource.normalize();
        Some(resource)
    }

    /// Enforce the structural invariants: `Tags` is always an object, the
    /// metadata columns are mirrored into it, and list-valued properties
    /// are native lists.
    pub fn normalize(&mut self) {
        self.ensure_tags();
        self.mirror_metadata();
        self.materialize_lists();
    }

    fn materialize_lists(&mut self) {
        for key in LIST_PROPERTIES {
            let Some(Value::String(raw)) = self.properties.get(key) else {
                continue;
            };
            let items: Vec<Value> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect();
            self.properties.insert(key.to_string(), Value::Array(items));
        }
    }

    fn ensure_tags(&mut self) {
        let needs_reset = !matches!(self.properties.get("Tags"), Some(Value::Object(_)));
        if needs_reset {
            self.properties
                .insert("Tags".to_string(), Value::Object(Map::new()));
        }
    }

    fn mirror_metadata(&mut self) {
        let mut mirrored: Vec<(String, Value)> = Vec::new();
        {
            let tags = self.tags();
            for key in METADATA_KEYS {
                let Some(value) = self.properties.get(key) else {
                    continue;
                };
                if value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty()) {
                    continue;
                }
                let already = tags.keys().any(|k| k.eq_ignore_ascii_case(key));
                if !already {
                    mirrored.push((key.to_string(), value.clone()));
                }
            }
        }
        if !mirrored.is_empty() {
            let tags = self.tags_mut();
            for (key, value) in mirrored {
                tags.insert(key, value);
            }
        }
    }

    /// The `Tags` object. [`normalize`](Self::normalize) guarantees presence.
    pub fn tags(&self) -> &Map<String, Value> {
        static EMPTY: Lazy<Map<String, Value>> = Lazy::new(Map::new);
        self.properties
            .get("Tags")
            .and_then(Value::as_object)
            .unwrap_or(&EMPTY)
    }

    pub fn tags_mut(&mut self) -> &mut Map<String, Value> {
        self.ensure_tags();
        self.properties
            .get_mut("Tags")
            .and_then(Value::as_object_mut)
            .expect("Tags coerced to object")
    }

    /// Stable identity across turns: normalized kind + case-folded name.
    pub fn identity(&self) -> (String, String) {
        (self.kind.clone(), self.name.to_lowercase())
    }

    /// Terraform label for this resource.
    pub fn label(&self) -> String {
        safe_id(&self.name)
    }

    /// Fetch a property as a string slice.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Merge a newer description of the same resource into this one.
    ///
    /// Non-Tag properties overwrite; `Tags` union-merges with the incoming
    /// keys winning. The first-mention name and platform are kept.
    pub fn merge_from(&mut self, incoming: CanonicalResource) {
        let mut incoming_tags: Map<String, Value> = Map::new();
        for (key, value) in incoming.properties {
            if key == "Tags" {
                if let Value::Object(map) = value {
                    incoming_tags = map;
                }
            } else {
                self.properties.insert(key, value);
            }
        }
        let tags = self.tags_mut();
        for (key, value) in incoming_tags {
            // Case-insensitive replacement so `project` overrides `Project`.
            if let Some(existing) = tags.keys().find(|k| k.eq_ignore_ascii_case(&key)).cloned() {
                tags.remove(&existing);
            }
            tags.insert(key, value);
        }
        self.normalize();
    }
}

/// Merge newly-extracted resources into the session list, preserving the
/// order of first mention.
pub fn merge_resources(existing: &mut Vec<CanonicalResource>, incoming: Vec<CanonicalResource>) {
    for mut resource in incoming {
        resource.normalize();
        let identity = resource.identity();
        match existing.iter_mut().find(|r| r.identity() == identity) {
            Some(current) => current.merge_from(resource),
            None => existing.push(resource),
        }
    }
}
