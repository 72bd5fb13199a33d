//! Information collector stage: required-field detection and follow-ups.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tfgen_core::{
    is_known_kind, CanonicalResource, Next, Phase, Stage, StageError, StageKind, WorkflowState,
};

/// Required fields per normalized kind. An entry `"A|B"` is satisfied by
/// either column.
static REQUIRED_FIELDS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    m.insert("aws_ec2", &["Region", "InstanceType", "AMI|AMI_ID"]);
    m.insert("aws_vpc", &["Region", "CIDR_Block"]);
    m.insert("aws_s3", &["Region", "BucketName"]);
    m.insert(
        "aws_rds",
        &[
            "Region",
            "Engine",
            "InstanceClass",
            "AllocatedStorage",
            "DBName",
            "MasterUsername",
            "MasterPassword",
        ],
    );
    m.insert("aws_subnet", &["VPC", "CIDR_Block"]);
    m.insert("aws_security_group", &["VPC", "Description", "IngressRules"]);
    m.insert("aws_internet_gateway", &["Region", "VPC"]);
    m.insert("aws_nat_gateway", &["Region", "Subnet"]);
    m.insert("aws_elastic_ip", &["Region"]);
    m.insert("aws_load_balancer", &["Region", "Type", "Scheme", "Subnets"]);
    m.insert(
        "azure_vm",
        &["ResourceGroup", "Location", "VMSize", "AdminUsername", "OSType"],
    );
    m.insert("azure_vnet", &["ResourceGroup", "Location", "AddressSpace"]);
    m.insert(
        "azure_subnet",
        &["ResourceGroup", "VNet", "AddressPrefix|AddressPrefixes"],
    );
    m.insert("azure_nsg", &["ResourceGroup", "Location"]);
    m.insert(
        "azure_storage",
        &["ResourceGroup", "Location", "StorageAccountName"],
    );
    m.insert(
        "azure_sql",
        &["ResourceGroup", "Location", "AdminUsername", "AdminPassword"],
    );
    m.insert("azure_public_ip", &["ResourceGroup", "Location"]);
    m.insert("azure_nat_gateway", &["ResourceGroup", "Location"]);
    m.insert("azure_load_balancer", &["ResourceGroup", "Location"]);
    m.insert("azure_resource_group", &["Location"]);
    m
});

fn value_is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

/// Fields absent or empty on this resource.
pub fn missing_fields_for(resource: &CanonicalResource) -> BTreeSet<String> {
    let mut missing = BTreeSet::new();

    if let Some(required) = REQUIRED_FIELDS.get(resource.kind.as_str()) {
        for field in required.iter() {
            let satisfied = field
                .split('|')
                .any(|alt| !value_is_empty(resource.properties.get(alt)));
            if !satisfied {
                missing.insert(field.split('|').next().unwrap_or(field).to_string());
            }
        }
    }

    // Authentication depends on the OS: Windows needs a password, Linux
    // needs a password or an SSH key.
    if resource.kind == "azure_vm" {
        let os = resource.prop_str("OSType").unwrap_or("Linux");
        let has_password = !value_is_empty(resource.properties.get("AdminPassword"));
        let has_key = !value_is_empty(resource.properties.get("SshPublicKey"));
        if os.eq_ignore_ascii_case("windows") {
            if !has_password {
                missing.insert("AdminPassword".to_string());
            }
        } else if !has_password && !has_key {
            missing.insert("SshPublicKey".to_string());
        }
    }

    missing
}

/// Checks completeness against the required-fields table and composes one
/// follow-up message when something is absent.
#[derive(Debug, Default)]
pub struct InformationCollectorStage;

impl InformationCollectorStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for InformationCollectorStage {
    fn kind(&self) -> StageKind {
        StageKind::Collect
    }

    async fn run(&self, state: &mut WorkflowState) -> Result<Next, StageError> {
        state.phase = Phase::CollectingInformation;

        if state.resources.is_empty() {
            state.push_assistant(
                "I have no resources to work with yet. Tell me what you would like to create.",
            );
            state.phase = Phase::WaitingForUser;
            return Ok(Next::Halt);
        }

        if state.information_complete {
            return Ok(Next::Continue);
        }

        let mut missing: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut unknown_kinds: Vec<String> = Vec::new();
        for resource in &state.resources {
            if !is_known_kind(&resource.kind) {
                unknown_kinds.push(format!("{} ({})", resource.name, resource.kind));
                continue;
            }
            let fields = missing_fields_for(resource);
            if !fields.is_empty() {
                missing.insert(resource.name.clone(), fields);
            }
        }
        state.missing_fields = missing.clone();

        if missing.is_empty() {
            state.information_complete = true;
            if !unknown_kinds.is_empty() {
                state.push_assistant(format!(
                    "Note: I don't have templates for: {}. These will fail at generation \
                     unless removed.",
                    unknown_kinds.join(", ")
                ));
            }
            return Ok(Next::Continue);
        }

        let mut message =
            String::from("I need a bit more information before I can generate the code:\n");
        for (resource, fields) in &missing {
            message.push_str(&format!(
                "\n**{resource}**\n{}",
                fields
                    .iter()
                    .map(|f| format!("- {f}\n"))
                    .collect::<String>()
            ));
        }
        message.push_str("\nYou can reply with values like `Region: us-east-1` or `Tags: Project=Demo`.");
        state.push_assistant(message);
        state.phase = Phase::WaitingForUser;
        Ok(Next::Halt)
    }
}
