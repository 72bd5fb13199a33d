//! Project assembly: provider, variables, main, outputs, README.

use std::collections::{BTreeMap, BTreeSet};

use tfgen_core::{safe_id, CanonicalResource, Platform};

use crate::fixups;
use crate::renderer::{RenderFailure, TemplateEngine};

/// The complete generated file bundle plus a determinism witness: the same
/// canonical resource list always produces the same hash.
#[derive(Debug, Clone)]
pub struct ProjectBundle {
    pub files: BTreeMap<String, String>,
    pub bundle_hash: String,
}

/// Render every resource and assemble the project files.
pub fn generate_project(
    engine: &TemplateEngine,
    resources: &[CanonicalResource],
) -> Result<ProjectBundle, RenderFailure> {
    let mut files = BTreeMap::new();

    files.insert("provider.tf".to_string(), generate_provider(resources));
    files.insert("variables.tf".to_string(), generate_variables(resources));

    let mut main = String::from("# Generated Terraform configuration\n\n");
    for (label, (group, location)) in implicit_resource_groups(resources) {
        main.push_str(&format!(
            "resource \"azurerm_resource_group\" \"{label}\" {{\n  name     = \"{group}\"\n  location = \"{location}\"\n}}\n\n"
        ));
    }
    for resource in resources {
        let block = engine.render_resource(resource)?;
        main.push_str(&block);
        main.push('\n');
    }
    files.insert("main.tf".to_string(), main.trim_end().to_string() + "\n");

    files.insert("outputs.tf".to_string(), generate_outputs(resources));
    files.insert("README.md".to_string(), generate_readme(resources));

    fixups::apply(&mut files);

    let bundle_hash = bundle_hash(&files);
    Ok(ProjectBundle { files, bundle_hash })
}

/// Azure resource groups referenced but not marked existing and not defined
/// as explicit resources; keyed by label for deterministic emission order.
fn implicit_resource_groups(
    resources: &[CanonicalResource],
) -> BTreeMap<String, (String, String)> {
    let explicit: BTreeSet<String> = resources
        .iter()
        .filter(|r| r.kind == "azure_resource_group")
        .map(|r| r.label())
        .collect();

    let mut groups = BTreeMap::new();
    for resource in resources {
        if resource.platform != Platform::Azure || resource.kind == "azure_resource_group" {
            continue;
        }
        let Some(group) = resource.prop_str("ResourceGroup") else {
            continue;
        };
        if crate::helpers::flag_is_set(resource.properties.get("ResourceGroupExists")) {
            continue;
        }
        let label = safe_id(group);
        if explicit.contains(&label) {
            continue;
        }
        let location = resource.prop_str("Location").unwrap_or("eastus").to_string();
        groups.entry(label).or_insert((group.to_string(), location));
    }
    groups
}

/// Declare only the platforms actually present.
fn generate_provider(resources: &[CanonicalResource]) -> String {
    let has_aws = resources.iter().any(|r| r.platform == Platform::Aws);
    let has_azure = resources.iter().any(|r| r.platform == Platform::Azure);

    let mut required = String::new();
    let mut providers = String::new();

    if has_aws {
        required.push_str(
            "    aws = {\n      source  = \"hashicorp/aws\"\n      version = \"~> 5.0\"\n    }\n",
        );
        providers.push_str("provider \"aws\" {\n  region = var.aws_region\n}\n\n");
    }
    if has_azure {
        required.push_str(
            "    azurerm = {\n      source  = \"hashicorp/azurerm\"\n      version = \"~> 4.0\"\n    }\n",
        );
        providers.push_str(
            "provider \"azurerm\" {\n  features {}\n  subscription_id = var.azure_subscription_id\n}\n\n",
        );
    }

    if required.is_empty() {
        return "# No providers required\n".to_string();
    }

    format!(
        "terraform {{\n  required_version = \">= 1.0\"\n\n  required_providers {{\n{required}  }}\n}}\n\n{providers}"
    )
    .trim_end()
    .to_string()
        + "\n"
}

/// Declare the variables the provider blocks reference.
fn generate_variables(resources: &[CanonicalResource]) -> String {
    let has_aws = resources.iter().any(|r| r.platform == Platform::Aws);
    let has_azure = resources.iter().any(|r| r.platform == Platform::Azure);

    let mut code = String::from("# Variables\n\n");
    if has_aws {
        let region = resources
            .iter()
            .filter(|r| r.platform == Platform::Aws)
            .find_map(|r| r.prop_str("Region"))
            .unwrap_or("us-east-1");
        code.push_str(&format!(
            "variable \"aws_region\" {{\n  description = \"AWS region for resources\"\n  type        = string\n  default     = \"{region}\"\n}}\n\n"
        ));
    }
    if has_azure {
        code.push_str(
            "variable \"azure_subscription_id\" {\n  description = \"Azure subscription ID\"\n  type        = string\n}\n\n",
        );
    }
    code.trim_end().to_string() + "\n"
}

/// Export primary identifiers per resource kind.
fn generate_outputs(resources: &[CanonicalResource]) -> String {
    let mut code = String::from("# Outputs\n\n");

    for resource in resources {
        let label = resource.label();
        match resource.kind.as_str() {
            "aws_vpc" => {
                output(&mut code, &format!("{label}_vpc_id"), "VPC id", &format!("aws_vpc.{label}.id"), false);
            }
            "aws_ec2" => {
                output(&mut code, &format!("{label}_instance_id"), "EC2 instance id", &format!("aws_instance.{label}.id"), false);
                output(&mut code, &format!("{label}_private_ip"), "EC2 private IP", &format!("aws_instance.{label}.private_ip"), false);
            }
            "aws_s3" => {
                output(&mut code, &format!("{label}_bucket_name"), "S3 bucket name", &format!("aws_s3_bucket.{label}.id"), false);
                output(&mut code, &format!("{label}_bucket_arn"), "S3 bucket ARN", &format!("aws_s3_bucket.{label}.arn"), false);
            }
            "aws_rds" => {
                output(&mut code, &format!("{label}_endpoint"), "RDS endpoint", &format!("aws_db_instance.{label}.endpoint"), false);
            }
            "aws_subnet" => {
                output(&mut code, &format!("{label}_subnet_id"), "Subnet id", &format!("aws_subnet.{label}.id"), false);
            }
            "aws_security_group" => {
                output(&mut code, &format!("{label}_security_group_id"), "Security group id", &format!("aws_security_group.{label}.id"), false);
            }
            "aws_load_balancer" => {
                output(&mut code, &format!("{label}_lb_dns_name"), "Load balancer DNS name", &format!("aws_lb.{label}.dns_name"), false);
            }
            "aws_elastic_ip" => {
                output(&mut code, &format!("{label}_public_ip"), "Elastic IP address", &format!("aws_eip.{label}.public_ip"), false);
            }
            "azure_vm" => {
                let os = resource
                    .prop_str("OSType")
                    .unwrap_or("Linux")
                    .to_lowercase();
                output(&mut code, &format!("{label}_vm_id"), "VM id", &format!("azurerm_{os}_virtual_machine.{label}.id"), false);
                output(&mut code, &format!("{label}_private_ip"), "VM private IP", &format!("azurerm_network_interface.{label}_nic.private_ip_address"), false);
                if crate::helpers::flag_is_set(resource.properties.get("AssignPublicIP")) {
                    output(&mut code, &format!("{label}_public_ip"), "VM public IP", &format!("azurerm_public_ip.{label}_pip.ip_address"), false);
                }
            }
            "azure_vnet" => {
                output(&mut code, &format!("{label}_vnet_id"), "VNet id", &format!("azurerm_virtual_network.{label}.id"), false);
            }
            "azure_subnet" => {
                output(&mut code, &format!("{label}_subnet_id"), "Subnet id", &format!("azurerm_subnet.{label}.id"), false);
            }
            "azure_nsg" => {
                output(&mut code, &format!("{label}_nsg_id"), "NSG id", &format!("azurerm_network_security_group.{label}.id"), false);
            }
            "azure_storage" => {
                output(&mut code, &format!("{label}_storage_account_name"), "Storage account name", &format!("azurerm_storage_account.{label}.name"), false);
                output(&mut code, &format!("{label}_primary_blob_endpoint"), "Primary blob endpoint", &format!("azurerm_storage_account.{label}.primary_blob_endpoint"), false);
                output(&mut code, &format!("{label}_primary_access_key"), "Primary access key", &format!("azurerm_storage_account.{label}.primary_access_key"), true);
            }
            "azure_sql" => {
                output(&mut code, &format!("{label}_sql_server_fqdn"), "SQL server FQDN", &format!("azurerm_mssql_server.{label}_server.fully_qualified_domain_name"), false);
                output(&mut code, &format!("{label}_sql_database_id"), "SQL database id", &format!("azurerm_mssql_database.{label}.id"), false);
            }
            "azure_public_ip" => {
                output(&mut code, &format!("{label}_ip_address"), "Public IP address", &format!("azurerm_public_ip.{label}.ip_address"), false);
            }
            "azure_load_balancer" => {
                output(&mut code, &format!("{label}_lb_id"), "Load balancer id", &format!("azurerm_lb.{label}.id"), false);
            }
            _ => {}
        }
    }

    if code == "# Outputs\n\n" {
        return "# No outputs defined\n".to_string();
    }
    code.trim_end().to_string() + "\n"
}

fn output(code: &mut String, name: &str, description: &str, value: &str, sensitive: bool) {
    code.push_str(&format!(
        "output \"{name}\" {{\n  description = \"{description}\"\n  value       = {value}\n"
    ));
    if sensitive {
        code.push_str("  sensitive   = true\n");
    }
    code.push_str("}\n\n");
}

/// Resources grouped by normalized kind with counts, plus run instructions.
fn generate_readme(resources: &[CanonicalResource]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for resource in resources {
        *counts.entry(resource.kind.as_str()).or_default() += 1;
    }

    let plural = if resources.len() == 1 { "" } else { "s" };
    let mut readme = format!(
        "# Terraform Infrastructure Configuration\n\n\
         This configuration was generated from your infrastructure request.\n\n\
         ## Resources\n\n\
         This configuration will create **{}** resource{plural}:\n\n",
        resources.len()
    );
    for (kind, count) in counts {
        readme.push_str(&format!("- {count} x {kind}\n"));
    }
    readme.push_str(
        "\n## Deployment\n\n\
         1. `terraform init`\n\
         2. `terraform plan`\n\
         3. `terraform apply`\n\n\
         To tear everything down again: `terraform destroy`.\n\n\
         ## Files\n\n\
         - `provider.tf` - provider configuration\n\
         - `variables.tf` - input variables\n\
         - `main.tf` - resource definitions\n\
         - `outputs.tf` - output values\n",
    );
    readme
}

/// Stable hash over the assembled bundle.
fn bundle_hash(files: &BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (name, content) in files {
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        hasher.update(content.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize())
}
