//! Resource rendering through the template registry.

use handlebars::Handlebars;
use serde_json::json;

use tfgen_core::CanonicalResource;

use crate::helpers;
use crate::registry;

#[derive(Debug, thiserror::Error)]
pub enum RenderFailure {
    #[error("no template for {platform} kind '{kind}' (resource '{resource}'); available: {available}")]
    MissingTemplate {
        resource: String,
        platform: String,
        kind: String,
        available: String,
    },

    #[error("rendering '{resource}' failed: {message}")]
    Render { resource: String, message: String },
}

/// Compiled renderer with every registry template and helper registered.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        // Output is HCL, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);
        helpers::register(&mut handlebars);

        for (kind, source) in registry::TEMPLATES {
            handlebars
                .register_template_string(kind, source)
                .unwrap_or_else(|e| panic!("template '{kind}' failed to parse: {e}"));
        }

        Self { handlebars }
    }

    /// Render one resource's Terraform block(s).
    pub fn render_resource(&self, resource: &CanonicalResource) -> Result<String, RenderFailure> {
        if registry::template_for(&resource.kind).is_none() {
            return Err(RenderFailure::MissingTemplate {
                resource: resource.name.clone(),
                platform: resource.platform.to_string(),
                kind: resource.kind.clone(),
                available: registry::available_kinds().join(", "),
            });
        }

        let data = json!({
            "resource_name": resource.label(),
            "name": resource.name,
            "platform": resource.platform,
            "properties": resource.properties,
        });

        self.handlebars
            .render(&resource.kind, &data)
            .map(|code| code.trim_end().to_string() + "\n")
            .map_err(|e| RenderFailure::Render {
                resource: resource.name.clone(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tfgen_core::Platform;

    fn resource(kind: &str, name: &str, properties: Value) -> CanonicalResource {
        let platform = Platform::from_kind(kind).unwrap();
        let mut resource = CanonicalResource::new(platform, kind, name);
        if let Value::Object(map) = properties {
            for (k, v) in map {
                resource.properties.insert(k, v);
            }
        }
        resource.normalize();
        resource
    }

    #[test]
    fn test_missing_template_lists_registry() {
        let engine = TemplateEngine::new();
        let bogus = CanonicalResource::new(Platform::Aws, "aws_quantum", "q");
        let err = engine.render_resource(&bogus).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("aws_quantum"));
        assert!(text.contains("aws_ec2"));
    }

    #[test]
    fn test_ec2_renders_safe_identifier_and_tags() {
        let engine = TemplateEngine::new();
        let code = engine
            .render_resource(&resource(
                "aws_ec2",
                "Web-Server",
                json!({
                    "Region": "us-east-1",
                    "InstanceType": "t2.micro",
                    "AMI": "ami-0c55b159cbfafe1f0",
                    "Tags": {"Project": "Demo"}
                }),
            ))
            .unwrap();

        assert!(code.contains(r#"resource "aws_instance" "web_server""#));
        assert!(code.contains(r#"ami           = "ami-0c55b159cbfafe1f0""#));
        assert!(code.contains(r#"Project = "Demo""#));
    }

    #[test]
    fn test_windows_vm_renders_password_auth_without_ssh() {
        let engine = TemplateEngine::new();
        let code = engine
            .render_resource(&resource(
                "azure_vm",
                "winbox",
                json!({
                    "ResourceGroup": "my-rg",
                    "Location": "eastus",
                    "VMSize": "Standard_B2s",
                    "AdminUsername": "azureadmin",
                    "AdminPassword": "S3cure!pass",
                    "OSType": "Windows"
                }),
            ))
            .unwrap();

        assert!(code.contains("azurerm_windows_virtual_machine"));
        assert!(code.contains(r#"admin_password      = "S3cure!pass""#));
        assert!(!code.contains("admin_ssh_key"));
    }

    #[test]
    fn test_linux_vm_renders_ssh_auth() {
        let engine = TemplateEngine::new();
        let code = engine
            .render_resource(&resource(
                "azure_vm",
                "appbox",
                json!({
                    "ResourceGroup": "my-rg",
                    "Location": "eastus",
                    "VMSize": "Standard_B2s",
                    "AdminUsername": "azureadmin",
                    "OSType": "Linux",
                    "SshPublicKey": "ssh-rsa AAAA"
                }),
            ))
            .unwrap();

        assert!(code.contains("azurerm_linux_virtual_machine"));
        assert!(code.contains("disable_password_authentication = true"));
        assert!(code.contains("admin_ssh_key"));
        assert!(!code.contains("admin_password"));
    }

    #[test]
    fn test_vnet_address_space_is_native_list() {
        let engine = TemplateEngine::new();
        let code = engine
            .render_resource(&resource(
                "azure_vnet",
                "main-vnet",
                json!({
                    "ResourceGroup": "my-rg",
                    "Location": "eastus",
                    "AddressSpace": ["10.0.0.0/16", "10.1.0.0/16"]
                }),
            ))
            .unwrap();

        assert!(code.contains(r#"address_space       = ["10.0.0.0/16","10.1.0.0/16"]"#));
        assert!(code.contains("azurerm_resource_group.my_rg.name"));
    }

    #[test]
    fn test_existing_resource_group_stays_literal() {
        let engine = TemplateEngine::new();
        let code = engine
            .render_resource(&resource(
                "azure_storage",
                "acct",
                json!({
                    "ResourceGroup": "prod-rg",
                    "ResourceGroupExists": "y",
                    "Location": "eastus",
                    "StorageAccountName": "acctstore"
                }),
            ))
            .unwrap();

        assert!(code.contains(r#"resource_group_name             = "prod-rg""#));
        assert!(!code.contains("azurerm_resource_group.prod_rg"));
        // Safe defaults from ingestion surface as v4.x parameter names.
        assert!(code.contains("https_traffic_only_enabled"));
        assert!(code.contains("allow_nested_items_to_be_public = false"));
    }

    #[test]
    fn test_security_group_iterates_rules() {
        let engine = TemplateEngine::new();
        let code = engine
            .render_resource(&resource(
                "aws_security_group",
                "web-sg",
                json!({
                    "VPC": "main-vpc",
                    "Description": "web tier",
                    "IngressRules": [
                        {"to_port": 80, "cidr_blocks": ["0.0.0.0/0"]},
                        {"to_port": 443, "cidr_blocks": ["0.0.0.0/0"]}
                    ]
                }),
            ))
            .unwrap();

        assert_eq!(code.matches("ingress {").count(), 2);
        assert!(code.contains("vpc_id = aws_vpc.main_vpc.id"));
    }
}
