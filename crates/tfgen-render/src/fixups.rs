//! Azure provider v4.x compatibility fixups.
//!
//! Applied to assembled `.tf` files as a final pass. Templates should not
//! produce the deprecated forms, but code regenerated from review feedback
//! passes through here too.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

static RESOURCE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^resource\s+"([a-z0-9_]+)""#).unwrap());

pub fn apply(files: &mut BTreeMap<String, String>) {
    for (name, content) in files.iter_mut() {
        if !name.ends_with(".tf") {
            continue;
        }
        let fixed = fix_file(content);
        if fixed != *content {
            tracing::debug!(file = %name, "applied azure compatibility fixups");
            *content = fixed;
        }
    }
}

fn fix_file(content: &str) -> String {
    // Renames valid everywhere.
    let content = content
        .replace("enable_https_traffic_only", "https_traffic_only_enabled")
        .replace("allow_blob_public_access", "allow_nested_items_to_be_public");

    let mut out: Vec<String> = Vec::new();
    let mut current_resource = String::new();
    let mut depth: i32 = 0;
    let mut skip_until_balance: i32 = -1;

    for line in content.lines() {
        if depth == 0 {
            if let Some(caps) = RESOURCE_HEADER.captures(line.trim_start()) {
                current_resource = caps[1].to_string();
            }
        }

        let opens = line.matches('{').count() as i32;
        let closes = line.matches('}').count() as i32;

        if skip_until_balance >= 0 {
            skip_until_balance += opens - closes;
            if skip_until_balance <= 0 {
                skip_until_balance = -1;
            }
            depth += opens - closes;
            continue;
        }

        let trimmed = line.trim_start();
        let mut drop_line = false;

        // v4.x removed the inline NSG attachment on network interfaces.
        if current_resource == "azurerm_network_interface"
            && trimmed.starts_with("network_security_group_id")
        {
            drop_line = true;
        }

        // Subnets cannot carry tags; a tags block here fails at apply.
        if current_resource == "azurerm_subnet" && trimmed.starts_with("tags") {
            drop_line = true;
            if opens > closes {
                skip_until_balance = opens - closes;
            }
        }

        // minimum_tls_version is only wrong on storage accounts; mssql
        // servers legitimately use it.
        let line = if current_resource == "azurerm_storage_account" {
            line.replace("minimum_tls_version", "min_tls_version")
        } else {
            line.to_string()
        };

        depth += opens - closes;
        if depth == 0 {
            current_resource.clear();
        }
        if !drop_line {
            out.push(line);
        }
    }

    out.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(content: &str) -> String {
        let mut files = BTreeMap::new();
        files.insert("main.tf".to_string(), content.to_string());
        apply(&mut files);
        files.remove("main.tf").unwrap()
    }

    #[test]
    fn test_storage_account_renames() {
        let fixed = run(concat!(
            "resource \"azurerm_storage_account\" \"a\" {\n",
            "  enable_https_traffic_only = true\n",
            "  minimum_tls_version       = \"TLS1_2\"\n",
            "  allow_blob_public_access  = false\n",
            "}\n",
        ));
        assert!(fixed.contains("https_traffic_only_enabled"));
        assert!(fixed.contains("min_tls_version"));
        assert!(fixed.contains("allow_nested_items_to_be_public"));
        assert!(!fixed.contains("minimum_tls_version"));
    }

    #[test]
    fn test_mssql_minimum_tls_untouched() {
        let content = concat!(
            "resource \"azurerm_mssql_server\" \"s\" {\n",
            "  minimum_tls_version = \"1.2\"\n",
            "}\n",
        );
        assert_eq!(run(content), content);
    }

    #[test]
    fn test_nic_inline_nsg_dropped_association_kept() {
        let fixed = run(concat!(
            "resource \"azurerm_network_interface\" \"nic\" {\n",
            "  name                      = \"nic\"\n",
            "  network_security_group_id = azurerm_network_security_group.x.id\n",
            "}\n",
            "resource \"azurerm_network_interface_security_group_association\" \"a\" {\n",
            "  network_security_group_id = azurerm_network_security_group.x.id\n",
            "}\n",
        ));
        assert_eq!(fixed.matches("network_security_group_id").count(), 1);
        assert!(fixed.contains("security_group_association"));
    }

    #[test]
    fn test_subnet_tags_block_stripped() {
        let fixed = run(concat!(
            "resource \"azurerm_subnet\" \"s\" {\n",
            "  name = \"s\"\n",
            "  tags = {\n",
            "    Project = \"x\"\n",
            "  }\n",
            "}\n",
            "resource \"azurerm_virtual_network\" \"v\" {\n",
            "  tags = {\n",
            "    Project = \"x\"\n",
            "  }\n",
            "}\n",
        ));
        // Subnet lost its tags; the vnet kept them.
        let subnet_part = fixed.split("azurerm_virtual_network").next().unwrap();
        assert!(!subnet_part.contains("tags"));
        assert!(fixed.contains("Project = \"x\""));
    }

    #[test]
    fn test_non_tf_files_ignored() {
        let mut files = BTreeMap::new();
        files.insert(
            "README.md".to_string(),
            "enable_https_traffic_only".to_string(),
        );
        apply(&mut files);
        assert_eq!(files["README.md"], "enable_https_traffic_only");
    }
}
