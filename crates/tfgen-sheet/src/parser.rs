//! Workbook rows to canonical resources.

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

use tfgen_core::{normalize_kind, CanonicalResource, Platform};

use crate::{Sheet, Workbook};

/// Columns whose string cells carry embedded JSON.
static JSON_COLUMNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Tags",
        "IngressRules",
        "EgressRules",
        "SecurityRules",
        "DataDisks",
        "LifecycleRules",
        "NetworkRules",
        "FirewallRules",
        "VirtualNetworkRules",
    ]
    .into_iter()
    .collect()
});

/// Columns that must materialize as native lists so templates can iterate.
static LIST_COLUMNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
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
    ]
    .into_iter()
    .collect()
});

/// Outcome of parsing one workbook.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestResult {
    pub success: bool,
    pub resource_count: usize,
    pub resource_types: Vec<String>,
    pub resources: Vec<CanonicalResource>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Parses workbook sheets into canonical resources.
#[derive(Debug, Default)]
pub struct SheetParser;

impl SheetParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, workbook: &Workbook) -> IngestResult {
        let mut result = IngestResult::default();

        for sheet in &workbook.sheets {
            if sheet.name.eq_ignore_ascii_case("readme") {
                continue;
            }
            let Some((platform, kind)) = sheet_identity(&sheet.name) else {
                result
                    .warnings
                    .push(format!("Skipping unknown sheet: {}", sheet.name));
                continue;
            };

            let before = result.resources.len();
            self.parse_sheet(sheet, platform, &kind, &mut result);
            if result.resources.len() > before && !result.resource_types.contains(&kind) {
                result.resource_types.push(kind);
            }
        }

        result.resource_count = result.resources.len();
        result.success = result.errors.is_empty();
        result
    }

    fn parse_sheet(
        &self,
        sheet: &Sheet,
        platform: Platform,
        kind: &str,
        result: &mut IngestResult,
    ) {
        let headers: Vec<String> = sheet
            .headers
            .iter()
            .map(|h| h.trim().trim_end_matches('*').to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            result
                .errors
                .push(format!("Sheet {}: no headers found", sheet.name));
            return;
        }

        for (row_idx, row) in sheet.rows.iter().enumerate() {
            if row.iter().all(Value::is_null) {
                continue;
            }

            let mut properties = Map::new();
            let mut resource_name: Option<String> = None;

            for (col_idx, cell) in row.iter().enumerate() {
                let Some(header) = headers.get(col_idx) else {
                    break;
                };
                if header.is_empty() || cell.is_null() {
                    continue;
                }

                let converted = convert_cell(cell, header, &sheet.name, &mut result.warnings);
                if header == "ResourceName" {
                    if let Some(name) = converted.as_str() {
                        resource_name = Some(name.to_string());
                    }
                }
                properties.insert(header.clone(), converted);
            }

            let Some(name) = resource_name.filter(|n| !n.trim().is_empty()) else {
                result.warnings.push(format!(
                    "Sheet {}, row {}: missing ResourceName, skipping row",
                    sheet.name,
                    row_idx + 2
                ));
                continue;
            };

            inject_safe_defaults(kind, &mut properties);

            let mut resource = CanonicalResource {
                platform,
                kind: kind.to_string(),
                name,
                properties,
            };
            resource.normalize();
            result.resources.push(resource);
        }
    }
}

/// `AWS_EC2` → (aws, aws_ec2); `Azure_VM` → (azure, azure_vm).
fn sheet_identity(sheet_name: &str) -> Option<(Platform, String)> {
    let (prefix, raw_kind) = sheet_name.split_once('_')?;
    let platform = Platform::parse(prefix)?;
    let (kind, known) = normalize_kind(raw_kind, Some(platform));
    if !known {
        return None;
    }
    Some((platform, kind))
}

fn convert_cell(cell: &Value, header: &str, sheet: &str, warnings: &mut Vec<String>) -> Value {
    // Non-string cells pass through untouched.
    let Some(text) = cell.as_str() else {
        return cell.clone();
    };
    let text = text.trim();

    if JSON_COLUMNS.contains(header) {
        return match serde_json::from_str::<Value>(text) {
            Ok(parsed) => parsed,
            Err(_) => {
                warnings.push(format!(
                    "Sheet {sheet}: invalid JSON in column {header}: {}",
                    truncate(text, 50)
                ));
                Value::String(text.to_string())
            }
        };
    }

    if LIST_COLUMNS.contains(header) {
        let items: Vec<Value> = text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect();
        return Value::Array(items);
    }

    match text.to_lowercase().as_str() {
        "true" | "yes" => return Value::Bool(true),
        "false" | "no" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(n) = text.parse::<i64>() {
        return Value::Number(n.into());
    }

    Value::String(text.to_string())
}

/// Secure defaults are injected at ingestion, never inside templates.
fn inject_safe_defaults(kind: &str, properties: &mut Map<String, Value>) {
    match kind {
        "aws_s3" => {
            properties
                .entry("PublicAccess".to_string())
                .or_insert(Value::Bool(false));
        }
        "azure_storage" => {
            properties
                .entry("EnableHttpsTrafficOnly".to_string())
                .or_insert(Value::Bool(true));
            properties
                .entry("MinTlsVersion".to_string())
                .or_insert(Value::String("TLS1_2".to_string()));
        }
        _ => {}
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        text
    } else {
        &text[..max]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workbook_with(sheet: Sheet) -> Workbook {
        Workbook {
            sheets: vec![sheet],
        }
    }

    #[test]
    fn test_sheet_identity() {
        assert_eq!(
            sheet_identity("AWS_EC2"),
            Some((Platform::Aws, "aws_ec2".to_string()))
        );
        assert_eq!(
            sheet_identity("Azure_VM"),
            Some((Platform::Azure, "azure_vm".to_string()))
        );
        assert_eq!(
            sheet_identity("Azure_Subnet"),
            Some((Platform::Azure, "azure_subnet".to_string()))
        );
        assert!(sheet_identity("Notes").is_none());
    }

    #[test]
    fn test_metadata_mirrored_into_tags() {
        let mut sheet = Sheet::new(
            "Azure_Storage",
            vec!["ResourceName*", "ResourceGroup", "Project", "Environment", "Tags"],
        );
        sheet.push_row(vec![
            json!("acct1"),
            json!("rg-demo"),
            json!("abc"),
            json!("Production"),
            json!(r#"{"App": "Web"}"#),
        ]);

        let result = SheetParser::new().parse(&workbook_with(sheet));
        assert!(result.success);
        assert_eq!(result.resource_count, 1);

        let tags = result.resources[0].tags();
        assert_eq!(tags.get("App").unwrap(), "Web");
        assert_eq!(tags.get("Project").unwrap(), "abc");
        assert_eq!(tags.get("Environment").unwrap(), "Production");
    }

    #[test]
    fn test_list_columns_materialize_as_lists() {
        let mut sheet = Sheet::new(
            "Azure_VNet",
            vec!["ResourceName", "AddressSpace", "DnsServers"],
        );
        sheet.push_row(vec![
            json!("vnet1"),
            json!("10.0.0.0/16, 10.1.0.0/16"),
            json!("8.8.8.8"),
        ]);

        let result = SheetParser::new().parse(&workbook_with(sheet));
        let props = &result.resources[0].properties;
        assert_eq!(
            props.get("AddressSpace").unwrap(),
            &json!(["10.0.0.0/16", "10.1.0.0/16"])
        );
        assert_eq!(props.get("DnsServers").unwrap(), &json!(["8.8.8.8"]));
    }

    #[test]
    fn test_safe_defaults_injected() {
        let mut s3 = Sheet::new("AWS_S3", vec!["ResourceName", "Region", "BucketName"]);
        s3.push_row(vec![json!("logs"), json!("us-east-1"), json!("logs-bkt")]);
        let mut storage = Sheet::new(
            "Azure_Storage",
            vec!["ResourceName", "ResourceGroup", "Location", "StorageAccountName"],
        );
        storage.push_row(vec![
            json!("acct"),
            json!("rg"),
            json!("eastus"),
            json!("acctstore"),
        ]);

        let result = SheetParser::new().parse(&Workbook {
            sheets: vec![s3, storage],
        });

        let s3_props = &result.resources[0].properties;
        assert_eq!(s3_props.get("PublicAccess").unwrap(), &json!(false));

        let storage_props = &result.resources[1].properties;
        assert_eq!(storage_props.get("EnableHttpsTrafficOnly").unwrap(), &json!(true));
        assert_eq!(storage_props.get("MinTlsVersion").unwrap(), &json!("TLS1_2"));
    }

    #[test]
    fn test_row_without_name_warns_and_skips() {
        let mut sheet = Sheet::new("AWS_EC2", vec!["ResourceName", "Region"]);
        sheet.push_row(vec![Value::Null, json!("us-east-1")]);
        sheet.push_row(vec![json!("web"), json!("us-east-1")]);

        let result = SheetParser::new().parse(&workbook_with(sheet));
        assert_eq!(result.resource_count, 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("ResourceName"));
    }

    #[test]
    fn test_cell_coercion() {
        let mut sheet = Sheet::new(
            "AWS_EC2",
            vec!["ResourceName", "Region", "Count", "Monitoring", "IngressRules"],
        );
        sheet.push_row(vec![
            json!("web"),
            json!("us-east-1"),
            json!("3"),
            json!("yes"),
            json!(r#"[{"to_port": 22, "cidr_blocks": ["0.0.0.0/0"]}]"#),
        ]);

        let result = SheetParser::new().parse(&workbook_with(sheet));
        let props = &result.resources[0].properties;
        assert_eq!(props.get("Count").unwrap(), &json!(3));
        assert_eq!(props.get("Monitoring").unwrap(), &json!(true));
        assert_eq!(
            props.get("IngressRules").unwrap()[0]["to_port"],
            json!(22)
        );
    }
}
