//! Custom Handlebars helpers for HCL generation.
//!
//! - `safe_id`: identifier sanitization
//! - `hcl_map`: aligned HCL map literal (tags)
//! - `json`: JSON-encode a value
//! - `join`: join an array with a separator
//! - `default`: first non-null of value/fallback
//! - `eq`: case-insensitive equality block
//! - `exists`: truthiness of y/yes/true flags (subexpression)
//! - `fromjson`: parse embedded JSON strings (subexpression)
//! - `azure_rg_ref`: resource-group reference dispatch
//! - `rule_priority`: NSG rule priority from the loop index

use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
    Renderable, ScopedJson,
};
use serde_json::Value;

use tfgen_core::safe_id;

/// `"y"`, `"yes"`, `"true"`, `true` and `1` count as set.
pub fn flag_is_set(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => {
            matches!(s.trim().to_lowercase().as_str(), "y" | "yes" | "true")
        }
        _ => false,
    }
}

pub fn register(handlebars: &mut Handlebars<'_>) {
    handlebars.register_helper("safe_id", Box::new(SafeIdHelper));
    handlebars.register_helper("hcl_map", Box::new(HclMapHelper));
    handlebars.register_helper("json", Box::new(JsonHelper));
    handlebars.register_helper("join", Box::new(JoinHelper));
    handlebars.register_helper("default", Box::new(DefaultHelper));
    handlebars.register_helper("eq", Box::new(EqHelper));
    handlebars.register_helper("exists", Box::new(ExistsHelper));
    handlebars.register_helper("fromjson", Box::new(FromJsonHelper));
    handlebars.register_helper("azure_rg_ref", Box::new(AzureRgRefHelper));
    handlebars.register_helper("rule_priority", Box::new(RulePriorityHelper));
    handlebars.register_helper("as_list", Box::new(AsListHelper));
}

/// Sanitize a name into a Terraform label.
struct SafeIdHelper;

impl HelperDef for SafeIdHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let name = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
        out.write(&safe_id(name))?;
        Ok(())
    }
}

/// Render an object as an aligned HCL map literal.
///
/// `{"Owner": "Team", "Project": "Demo"}` becomes
/// ```text
/// {
///     Owner   = "Team"
///     Project = "Demo"
///   }
/// ```
struct HclMapHelper;

impl HelperDef for HclMapHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let Some(map) = h.param(0).and_then(|v| v.value().as_object()) else {
            out.write("{}")?;
            return Ok(());
        };
        if map.is_empty() {
            out.write("{}")?;
            return Ok(());
        }

        let max_len = map.keys().map(String::len).max().unwrap_or(0);
        let mut lines = vec!["{".to_string()];
        for (key, value) in map {
            let rendered = match value {
                Value::String(s) => format!("\"{s}\""),
                other => other.to_string(),
            };
            lines.push(format!("    {key:<max_len$} = {rendered}"));
        }
        lines.push("  }".to_string());
        out.write(&lines.join("\n"))?;
        Ok(())
    }
}

/// JSON-encode any value (lists of CIDRs, address spaces).
struct JsonHelper;

impl HelperDef for JsonHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = h.param(0).map(|v| v.value()).unwrap_or(&Value::Null);
        out.write(&serde_json::to_string(value).map_err(|e| RenderError::new(e.to_string()))?)?;
        Ok(())
    }
}

/// Join an array with a separator.
struct JoinHelper;

impl HelperDef for JoinHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let separator = h.param(1).and_then(|v| v.value().as_str()).unwrap_or(", ");
        if let Some(items) = h.param(0).and_then(|v| v.value().as_array()) {
            let parts: Vec<String> = items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            out.write(&parts.join(separator))?;
        }
        Ok(())
    }
}

/// First non-null, non-empty of the two parameters. Implemented as a value
/// helper so it also composes in subexpressions:
/// `{{#eq (default properties.ConnectivityType "public") "public"}}`.
struct DefaultHelper;

impl HelperDef for DefaultHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'reg, 'rc>, RenderError> {
        let value = h.param(0).map(|v| v.value());
        let fallback = h.param(1).map(|v| v.value());

        let chosen = match value {
            Some(v) if !v.is_null() && !v.as_str().is_some_and(|s| s.is_empty()) => Some(v),
            _ => fallback,
        };
        Ok(ScopedJson::Derived(
            chosen.cloned().unwrap_or(Value::Null),
        ))
    }
}

/// Case-insensitive equality block with an else branch.
struct EqHelper;

impl HelperDef for EqHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let left = h.param(0).map(|v| v.value());
        let right = h.param(1).map(|v| v.value());

        let equal = match (left, right) {
            (Some(Value::String(a)), Some(Value::String(b))) => a.eq_ignore_ascii_case(b),
            (Some(a), Some(b)) => a == b,
            _ => false,
        };

        if equal {
            if let Some(template) = h.template() {
                template.render(r, ctx, rc, out)?;
            }
        } else if let Some(template) = h.inverse() {
            template.render(r, ctx, rc, out)?;
        }
        Ok(())
    }
}

/// Truthiness of y/n style flags, for use in subexpressions:
/// `{{#if (exists properties.VPCExists)}}`.
struct ExistsHelper;

impl HelperDef for ExistsHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'reg, 'rc>, RenderError> {
        let set = flag_is_set(h.param(0).map(|v| v.value()));
        Ok(ScopedJson::Derived(Value::Bool(set)))
    }
}

/// Parse an embedded JSON string so templates can iterate complex nested
/// configs: `{{#each (fromjson properties.LifecycleRules)}}`.
struct FromJsonHelper;

impl HelperDef for FromJsonHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'reg, 'rc>, RenderError> {
        let value = h.param(0).map(|v| v.value()).unwrap_or(&Value::Null);
        let parsed = match value {
            Value::String(text) => serde_json::from_str::<Value>(text).unwrap_or(Value::Null),
            other => other.clone(),
        };
        Ok(ScopedJson::Derived(parsed))
    }
}

/// Emit a resource-group reference: a quoted literal when the group already
/// exists, otherwise a reference to the generated
/// `azurerm_resource_group` block.
struct AzureRgRefHelper;

impl HelperDef for AzureRgRefHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let Some(props) = h.param(0).and_then(|v| v.value().as_object()) else {
            return Err(RenderError::new("azure_rg_ref expects the properties object"));
        };
        let group = props
            .get("ResourceGroup")
            .and_then(Value::as_str)
            .unwrap_or("");
        if group.is_empty() {
            return Err(RenderError::new("azure_rg_ref: ResourceGroup is not set"));
        }

        if flag_is_set(props.get("ResourceGroupExists")) {
            out.write(&format!("\"{group}\""))?;
        } else {
            out.write(&format!("azurerm_resource_group.{}.name", safe_id(group)))?;
        }
        Ok(())
    }
}

/// NSG rule priority derived from the loop index: 100, 110, 120, ...
struct RulePriorityHelper;

impl HelperDef for RulePriorityHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'reg, 'rc>, RenderError> {
        let index = h.param(0).and_then(|v| v.value().as_u64()).unwrap_or(0);
        Ok(ScopedJson::Derived(Value::from(100 + index * 10)))
    }
}

/// Coerce a value into a list: arrays pass through, scalars wrap, null
/// stays empty. Lists must be native before templates iterate them.
struct AsListHelper;

impl HelperDef for AsListHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'reg, 'rc>, RenderError> {
        let value = h.param(0).map(|v| v.value()).unwrap_or(&Value::Null);
        let list = match value {
            Value::Array(_) => value.clone(),
            Value::Null => Value::Array(Vec::new()),
            other => Value::Array(vec![other.clone()]),
        };
        Ok(ScopedJson::Derived(list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> Handlebars<'static> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        register(&mut handlebars);
        handlebars
    }

    #[test]
    fn test_safe_id_helper() {
        let out = engine()
            .render_template("{{safe_id name}}", &json!({"name": "Web-Server"}))
            .unwrap();
        assert_eq!(out, "web_server");
    }

    #[test]
    fn test_hcl_map_alignment() {
        let out = engine()
            .render_template(
                "tags = {{hcl_map tags}}",
                &json!({"tags": {"Owner": "Team", "P": "x"}}),
            )
            .unwrap();
        assert!(out.contains("Owner = \"Team\""));
        assert!(out.contains("P     = \"x\""));
    }

    #[test]
    fn test_hcl_map_empty() {
        let out = engine()
            .render_template("{{hcl_map tags}}", &json!({"tags": {}}))
            .unwrap();
        assert_eq!(out, "{}");
    }

    #[test]
    fn test_exists_subexpression() {
        let template = "{{#if (exists flag)}}yes{{else}}no{{/if}}";
        let hb = engine();
        assert_eq!(hb.render_template(template, &json!({"flag": "y"})).unwrap(), "yes");
        assert_eq!(hb.render_template(template, &json!({"flag": "n"})).unwrap(), "no");
        assert_eq!(hb.render_template(template, &json!({})).unwrap(), "no");
    }

    #[test]
    fn test_eq_case_insensitive() {
        let template = r#"{{#eq os "Windows"}}win{{else}}linux{{/eq}}"#;
        let hb = engine();
        assert_eq!(hb.render_template(template, &json!({"os": "windows"})).unwrap(), "win");
        assert_eq!(hb.render_template(template, &json!({"os": "Linux"})).unwrap(), "linux");
    }

    #[test]
    fn test_azure_rg_ref_dispatch() {
        let hb = engine();
        let existing = json!({"properties": {"ResourceGroup": "my-rg", "ResourceGroupExists": "y"}});
        assert_eq!(
            hb.render_template("{{azure_rg_ref properties}}", &existing).unwrap(),
            "\"my-rg\""
        );

        let fresh = json!({"properties": {"ResourceGroup": "my-rg"}});
        assert_eq!(
            hb.render_template("{{azure_rg_ref properties}}", &fresh).unwrap(),
            "azurerm_resource_group.my_rg.name"
        );
    }

    #[test]
    fn test_fromjson_iteration() {
        let out = engine()
            .render_template(
                "{{#each (fromjson rules)}}{{this.port}};{{/each}}",
                &json!({"rules": "[{\"port\": 22}, {\"port\": 443}]"}),
            )
            .unwrap();
        assert_eq!(out, "22;443;");
    }

    #[test]
    fn test_json_helper_keeps_lists_native() {
        let out = engine()
            .render_template("{{json list}}", &json!({"list": ["10.0.0.0/16", "10.1.0.0/16"]}))
            .unwrap();
        assert_eq!(out, r#"["10.0.0.0/16","10.1.0.0/16"]"#);
    }

    #[test]
    fn test_default_inline_and_subexpression() {
        let hb = engine();
        assert_eq!(
            hb.render_template("{{default a \"fallback\"}}", &json!({"a": "set"})).unwrap(),
            "set"
        );
        assert_eq!(
            hb.render_template("{{default a \"fallback\"}}", &json!({"a": ""})).unwrap(),
            "fallback"
        );
        assert_eq!(
            hb.render_template(
                "{{#eq (default kind \"public\") \"public\"}}open{{else}}closed{{/eq}}",
                &json!({}),
            )
            .unwrap(),
            "open"
        );
    }

    #[test]
    fn test_rule_priority() {
        let out = engine()
            .render_template(
                "{{#each rules}}{{rule_priority @index}},{{/each}}",
                &json!({"rules": [1, 2, 3]}),
            )
            .unwrap();
        assert_eq!(out, "100,110,120,");
    }
}
