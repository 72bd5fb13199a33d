//! Code generator stage.

use async_trait::async_trait;
use std::sync::Arc;

use tfgen_core::{Next, Phase, Stage, StageError, StageKind, WorkflowState};
use tfgen_render::{generate_project, RenderFailure, TemplateEngine};

/// A populated main.tf below this size means a template silently produced
/// nothing.
const MIN_MAIN_TF_BYTES: usize = 50;

/// Dispatches every canonical resource to its template and assembles the
/// Terraform project.
pub struct CodeGeneratorStage {
    engine: Arc<TemplateEngine>,
}

impl CodeGeneratorStage {
    pub fn new(engine: Arc<TemplateEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Stage for CodeGeneratorStage {
    fn kind(&self) -> StageKind {
        StageKind::Generate
    }

    async fn run(&self, state: &mut WorkflowState) -> Result<Next, StageError> {
        state.phase = Phase::GeneratingCode;

        let bundle = generate_project(&self.engine, &state.resources).map_err(|e| match e {
            RenderFailure::MissingTemplate {
                resource,
                platform,
                kind,
                available,
            } => StageError::Template {
                resource,
                platform,
                kind,
                available,
            },
            RenderFailure::Render { resource, message } => {
                StageError::Internal(format!("rendering '{resource}': {message}"))
            }
        })?;

        if !state.resources.is_empty() {
            let main_len = bundle.files.get("main.tf").map_or(0, String::len);
            if main_len < MIN_MAIN_TF_BYTES {
                return Err(StageError::EmptyOutput {
                    file: "main.tf".to_string(),
                    bytes: main_len,
                });
            }
        }

        tracing::info!(
            session = %state.session_id,
            files = bundle.files.len(),
            hash = %bundle.bundle_hash,
            "generated terraform project"
        );

        let file_list = bundle.files.keys().cloned().collect::<Vec<_>>().join(", ");
        state.generated_code = bundle.files;
        state.push_assistant(format!(
            "Successfully generated Terraform code.\n\n**Files created:** {file_list}\n\
             **Resource count:** {}\n\nThe code is ready for review.",
            state.resources.len()
        ));
        Ok(Next::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tfgen_core::{CanonicalResource, Platform};

    fn stage() -> CodeGeneratorStage {
        CodeGeneratorStage::new(Arc::new(TemplateEngine::new()))
    }

    #[tokio::test]
    async fn test_generates_full_bundle() {
        let mut state = WorkflowState::new("s1");
        let mut vm = CanonicalResource::new(Platform::Azure, "azure_vm", "app-vm");
        for (key, value) in [
            ("ResourceGroup", json!("rg")),
            ("Location", json!("eastus")),
            ("VMSize", json!("Standard_B2s")),
            ("AdminUsername", json!("azureadmin")),
            ("OSType", json!("Linux")),
            ("SshPublicKey", json!("ssh-rsa AAA")),
        ] {
            vm.properties.insert(key.to_string(), value);
        }
        state.resources.push(vm);

        let next = stage().run(&mut state).await.unwrap();
        assert_eq!(next, Next::Continue);
        for file in ["provider.tf", "variables.tf", "main.tf", "outputs.tf", "README.md"] {
            assert!(state.generated_code.contains_key(file), "missing {file}");
        }
        assert!(state.generated_code["main.tf"].contains("azurerm_linux_virtual_machine"));
    }

    #[tokio::test]
    async fn test_missing_template_is_template_error() {
        let mut state = WorkflowState::new("s1");
        state
            .resources
            .push(CanonicalResource::new(Platform::Aws, "aws_quantum_db", "q"));

        let err = stage().run(&mut state).await.unwrap_err();
        assert!(matches!(err, StageError::Template { .. }));
        assert!(state.generated_code.is_empty());
    }
}
