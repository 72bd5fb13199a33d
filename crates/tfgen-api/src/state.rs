//! Shared application state.

use std::sync::Arc;

use tfgen_core::{CanonicalResource, ProgressSink, WorkflowRunner, WorkflowState};
use tfgen_deploy::{ExecutorConfig, SecretBox, TerraformExecutor};
use tfgen_llm::{ChatClient, OpenAiClient};
use tfgen_policy::RuleCompiler;
use tfgen_sheet::SheetParser;
use tfgen_stages::build_pipeline;
use tfgen_store::{
    SqliteDeploymentStore, SqliteEnvironmentStore, SqlitePolicyStore, SqliteSessionStore,
};

pub struct AppState {
    pub runner: WorkflowRunner,
    pub policies: SqlitePolicyStore,
    pub environments: SqliteEnvironmentStore,
    pub deployments: SqliteDeploymentStore,
    /// Absent when no terraform binary was found; deployment endpoints
    /// answer 503 in that case.
    pub executor: Option<TerraformExecutor>,
    pub compiler: RuleCompiler,
    pub sheets: SheetParser,
}

impl AppState {
    /// Wire the full stack against a database URL. The LLM client comes
    /// from `OPENAI_*` variables; the sealing key from `TFGEN_SECRET_KEY`.
    pub async fn from_env(database_url: &str) -> Result<Arc<Self>, tfgen_core::StoreError> {
        let pool = tfgen_store::connect(database_url).await?;

        let secret_box = SecretBox::from_env().unwrap_or_else(|_| {
            tracing::warn!("TFGEN_SECRET_KEY not set; using an insecure development key");
            SecretBox::from_passphrase("tfgen-dev-key")
        });

        let client: Arc<dyn ChatClient> = Arc::new(OpenAiClient::from_env());
        let policies = SqlitePolicyStore::new(pool.clone());
        let stages = build_pipeline(client.clone(), Arc::new(policies.clone()));
        let runner = WorkflowRunner::new(stages, Arc::new(SqliteSessionStore::new(pool.clone())));

        let deployments = SqliteDeploymentStore::new(pool.clone());
        let executor = match ExecutorConfig::discover() {
            Ok(config) => Some(TerraformExecutor::new(
                config,
                Arc::new(deployments.clone()),
            )),
            Err(e) => {
                tracing::warn!(error = %e, "deployment executor disabled");
                None
            }
        };

        Ok(Arc::new(Self {
            runner,
            policies,
            environments: SqliteEnvironmentStore::new(pool, secret_box),
            deployments,
            executor,
            compiler: RuleCompiler::with_client(client),
            sheets: SheetParser::new(),
        }))
    }

    /// Run one chat turn through the workflow.
    pub async fn run_chat(
        &self,
        session_id: &str,
        message: &str,
        sheet_resources: Option<Vec<CanonicalResource>>,
        progress: &ProgressSink,
    ) -> Result<WorkflowState, tfgen_core::EngineError> {
        self.runner
            .run(session_id, message, sheet_resources, progress)
            .await
    }
}
