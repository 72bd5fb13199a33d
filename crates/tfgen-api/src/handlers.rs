//! API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

use tfgen_core::{CanonicalResource, ProgressSink, WorkflowState, ENGINE_VERSION};
use tfgen_deploy::{CloudCredentials, Deployment, DeploymentStore, Environment};
use tfgen_policy::{PlatformScope, Policy, Severity};
use tfgen_sheet::Workbook;

use crate::metrics;
use crate::state::AppState;

/// Uniform error payload.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{what} not found"))
    }

    fn internal(message: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.message }))).into_response()
    }
}

impl From<tfgen_core::StoreError> for ApiError {
    fn from(e: tfgen_core::StoreError) -> Self {
        Self::internal(e)
    }
}

impl From<tfgen_core::EngineError> for ApiError {
    fn from(e: tfgen_core::EngineError) -> Self {
        Self::internal(e)
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub context: Option<ChatContext>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatContext {
    #[serde(default)]
    pub spreadsheet_resources: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
pub struct CodeBlock {
    pub filename: String,
    pub content: String,
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_blocks: Option<Vec<CodeBlock>>,
    pub metadata: Value,
}

fn seed_resources(context: &Option<ChatContext>) -> Option<Vec<CanonicalResource>> {
    let values = context.as_ref()?.spreadsheet_resources.as_ref()?;
    let resources: Vec<CanonicalResource> = values
        .iter()
        .filter_map(CanonicalResource::from_value)
        .collect();
    if resources.is_empty() {
        None
    } else {
        Some(resources)
    }
}

fn chat_response(state: &WorkflowState) -> ChatResponse {
    let code_blocks = if state.generated_code.is_empty() {
        None
    } else {
        Some(
            state
                .generated_code
                .iter()
                .map(|(filename, content)| CodeBlock {
                    filename: filename.clone(),
                    content: content.clone(),
                    language: if filename.ends_with(".md") {
                        "markdown".to_string()
                    } else {
                        "hcl".to_string()
                    },
                })
                .collect(),
        )
    };

    let error = state.errors.last().map(|e| e.message.clone());
    ChatResponse {
        session_id: state.session_id.clone(),
        message: state
            .last_assistant_message()
            .unwrap_or_default()
            .to_string(),
        code_blocks,
        metadata: json!({
            "workflow_state": state.phase.as_str(),
            "resource_count": state.resource_count(),
            "compliance_passed": state.compliance_passed,
            "error": error,
        }),
    }
}

pub async fn chat(
    State(app): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    metrics::CHAT_REQUESTS.inc();
    let resources = seed_resources(&request.context);
    let state = app
        .run_chat(
            &request.session_id,
            &request.message,
            resources,
            &ProgressSink::disabled(),
        )
        .await?;
    Ok(Json(chat_response(&state)))
}

/// Streaming variant: `progress` events while the pipeline runs, then one
/// `complete` (or `error`) event.
pub async fn chat_stream(
    State(app): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    metrics::CHAT_REQUESTS.inc();
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    tokio::spawn(async move {
        let (sink, mut progress_rx) = ProgressSink::channel();
        let resources = seed_resources(&request.context);

        let outcome = {
            let run = app.run_chat(&request.session_id, &request.message, resources, &sink);
            tokio::pin!(run);
            loop {
                tokio::select! {
                    maybe = progress_rx.recv() => {
                        match maybe {
                            Some(event) => {
                                let _ = event_tx.send(progress_event(&event));
                            }
                            // Channel closed; just wait for the run to finish.
                            None => break (&mut run).await,
                        }
                    }
                    result = &mut run => break result,
                }
            }
        };
        drop(sink);
        while let Ok(event) = progress_rx.try_recv() {
            let _ = event_tx.send(progress_event(&event));
        }

        let final_event = match outcome {
            Ok(state) => {
                let response = chat_response(&state);
                Event::default()
                    .event("complete")
                    .json_data(&response)
                    .unwrap_or_else(|_| Event::default().event("complete"))
            }
            Err(e) => Event::default()
                .event("error")
                .json_data(&json!({"message": e.to_string()}))
                .unwrap_or_else(|_| Event::default().event("error")),
        };
        let _ = event_tx.send(final_event);
    });

    let stream = futures::stream::unfold(event_rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn progress_event(event: &tfgen_core::ProgressEvent) -> Event {
    Event::default()
        .event("progress")
        .json_data(event)
        .unwrap_or_else(|_| Event::default().event("progress"))
}

// ---------------------------------------------------------------------------
// Spreadsheet ingest
// ---------------------------------------------------------------------------

/// The upload surface decodes the binary workbook; this endpoint ingests
/// the decoded row model.
pub async fn parse_sheet(
    State(app): State<Arc<AppState>>,
    Json(workbook): Json<Workbook>,
) -> Json<Value> {
    let result = app.sheets.parse(&workbook);
    Json(serde_json::to_value(&result).unwrap_or_else(|_| json!({"success": false})))
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PolicyRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub natural_language_rule: String,
    #[serde(default)]
    pub cloud_platform: Option<PlatformScope>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

pub async fn list_policies(
    State(app): State<Arc<AppState>>,
) -> Result<Json<Vec<Policy>>, ApiError> {
    Ok(Json(app.policies.list().await?))
}

pub async fn get_policy(
    State(app): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Policy>, ApiError> {
    app.policies
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("policy {id}")))
}

pub async fn create_policy(
    State(app): State<Arc<AppState>>,
    Json(request): Json<PolicyRequest>,
) -> Result<(StatusCode, Json<Policy>), ApiError> {
    let mut policy = Policy::new(
        format!("pol_{}", &Uuid::new_v4().simple().to_string()[..12]),
        request.name,
        request.natural_language_rule,
    )
    .with_description(request.description);
    if let Some(scope) = request.cloud_platform {
        policy.cloud_platform = scope;
    }
    if let Some(severity) = request.severity {
        policy.severity = severity;
    }
    if let Some(enabled) = request.enabled {
        policy.enabled = enabled;
    }

    match app.compiler.compile(&policy.natural_language_rule).await {
        Ok(rule) => policy.compiled = Some(rule),
        Err(e) => {
            tracing::warn!(policy = %policy.name, error = %e, "rule compilation failed");
        }
    }

    app.policies.upsert(&policy).await?;
    Ok((StatusCode::CREATED, Json(policy)))
}

pub async fn update_policy(
    State(app): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<PolicyRequest>,
) -> Result<Json<Policy>, ApiError> {
    let mut policy = app
        .policies
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("policy {id}")))?;

    let rule_changed = policy.natural_language_rule != request.natural_language_rule;
    policy.name = request.name;
    policy.description = request.description;
    policy.natural_language_rule = request.natural_language_rule;
    if let Some(scope) = request.cloud_platform {
        policy.cloud_platform = scope;
    }
    if let Some(severity) = request.severity {
        policy.severity = severity;
    }
    if let Some(enabled) = request.enabled {
        policy.enabled = enabled;
    }

    // The compiled form is cached with the policy; only a changed rule
    // triggers recompilation.
    if rule_changed || policy.compiled.is_none() {
        match app.compiler.compile(&policy.natural_language_rule).await {
            Ok(rule) => policy.compiled = Some(rule),
            Err(e) => {
                tracing::warn!(policy = %policy.name, error = %e, "rule compilation failed");
                policy.compiled = None;
            }
        }
    }

    app.policies.upsert(&policy).await?;
    Ok(Json(policy))
}

pub async fn delete_policy(
    State(app): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if app.policies.delete(&id).await? {
        Ok(Json(json!({"success": true})))
    } else {
        Err(ApiError::not_found(format!("policy {id}")))
    }
}

pub async fn toggle_policy(
    State(app): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Policy>, ApiError> {
    app.policies
        .toggle(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("policy {id}")))
}

// ---------------------------------------------------------------------------
// Environments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EnvironmentRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub credentials: CloudCredentials,
}

pub async fn create_environment(
    State(app): State<Arc<AppState>>,
    Json(request): Json<EnvironmentRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut environment = Environment::new(request.name, request.credentials);
    environment.description = request.description;
    app.environments.upsert(&environment).await?;
    // Credentials are never echoed back.
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": environment.id,
            "name": environment.name,
            "platform": environment.platform().as_str(),
        })),
    ))
}

pub async fn list_environments(
    State(app): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let summaries = app.environments.list_summaries().await?;
    let items: Vec<Value> = summaries
        .into_iter()
        .map(|(id, name, platform)| json!({"id": id, "name": name, "platform": platform}))
        .collect();
    Ok(Json(json!({ "environments": items })))
}

// ---------------------------------------------------------------------------
// Deployments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub session_id: String,
    pub environment_id: String,
    pub terraform_code: std::collections::BTreeMap<String, String>,
}

fn deployment_response(deployment: &Deployment) -> Value {
    json!({
        "deployment_id": deployment.deployment_id,
        "status": deployment.status.as_str(),
        "plan_output": deployment.plan_output,
        "plan_summary": deployment.plan_summary,
        "apply_output": deployment.apply_output,
        "terraform_outputs": deployment.terraform_outputs,
        "error_message": deployment.error_message,
    })
}

impl AppState {
    fn executor_or_503(&self) -> Result<&tfgen_deploy::TerraformExecutor, ApiError> {
        self.executor.as_ref().ok_or_else(|| {
            ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "terraform is not available on this host",
            )
        })
    }

    async fn environment_or_404(&self, id: &str) -> Result<Environment, ApiError> {
        self.environments
            .get(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("environment {id}")))
    }
}

pub async fn plan_deployment(
    State(app): State<Arc<AppState>>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<Value>, ApiError> {
    metrics::DEPLOYMENT_PLANS.inc();
    let executor = app.executor_or_503()?;
    let environment = app.environment_or_404(&request.environment_id).await?;

    let deployment = executor
        .create(
            &request.session_id,
            &request.environment_id,
            request.terraform_code,
        )
        .await
        .map_err(ApiError::internal)?;
    let deployment = executor
        .plan(&deployment.deployment_id, &environment)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(deployment_response(&deployment)))
}

pub async fn get_deployment(
    State(app): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deployment = app
        .deployments
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("deployment {id}")))?;
    Ok(Json(deployment_response(&deployment)))
}

pub async fn apply_deployment(
    State(app): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let executor = app.executor_or_503()?;
    let deployment = app
        .deployments
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("deployment {id}")))?;
    let environment = app.environment_or_404(&deployment.environment_id).await?;

    let deployment = executor
        .apply(&id, &environment)
        .await
        .map_err(|e| match e {
            tfgen_deploy::DeployError::InvalidState { .. } => {
                ApiError::new(StatusCode::CONFLICT, e.to_string())
            }
            other => ApiError::internal(other),
        })?;
    Ok(Json(deployment_response(&deployment)))
}

pub async fn destroy_deployment(
    State(app): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let executor = app.executor_or_503()?;
    let deployment = app
        .deployments
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("deployment {id}")))?;
    let environment = app.environment_or_404(&deployment.environment_id).await?;

    let deployment = executor
        .destroy(&id, &environment)
        .await
        .map_err(|e| match e {
            tfgen_deploy::DeployError::InvalidState { .. } => {
                ApiError::new(StatusCode::CONFLICT, e.to_string())
            }
            other => ApiError::internal(other),
        })?;
    Ok(Json(deployment_response(&deployment)))
}

/// Signal a running plan/apply/destroy to stop. The executor kills the
/// terraform child; the deployment settles in the matching `_failed` state.
pub async fn cancel_deployment(
    State(app): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let executor = app.executor_or_503()?;
    app.deployments
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("deployment {id}")))?;

    executor.cancel(&id);
    Ok(Json(json!({"deployment_id": id, "cancelled": true})))
}

// ---------------------------------------------------------------------------
// Health & metrics
// ---------------------------------------------------------------------------

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "version": ENGINE_VERSION}))
}

pub async fn metrics_endpoint() -> Result<String, ApiError> {
    metrics::encode().map_err(ApiError::internal)
}
