//! Terraform subprocess driving.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Notify;

use tfgen_core::{KeyedLocks, StoreError};

use crate::credentials::Environment;
use crate::deployment::{Deployment, DeploymentStatus, PlanSummary};

static PLAN_SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Plan: (\d+) to add, (\d+) to change, (\d+) to destroy").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("deployment {0} not found")]
    NotFound(String),

    #[error("deployment must be in state {expected}, currently {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("terraform binary not found; install terraform or set TFGEN_TERRAFORM_BIN")]
    TerraformMissing,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persistence seam for deployment records.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn insert(&self, deployment: &Deployment) -> Result<(), StoreError>;
    async fn update(&self, deployment: &Deployment) -> Result<(), StoreError>;
    async fn get(&self, deployment_id: &str) -> Result<Option<Deployment>, StoreError>;
}

/// Executor settings; every terraform phase carries its own timeout.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub terraform_bin: PathBuf,
    /// Root under which per-deployment working directories are created.
    pub work_root: PathBuf,
    pub init_timeout: Duration,
    pub plan_timeout: Duration,
    pub apply_timeout: Duration,
    pub destroy_timeout: Duration,
    /// Failed working directories are kept this long for diagnostics
    /// before `sweep_stale` removes them.
    pub retention: Duration,
}

impl ExecutorConfig {
    /// Locate terraform on PATH (or `TFGEN_TERRAFORM_BIN`) and apply the
    /// default timeouts: 15 minutes for init, 30 for plan/apply/destroy.
    pub fn discover() -> Result<Self, DeployError> {
        let terraform_bin = find_terraform().ok_or(DeployError::TerraformMissing)?;
        Ok(Self::with_binary(terraform_bin))
    }

    pub fn with_binary(terraform_bin: PathBuf) -> Self {
        Self {
            terraform_bin,
            work_root: std::env::temp_dir().join("tfgen-deployments"),
            init_timeout: Duration::from_secs(900),
            plan_timeout: Duration::from_secs(1800),
            apply_timeout: Duration::from_secs(1800),
            destroy_timeout: Duration::from_secs(1800),
            retention: Duration::from_secs(24 * 3600),
        }
    }
}

fn find_terraform() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("TFGEN_TERRAFORM_BIN") {
        let path = PathBuf::from(explicit);
        if path.is_file() {
            return Some(path);
        }
    }
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            candidates.push(dir.join("terraform"));
        }
    }
    candidates.push(PathBuf::from("/usr/local/bin/terraform"));
    candidates.push(PathBuf::from("/usr/bin/terraform"));
    candidates.into_iter().find(|p| p.is_file())
}

enum CommandOutcome {
    Finished {
        success: bool,
        output: String,
    },
    TimedOut(Duration),
    Cancelled,
}

/// Drives terraform for deployments. One working directory per deployment;
/// a per-deployment lock serializes plan/apply; cancellation kills the
/// child process (`kill_on_drop` covers timeout and crash paths too).
pub struct TerraformExecutor {
    config: ExecutorConfig,
    store: Arc<dyn DeploymentStore>,
    locks: KeyedLocks,
    cancellations: Mutex<HashMap<String, Arc<Notify>>>,
}

impl TerraformExecutor {
    pub fn new(config: ExecutorConfig, store: Arc<dyn DeploymentStore>) -> Self {
        Self {
            config,
            store,
            locks: KeyedLocks::new(),
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    /// Create a pending deployment record for the given file bundle.
    pub async fn create(
        &self,
        session_id: &str,
        environment_id: &str,
        terraform_code: BTreeMap<String, String>,
    ) -> Result<Deployment, DeployError> {
        let deployment = Deployment::new(session_id, environment_id, terraform_code);
        self.store.insert(&deployment).await?;
        Ok(deployment)
    }

    /// `terraform init` + `terraform plan -out=tfplan` in a fresh working
    /// directory. Transitions to `plan_ready` or `plan_failed`.
    pub async fn plan(
        &self,
        deployment_id: &str,
        environment: &Environment,
    ) -> Result<Deployment, DeployError> {
        let _guard = self.locks.acquire(deployment_id).await;
        let mut deployment = self.load(deployment_id).await?;
        if deployment.status != DeploymentStatus::Pending {
            return Err(DeployError::InvalidState {
                expected: "pending",
                actual: deployment.status.as_str(),
            });
        }

        deployment.status = DeploymentStatus::Planning;
        self.persist(&mut deployment).await?;

        let work_dir = self.prepare_work_dir(&deployment)?;
        deployment.work_dir = Some(work_dir.display().to_string());

        let env_vars = environment.credentials.env_vars();

        match self
            .run(
                deployment_id,
                &["init", "-no-color", "-input=false"],
                &work_dir,
                &env_vars,
                self.config.init_timeout,
            )
            .await?
        {
            CommandOutcome::Finished { success: true, .. } => {}
            outcome => {
                deployment.status = DeploymentStatus::PlanFailed;
                deployment.error_message = Some(outcome_message("terraform init", &outcome));
                self.persist(&mut deployment).await?;
                return Ok(deployment);
            }
        }

        let outcome = self
            .run(
                deployment_id,
                &["plan", "-no-color", "-input=false", "-out=tfplan"],
                &work_dir,
                &env_vars,
                self.config.plan_timeout,
            )
            .await?;

        match outcome {
            CommandOutcome::Finished { success: true, output } => {
                deployment.plan_summary = Some(parse_plan_summary(&output));
                deployment.plan_output = Some(output);
                deployment.status = DeploymentStatus::PlanReady;
            }
            CommandOutcome::Finished { success: false, output } => {
                deployment.plan_output = Some(output);
                deployment.status = DeploymentStatus::PlanFailed;
                deployment.error_message = Some("terraform plan failed".to_string());
            }
            other => {
                deployment.status = DeploymentStatus::PlanFailed;
                deployment.error_message = Some(outcome_message("terraform plan", &other));
                remove_stale_lock(&work_dir);
            }
        }
        self.persist(&mut deployment).await?;
        Ok(deployment)
    }

    /// `terraform apply tfplan`; requires `plan_ready`. Captures outputs
    /// via `terraform output -json` on success.
    pub async fn apply(
        &self,
        deployment_id: &str,
        environment: &Environment,
    ) -> Result<Deployment, DeployError> {
        let _guard = self.locks.acquire(deployment_id).await;
        let mut deployment = self.load(deployment_id).await?;
        if deployment.status != DeploymentStatus::PlanReady {
            return Err(DeployError::InvalidState {
                expected: "plan_ready",
                actual: deployment.status.as_str(),
            });
        }

        let work_dir = deployment
            .work_dir
            .as_deref()
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .ok_or_else(|| DeployError::NotFound(format!("work dir for {deployment_id}")))?;

        deployment.status = DeploymentStatus::Applying;
        self.persist(&mut deployment).await?;

        let env_vars = environment.credentials.env_vars();
        let outcome = self
            .run(
                deployment_id,
                &["apply", "-no-color", "-input=false", "-auto-approve", "tfplan"],
                &work_dir,
                &env_vars,
                self.config.apply_timeout,
            )
            .await?;

        match outcome {
            CommandOutcome::Finished { success: true, output } => {
                deployment.apply_output = Some(output);
                deployment.terraform_outputs = self
                    .capture_outputs(deployment_id, &work_dir, &env_vars)
                    .await;
                deployment.status = DeploymentStatus::ApplySuccess;
                deployment.completed_at = Some(chrono::Utc::now());
            }
            CommandOutcome::Finished { success: false, output } => {
                deployment.apply_output = Some(output);
                deployment.status = DeploymentStatus::ApplyFailed;
                deployment.error_message = Some("terraform apply failed".to_string());
            }
            other => {
                deployment.status = DeploymentStatus::ApplyFailed;
                deployment.error_message = Some(outcome_message("terraform apply", &other));
                remove_stale_lock(&work_dir);
            }
        }
        self.persist(&mut deployment).await?;
        Ok(deployment)
    }

    /// `terraform destroy -auto-approve`. Idempotent relative to terminal
    /// state: destroying an already destroyed deployment is a no-op.
    pub async fn destroy(
        &self,
        deployment_id: &str,
        environment: &Environment,
    ) -> Result<Deployment, DeployError> {
        let _guard = self.locks.acquire(deployment_id).await;
        let mut deployment = self.load(deployment_id).await?;

        if deployment.status == DeploymentStatus::Destroyed {
            return Ok(deployment);
        }
        if deployment.status != DeploymentStatus::ApplySuccess {
            return Err(DeployError::InvalidState {
                expected: "apply_success",
                actual: deployment.status.as_str(),
            });
        }

        // The directory may have been swept; recreate it from the stored
        // bundle and re-init.
        let work_dir = match deployment.work_dir.as_deref().map(PathBuf::from) {
            Some(dir) if dir.exists() => dir,
            _ => {
                let dir = self.prepare_work_dir(&deployment)?;
                deployment.work_dir = Some(dir.display().to_string());
                let env_vars = environment.credentials.env_vars();
                self.run(
                    deployment_id,
                    &["init", "-no-color", "-input=false"],
                    &dir,
                    &env_vars,
                    self.config.init_timeout,
                )
                .await?;
                dir
            }
        };

        deployment.status = DeploymentStatus::Destroying;
        self.persist(&mut deployment).await?;

        let env_vars = environment.credentials.env_vars();
        let outcome = self
            .run(
                deployment_id,
                &["destroy", "-no-color", "-input=false", "-auto-approve"],
                &work_dir,
                &env_vars,
                self.config.destroy_timeout,
            )
            .await?;

        match outcome {
            CommandOutcome::Finished { success: true, output } => {
                deployment.status = DeploymentStatus::Destroyed;
                let previous = deployment.apply_output.take().unwrap_or_default();
                deployment.apply_output =
                    Some(format!("{previous}\n\n--- DESTROY OUTPUT ---\n{output}"));
                self.cleanup(&deployment);
            }
            CommandOutcome::Finished { success: false, output } => {
                deployment.status = DeploymentStatus::ApplySuccess;
                deployment.error_message = Some(format!("terraform destroy failed:\n{output}"));
            }
            other => {
                deployment.status = DeploymentStatus::ApplySuccess;
                deployment.error_message = Some(outcome_message("terraform destroy", &other));
            }
        }
        self.persist(&mut deployment).await?;
        Ok(deployment)
    }

    pub async fn get(&self, deployment_id: &str) -> Result<Option<Deployment>, DeployError> {
        Ok(self.store.get(deployment_id).await?)
    }

    /// Signal the deployment's running terraform process to stop. The
    /// select in `run` drops the child, which kills it.
    pub fn cancel(&self, deployment_id: &str) {
        let notify = {
            let map = self.cancellations.lock().expect("cancellation map");
            map.get(deployment_id).cloned()
        };
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }

    /// Remove working directories past the retention window. Covers crash
    /// leftovers: directories survive a process restart and are swept here.
    pub fn sweep_stale(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let Ok(entries) = std::fs::read_dir(&self.config.work_root) else {
            return Ok(0);
        };
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let stale = metadata
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .is_some_and(|age| age > self.config.retention);
            if stale && std::fs::remove_dir_all(entry.path()).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn load(&self, deployment_id: &str) -> Result<Deployment, DeployError> {
        self.store
            .get(deployment_id)
            .await?
            .ok_or_else(|| DeployError::NotFound(deployment_id.to_string()))
    }

    async fn persist(&self, deployment: &mut Deployment) -> Result<(), DeployError> {
        deployment.touch();
        self.store.update(deployment).await?;
        Ok(())
    }

    fn prepare_work_dir(&self, deployment: &Deployment) -> Result<PathBuf, DeployError> {
        let dir = self.config.work_root.join(&deployment.deployment_id);
        std::fs::create_dir_all(&dir)?;
        for (filename, content) in &deployment.terraform_code {
            std::fs::write(dir.join(filename), content)?;
        }
        Ok(dir)
    }

    fn cleanup(&self, deployment: &Deployment) {
        if let Some(dir) = deployment.work_dir.as_deref() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    async fn capture_outputs(
        &self,
        deployment_id: &str,
        work_dir: &Path,
        env_vars: &[(String, String)],
    ) -> Option<serde_json::Value> {
        match self
            .run(
                deployment_id,
                &["output", "-json"],
                work_dir,
                env_vars,
                Duration::from_secs(60),
            )
            .await
        {
            Ok(CommandOutcome::Finished { success: true, output }) => {
                serde_json::from_str(&output).ok()
            }
            _ => None,
        }
    }

    async fn run(
        &self,
        deployment_id: &str,
        args: &[&str],
        work_dir: &Path,
        env_vars: &[(String, String)],
        timeout: Duration,
    ) -> Result<CommandOutcome, DeployError> {
        tracing::info!(deployment = %deployment_id, command = ?args, "running terraform");

        let mut command = Command::new(&self.config.terraform_bin);
        command
            .args(args)
            .current_dir(work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in env_vars {
            command.env(key, value);
        }

        let cancel = {
            let mut map = self.cancellations.lock().expect("cancellation map");
            map.entry(deployment_id.to_string())
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone()
        };

        let child = command.spawn()?;
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, child.wait_with_output()) => {
                match result {
                    Ok(Ok(output)) => {
                        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                        combined.push_str(&String::from_utf8_lossy(&output.stderr));
                        CommandOutcome::Finished {
                            success: output.status.success(),
                            output: combined,
                        }
                    }
                    Ok(Err(e)) => return Err(DeployError::Io(e)),
                    Err(_) => CommandOutcome::TimedOut(timeout),
                }
            }
            _ = cancel.notified() => CommandOutcome::Cancelled,
        };

        if matches!(outcome, CommandOutcome::TimedOut(_) | CommandOutcome::Cancelled) {
            tracing::warn!(deployment = %deployment_id, command = ?args, "terraform run aborted");
        }
        Ok(outcome)
    }
}

fn outcome_message(phase: &str, outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Finished { output, .. } => format!("{phase} failed:\n{output}"),
        CommandOutcome::TimedOut(timeout) => {
            format!("{phase} timed out after {} seconds", timeout.as_secs())
        }
        CommandOutcome::Cancelled => format!("{phase} was cancelled"),
    }
}

fn remove_stale_lock(work_dir: &Path) {
    let lock_file = work_dir.join(".terraform.tfstate.lock.info");
    if lock_file.exists() {
        let _ = std::fs::remove_file(lock_file);
    }
}

/// Parse `Plan: 2 to add, 1 to change, 0 to destroy.` from human output.
fn parse_plan_summary(plan_output: &str) -> PlanSummary {
    PLAN_SUMMARY
        .captures(plan_output)
        .map(|caps| PlanSummary {
            add: caps[1].parse().unwrap_or(0),
            change: caps[2].parse().unwrap_or(0),
            destroy: caps[3].parse().unwrap_or(0),
        })
        .unwrap_or_default()
}
