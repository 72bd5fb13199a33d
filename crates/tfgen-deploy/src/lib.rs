//! tfgen-deploy: terraform execution.
//!
//! Each deployment runs `init`/`plan`/`apply` in its own working directory
//! keyed by the deployment id. Credentials exist in plaintext only inside
//! the spawned child's environment.

pub mod credentials;
pub mod deployment;
pub mod executor;

pub use credentials::{CloudCredentials, CredentialError, Environment, SecretBox};
pub use deployment::{Deployment, DeploymentStatus, PlanSummary};
pub use executor::{DeployError, DeploymentStore, ExecutorConfig, TerraformExecutor};
