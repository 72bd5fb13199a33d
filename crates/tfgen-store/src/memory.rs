//! In-memory store doubles for tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use tfgen_core::{SessionStore, StoreError, WorkflowState};
use tfgen_deploy::{Deployment, DeploymentStore};
use tfgen_policy::{Policy, PolicyProvider};

#[derive(Default)]
pub struct MemorySessionStore {
    states: Mutex<HashMap<String, WorkflowState>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<WorkflowState>, StoreError> {
        Ok(self.states.lock().unwrap().get(session_id).cloned())
    }

    async fn save(&self, state: &WorkflowState) -> Result<(), StoreError> {
        self.states
            .lock()
            .unwrap()
            .insert(state.session_id.clone(), state.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPolicyStore {
    policies: Mutex<Vec<Policy>>,
}

impl MemoryPolicyStore {
    pub fn with_policies(policies: Vec<Policy>) -> Self {
        Self {
            policies: Mutex::new(policies),
        }
    }

    pub fn push(&self, policy: Policy) {
        self.policies.lock().unwrap().push(policy);
    }
}

#[async_trait]
impl PolicyProvider for MemoryPolicyStore {
    async fn enabled_policies(&self) -> Result<Vec<Policy>, StoreError> {
        Ok(self
            .policies
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.enabled)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryDeploymentStore {
    deployments: Mutex<HashMap<String, Deployment>>,
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn insert(&self, deployment: &Deployment) -> Result<(), StoreError> {
        self.deployments
            .lock()
            .unwrap()
            .insert(deployment.deployment_id.clone(), deployment.clone());
        Ok(())
    }

    async fn update(&self, deployment: &Deployment) -> Result<(), StoreError> {
        self.insert(deployment).await
    }

    async fn get(&self, deployment_id: &str) -> Result<Option<Deployment>, StoreError> {
        Ok(self.deployments.lock().unwrap().get(deployment_id).cloned())
    }
}
