//! Workflow runner: sequences the stages over a durable session state.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{EngineError, StoreError};
use crate::locks::KeyedLocks;
use crate::progress::ProgressSink;
use crate::resource::{merge_resources, CanonicalResource};
use crate::stage::{Next, Stage, StageKind};
use crate::state::{InputType, WorkflowState};

/// Persistence seam for session state. Implemented by the SQLite store and
/// by in-memory doubles in tests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<WorkflowState>, StoreError>;
    async fn save(&self, state: &WorkflowState) -> Result<(), StoreError>;
}

/// Executes the parse → collect → comply → generate → review DAG.
///
/// `run` is a pure function with respect to the persisted state plus the
/// stages' externalized collaborators. Stage failures are converted into
/// error records on the state; only a broken store fails the call itself.
pub struct WorkflowRunner {
    stages: Vec<Box<dyn Stage>>,
    store: Arc<dyn SessionStore>,
    locks: KeyedLocks,
}

impl WorkflowRunner {
    pub fn new(stages: Vec<Box<dyn Stage>>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            stages,
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Human-readable pipeline identifier, e.g.
    /// `input_parser→information_collector→…`.
    pub fn pipeline_id(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.kind().as_str())
            .collect::<Vec<_>>()
            .join("→")
    }

    /// Load prior state, append the user message, execute stages, persist.
    pub async fn run(
        &self,
        session_id: &str,
        user_input: &str,
        sheet_resources: Option<Vec<CanonicalResource>>,
        progress: &ProgressSink,
    ) -> Result<WorkflowState, EngineError> {
        let _guard = self.locks.acquire(session_id).await;

        let mut state = self
            .store
            .load(session_id)
            .await?
            .unwrap_or_else(|| WorkflowState::new(session_id));
        state.begin_turn();
        state.push_user(user_input);

        // Input type is a per-turn tag: a plain-text follow-up to a
        // spreadsheet session must go through the parser again.
        match sheet_resources {
            Some(resources) => {
                state.input_type = InputType::Spreadsheet;
                merge_resources(&mut state.resources, resources);
            }
            None => state.input_type = InputType::Text,
        }

        let mut idx = 0;
        while idx < self.stages.len() {
            let stage = &self.stages[idx];
            let kind = stage.kind();
            progress.started(kind);
            let started = Instant::now();

            match stage.run(&mut state).await {
                Ok(next) => {
                    progress.completed(kind);
                    tracing::debug!(
                        stage = %kind,
                        latency_ms = started.elapsed().as_millis() as u64,
                        digest = %state_digest(&state),
                        "stage completed"
                    );
                    match next {
                        Next::Continue => idx += 1,
                        Next::Halt => break,
                        Next::Jump(target) => {
                            match self.stages.iter().position(|s| s.kind() == target) {
                                Some(pos) if pos > idx => idx = pos,
                                _ => {
                                    state.record_error(
                                        kind,
                                        format!("invalid jump target '{target}'"),
                                    );
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    tracing::warn!(stage = %kind, error = %message, "stage failed");
                    progress.failed(kind, message.clone());
                    state.record_error(kind, &message);
                    state.push_assistant(format!(
                        "Something went wrong while processing your request: {message}"
                    ));
                    break;
                }
            }
        }

        self.store.save(&state).await?;
        Ok(state)
    }
}

fn state_digest(state: &WorkflowState) -> String {
    let bytes = serde_json::to_vec(state).unwrap_or_default();
    format!("blake3:{}", blake3::hash(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageError;
    use crate::state::Phase;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        states: Mutex<HashMap<String, WorkflowState>>,
    }

    #[async_trait]
    impl SessionStore for MemoryStore {
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

    struct FixedStage {
        kind: StageKind,
        next: Next,
        fail: bool,
    }

    #[async_trait]
    impl Stage for FixedStage {
        fn kind(&self) -> StageKind {
            self.kind
        }

        async fn run(&self, state: &mut WorkflowState) -> Result<Next, StageError> {
            if self.fail {
                return Err(StageError::Internal("synthetic failure".into()));
            }
            state.push_assistant(format!("ran {}", self.kind));
            Ok(self.next)
        }
    }

    fn stage(kind: StageKind, next: Next) -> Box<dyn Stage> {
        Box::new(FixedStage {
            kind,
            next,
            fail: false,
        })
    }

    #[tokio::test]
    async fn test_runs_in_order_and_persists() {
        let store = Arc::new(MemoryStore::default());
        let runner = WorkflowRunner::new(
            vec![
                stage(StageKind::Parse, Next::Continue),
                stage(StageKind::Collect, Next::Halt),
                stage(StageKind::Comply, Next::Continue),
            ],
            store.clone(),
        );

        let state = runner
            .run("s1", "hello", None, &ProgressSink::disabled())
            .await
            .unwrap();

        // Halt at collect: comply never ran.
        assert_eq!(state.messages.len(), 3);
        assert!(store.states.lock().unwrap().contains_key("s1"));
    }

    #[tokio::test]
    async fn test_jump_skips_forward() {
        let store = Arc::new(MemoryStore::default());
        let runner = WorkflowRunner::new(
            vec![
                stage(StageKind::Parse, Next::Jump(StageKind::Comply)),
                stage(StageKind::Collect, Next::Continue),
                stage(StageKind::Comply, Next::Halt),
            ],
            store,
        );

        let state = runner
            .run("s1", "hello", None, &ProgressSink::disabled())
            .await
            .unwrap();

        let transcript: Vec<&str> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert!(transcript.contains(&"ran input_parser"));
        assert!(transcript.contains(&"ran compliance_checker"));
        assert!(!transcript.contains(&"ran information_collector"));
    }

    #[tokio::test]
    async fn test_stage_error_is_captured_not_propagated() {
        let store = Arc::new(MemoryStore::default());
        let runner = WorkflowRunner::new(
            vec![Box::new(FixedStage {
                kind: StageKind::Parse,
                next: Next::Continue,
                fail: true,
            })],
            store,
        );

        let (sink, mut rx) = ProgressSink::channel();
        let state = runner.run("s1", "hello", None, &sink).await.unwrap();

        assert_eq!(state.phase, Phase::Error);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(rx.try_recv().unwrap().status, crate::progress::StageStatus::Started);
        assert_eq!(rx.try_recv().unwrap().status, crate::progress::StageStatus::Failed);
    }

    #[tokio::test]
    async fn test_prior_state_extends_across_turns() {
        let store = Arc::new(MemoryStore::default());
        let runner = WorkflowRunner::new(vec![stage(StageKind::Parse, Next::Halt)], store);

        runner
            .run("s1", "first", None, &ProgressSink::disabled())
            .await
            .unwrap();
        let state = runner
            .run("s1", "second", None, &ProgressSink::disabled())
            .await
            .unwrap();

        assert_eq!(state.messages.iter().filter(|m| m.role == crate::state::Role::User).count(), 2);
    }
}
