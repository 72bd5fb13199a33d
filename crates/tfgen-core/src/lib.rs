//! tfgen-core: resource model, workflow state, and the stage runner
//!
//! Generic staged engine with a single stage contract and durable per-session
//! state. Everything downstream of the input parsers operates on the
//! [`CanonicalResource`] form defined here.

pub mod error;
pub mod locks;
pub mod progress;
pub mod resource;
pub mod runner;
pub mod stage;
pub mod state;

pub use error::{EngineError, StoreError};
pub use locks::KeyedLocks;
pub use progress::{ProgressEvent, ProgressSink, StageStatus};
pub use resource::{
    is_known_kind, merge_resources, normalize_kind, safe_id, CanonicalResource, Platform,
};
pub use runner::{SessionStore, WorkflowRunner};
pub use stage::{Next, Stage, StageError, StageKind};
pub use state::{ChatMessage, ErrorRecord, InputType, Phase, Role, Violation, WorkflowState};

/// Engine version reported by the health endpoint.
pub const ENGINE_VERSION: &str = "0.3.0";
