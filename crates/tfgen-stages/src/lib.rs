//! tfgen-stages: the pipeline stages.
//!
//! parse → collect → comply → generate → review, each implementing the
//! [`tfgen_core::Stage`] contract. `build_pipeline` wires them in DAG order
//! for the workflow runner.

pub mod collect;
pub mod comply;
pub mod generate;
pub mod parse;
pub mod prompts;
pub mod review;

pub use collect::InformationCollectorStage;
pub use comply::ComplianceCheckerStage;
pub use generate::CodeGeneratorStage;
pub use parse::InputParserStage;
pub use review::CodeReviewerStage;

use std::sync::Arc;

use tfgen_core::Stage;
use tfgen_llm::ChatClient;
use tfgen_policy::PolicyProvider;
use tfgen_render::TemplateEngine;

/// The standard five-stage pipeline.
pub fn build_pipeline(
    client: Arc<dyn ChatClient>,
    policies: Arc<dyn PolicyProvider>,
) -> Vec<Box<dyn Stage>> {
    let engine = Arc::new(TemplateEngine::new());
    vec![
        Box::new(InputParserStage::new(client.clone())),
        Box::new(InformationCollectorStage::new()),
        Box::new(ComplianceCheckerStage::new(policies)),
        Box::new(CodeGeneratorStage::new(engine)),
        Box::new(CodeReviewerStage::new(client)),
    ]
}
