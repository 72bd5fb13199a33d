//! tfgen-render: Terraform code synthesis.
//!
//! Each `(platform, kind)` pair dispatches to a Handlebars template from a
//! fixed registry; the project assembler stitches rendered blocks into a
//! complete configuration. Templates with a small filter set are the
//! explicit choice over programmatic HCL construction: new resource types
//! are added without touching engine code.

pub mod fixups;
pub mod helpers;
pub mod project;
pub mod registry;
pub mod renderer;

pub use project::{generate_project, ProjectBundle};
pub use registry::{available_kinds, template_for};
pub use renderer::{RenderFailure, TemplateEngine};
