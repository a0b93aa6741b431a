//! Testbed build coordination
//!
//! Turns a variant's feature set into an explicit [`BuildSpec`] and drives
//! the external build pipeline with it:
//! - Writes the build description next to the build tree
//! - Patches the subscriber count the workload records
//! - Executes the configured build steps (checkout, build script)
//!
//! Any failing step is fatal: the evaluation never runs on a stale build.

pub mod error;
pub mod pipeline;
pub mod runner;
pub mod spec;
pub mod step;

// Re-export key types
pub use error::{BuildError, Result};
pub use pipeline::{patch_define, BuildPipeline, BuildReport, DefinePatch};
pub use runner::{BuildRunner, StepResult};
pub use spec::BuildSpec;
pub use step::BuildStep;
