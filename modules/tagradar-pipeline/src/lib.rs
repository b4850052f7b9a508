//! Pipeline orchestration and report lifecycle.
//!
//! A run drives two external stages in order (collection, then analysis),
//! isolates its temporary artifacts under a unique run id, and hands the
//! resulting report pair back from the [`ReportStore`]. Temporary artifacts
//! are removed on every exit path.

pub mod error;
pub mod pipeline;
pub mod runner;
pub mod store;
#[cfg(feature = "test-support")]
pub mod testing;
pub mod workspace;

pub use error::{PipelineFailure, ReportError, StageFailure};
pub use pipeline::Pipeline;
pub use runner::{Stage, StageRunner};
pub use store::ReportStore;
pub use workspace::{RunContext, RunWorkspace, WorkspaceManager};
