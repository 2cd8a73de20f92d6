pub mod config;
pub mod context;
pub mod error;
pub mod result;
pub mod runner;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::PipelineError;
pub use result::{Outcome, ProcessingResult};
pub use runner::{Collaborators, Pipeline};
