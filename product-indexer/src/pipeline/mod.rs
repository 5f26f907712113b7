//! Document transformation pipeline.
//!
//! A [`PipelineManager`] runs an ordered list of [`PipelineStage`]s against each
//! raw record and seals the result into an indexable document.

mod manager;
pub mod products;
mod stage;
pub mod stages;

pub use manager::{PipelineError, PipelineManager, RecordRef, TransformationError};
pub use products::{product_pipeline, product_schema};
pub use stage::{PipelineStage, StageError};
