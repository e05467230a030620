//! Common types shared across the scene summary crates and services.

pub mod error;
pub mod order;
pub mod records;
pub mod run;

pub use error::{
    DecodeError, FetchError, PublishError, SceneError, SceneResult, TransportError,
};
pub use order::{OrderState, ResultArtifact};
pub use records::{OrderRequest, PredecessorOutput, PublicationRecord, TaskInput, TaskOutput};
pub use run::{PipelineStage, RunId};
