//! Run identifiers and pipeline stages.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SceneError;

/// Unique token namespacing one pipeline invocation's outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh 32-character hex token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept a caller-supplied token, e.g. to re-enter an interrupted run.
    ///
    /// The token becomes part of object keys and file names, so only
    /// `[A-Za-z0-9_-]` is allowed.
    pub fn parse(token: &str) -> Result<Self, SceneError> {
        let valid = !token.is_empty()
            && token.len() <= 64
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(token.to_string()))
        } else {
            Err(SceneError::InvalidInput(format!(
                "run id '{}' must be 1-64 characters of [A-Za-z0-9_-]",
                token
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RunId {
    type Error = SceneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

/// Stage of one pipeline run.
///
/// `PendingStatus → Failed | Fetching → Extracting → Computing →
/// TableWritten → Published`. There is no way back to `PendingStatus`
/// within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    PendingStatus,
    Failed,
    NotReady,
    Fetching,
    Extracting,
    Computing,
    TableWritten,
    Published,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingStatus => "pending_status",
            Self::Failed => "failed",
            Self::NotReady => "not_ready",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Computing => "computing",
            Self::TableWritten => "table_written",
            Self::Published => "published",
        }
    }

    /// Whether the run ends in this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::NotReady | Self::Published)
    }

    /// Whether `next` is a legal successor of this stage.
    pub fn can_advance_to(&self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (PendingStatus, Failed)
                | (PendingStatus, NotReady)
                | (PendingStatus, Fetching)
                | (Fetching, Extracting)
                | (Extracting, Computing)
                | (Computing, Extracting)
                | (Extracting, TableWritten)
                | (Computing, TableWritten)
                | (TableWritten, Published)
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
