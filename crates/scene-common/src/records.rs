//! Records exchanged with the workflow orchestrator.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};
use crate::order::OrderState;
use crate::run::RunId;

/// One invocation's input as supplied by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInput {
    /// Upstream task id -> that task's output record
    #[serde(default)]
    pub predecessor_outputs: BTreeMap<String, PredecessorOutput>,
    /// Re-enter an earlier run instead of starting a fresh one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

/// Output record of an upstream task. Only the fields this pipeline reads are
/// typed; everything else is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredecessorOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "s3url", skip_serializing_if = "Option::is_none")]
    pub published_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Validated order to process: the status endpoint and the site it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_url: String,
    pub site: String,
}

impl OrderRequest {
    pub fn new(order_url: impl Into<String>, site: impl Into<String>) -> SceneResult<Self> {
        let order_url = order_url.into();
        let site = site.into();

        if !(order_url.starts_with("http://") || order_url.starts_with("https://")) {
            return Err(SceneError::InvalidInput(format!(
                "order_url '{}' is not an http(s) URL",
                order_url
            )));
        }
        validate_site_name(&site)?;

        Ok(Self { order_url, site })
    }
}

/// Site names become object-key and file-name components.
fn validate_site_name(site: &str) -> SceneResult<()> {
    if site.trim().is_empty() {
        return Err(SceneError::InvalidInput("site name is empty".to_string()));
    }
    if site.contains('/') || site.contains('\\') || site == "." || site == ".." {
        return Err(SceneError::InvalidInput(format!(
            "site name '{}' must not contain path separators",
            site
        )));
    }
    if site.chars().any(char::is_control) {
        return Err(SceneError::InvalidInput(format!(
            "site name {:?} contains control characters",
            site
        )));
    }
    Ok(())
}

impl TaskInput {
    /// Pick the order to process.
    ///
    /// Uses the first predecessor record, in task-id order, that carries both
    /// `order_url` and `name`.
    pub fn order_request(&self) -> SceneResult<OrderRequest> {
        let (task_id, record) = self
            .predecessor_outputs
            .iter()
            .find(|(_, output)| output.order_url.is_some() && output.name.is_some())
            .ok_or_else(|| {
                SceneError::InvalidInput(
                    "no predecessor output carries both 'order_url' and 'name'".to_string(),
                )
            })?;

        let order_url = record.order_url.clone().unwrap_or_default();
        let site = record.name.clone().unwrap_or_default();
        OrderRequest::new(order_url, site).map_err(|e| match e {
            SceneError::InvalidInput(msg) => {
                SceneError::InvalidInput(format!("predecessor '{}': {}", task_id, msg))
            }
            other => other,
        })
    }

    /// All predecessor records viewed as per-site task outputs (rollup input).
    pub fn task_outputs(&self) -> Vec<TaskOutput> {
        self.predecessor_outputs
            .values()
            .filter(|output| output.name.is_some())
            .map(|output| TaskOutput {
                order_url: output.order_url.clone().unwrap_or_default(),
                name: output.name.clone().unwrap_or_default(),
                published_url: output.published_url.clone().unwrap_or_default(),
                order_state: None,
                run_id: None,
            })
            .collect()
    }
}

/// Record handed to the next workflow stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub order_url: String,
    pub name: String,
    /// Public URL of the per-site summary table; empty when the order never
    /// reached success/partial.
    #[serde(default, alias = "s3url")]
    pub published_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_state: Option<OrderState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

impl TaskOutput {
    pub fn is_published(&self) -> bool {
        !self.published_url.is_empty()
    }
}

/// One uploaded artifact: where it came from, where it went, how to get it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub local_path: PathBuf,
    pub key: String,
    pub url: String,
}
