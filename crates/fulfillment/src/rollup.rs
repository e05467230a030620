//! Cross-site rollup of per-site task outputs.

use std::path::Path;

use scene_common::{RunId, SceneResult, TaskOutput};
use serde::{Deserialize, Serialize};
use storage::StoragePath;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::publish::Publisher;
use crate::table::quote_field;

pub const ROLLUP_HEADER: [&str; 3] = ["Name", "order_url", "output_url"];

/// Where the rollup ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupReport {
    /// Object key of the rollup table
    pub workflow_output: String,
    pub url: String,
    pub run_id: RunId,
    pub sites: usize,
}

/// Render the rollup table, one row per output in input order.
pub fn render_rollup(outputs: &[TaskOutput]) -> String {
    let mut content = ROLLUP_HEADER.join(",");
    content.push('\n');
    for output in outputs {
        content.push_str(&quote_field(&output.name));
        content.push(',');
        content.push_str(&quote_field(&output.order_url));
        content.push(',');
        content.push_str(&quote_field(&output.published_url));
        content.push('\n');
    }
    content
}

/// Write the rollup to `<scratch_dir>/<run_id>_summary.csv` and publish it to
/// `output/<run_id>_summary.csv`.
pub async fn write_rollup(
    outputs: &[TaskOutput],
    run_id: &RunId,
    scratch_dir: &Path,
    publisher: &Publisher,
) -> SceneResult<RollupReport> {
    tokio::fs::create_dir_all(scratch_dir).await?;
    let path = scratch_dir.join(StoragePath::rollup_file(run_id.as_str()));

    let mut file = tokio::fs::File::create(&path).await?;
    file.write_all(render_rollup(outputs).as_bytes()).await?;
    file.sync_all().await?;

    let key = StoragePath::rollup(run_id.as_str());
    let record = publisher.publish(&path, &key, run_id).await?;

    info!(
        run_id = %run_id,
        sites = outputs.len(),
        url = %record.url,
        "Published rollup"
    );

    Ok(RollupReport {
        workflow_output: key,
        url: record.url,
        run_id: run_id.clone(),
        sites: outputs.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(name: &str, url: &str) -> TaskOutput {
        TaskOutput {
            order_url: format!("https://api/orders/{}", name),
            name: name.to_string(),
            published_url: url.to_string(),
            order_state: None,
            run_id: None,
        }
    }

    #[test]
    fn test_render_rollup() {
        let content = render_rollup(&[
            output("Meadow1", "https://b/k1"),
            output("Meadow, East", ""),
        ]);
        assert_eq!(
            content,
            "Name,order_url,output_url\n\
             Meadow1,https://api/orders/Meadow1,https://b/k1\n\
             \"Meadow, East\",\"https://api/orders/Meadow, East\",\n"
        );
    }

    #[test]
    fn test_render_empty_rollup() {
        assert_eq!(render_rollup(&[]), "Name,order_url,output_url\n");
    }

    #[test]
    fn test_write_rollup_publishes_under_run_id() {
        tokio_test::block_on(async {
            let dir = test_utils::temp_test_dir();
            let storage = storage::ObjectStorage::with_store(
                std::sync::Arc::new(object_store::memory::InMemory::new()),
                "meadows",
                "https://meadows.s3.us-west-2.amazonaws.com",
            )
            .unwrap();
            let ledger = storage::RunLedger::open_memory().await.unwrap();
            let publisher = Publisher::new(storage, ledger);
            let run_id = RunId::parse("wf7").unwrap();

            let report = write_rollup(
                &[output("Meadow1", "https://b/k1")],
                &run_id,
                dir.path(),
                &publisher,
            )
            .await
            .unwrap();

            assert_eq!(report.workflow_output, "output/wf7_summary.csv");
            assert_eq!(
                report.url,
                "https://meadows.s3.us-west-2.amazonaws.com/output/wf7_summary.csv"
            );
            assert_eq!(report.sites, 1);
            assert!(dir.path().join("wf7_summary.csv").exists());
        });
    }
}
