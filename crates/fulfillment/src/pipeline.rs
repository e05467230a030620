//! One pipeline invocation: order status to published summary table.
//!
//! ```text
//! PendingStatus ─► Failed | NotReady
//!       │
//!       ▼
//!   Fetching ─► Extracting ◄─► Computing ─► TableWritten ─► Published
//! ```

use std::time::Duration;

use reqwest::Client;
use scene_common::{
    OrderRequest, OrderState, PipelineStage, PublicationRecord, RunId, SceneError, SceneResult,
    TaskInput, TaskOutput, TransportError,
};
use serde::Serialize;
use spectral::{extract_bands, SpectralError, StatisticsRow};
use storage::{ObjectStorage, RunLedger, StoragePath};
use tracing::{info, instrument, warn};

use crate::config::{FetchSettings, PipelineConfig};
use crate::error::{ledger_error, storage_error};
use crate::fetch::{ArtifactFetcher, FetchConfig, FetchedArtifact};
use crate::metrics;
use crate::order::OrderStatusClient;
use crate::publish::Publisher;
use crate::rollup::{write_rollup, RollupReport};
use crate::table::SummaryTable;

/// Summary of one run, handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub order_url: String,
    pub site: String,
    pub order_state: OrderState,
    /// Stage the run ended in
    pub stage: PipelineStage,
    /// Result artifacts the order listed
    pub requested: usize,
    /// Result artifacts available locally after fetching
    pub fetched: usize,
    /// Rasters matching the clip suffix
    pub rasters: usize,
    /// Rows appended by this invocation
    pub rows_written: usize,
    /// Rasters already summarized by an earlier invocation of the same run
    pub rows_existing: usize,
    /// Per-item fetch and decode failures
    pub failures: Vec<String>,
    pub publications: Vec<PublicationRecord>,
    /// Public URL of the site table; empty unless the order proceeded
    pub published_url: String,
}

impl RunReport {
    fn new(request: &OrderRequest, run_id: RunId) -> Self {
        Self {
            run_id,
            order_url: request.order_url.clone(),
            site: request.site.clone(),
            order_state: OrderState::Pending,
            stage: PipelineStage::PendingStatus,
            requested: 0,
            fetched: 0,
            rasters: 0,
            rows_written: 0,
            rows_existing: 0,
            failures: Vec::new(),
            publications: Vec::new(),
            published_url: String::new(),
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        if self.stage == next {
            return;
        }
        if !self.stage.can_advance_to(next) {
            warn!(from = %self.stage, to = %next, "Unexpected stage transition");
        }
        info!(run_id = %self.run_id, site = %self.site, stage = %next, "Stage");
        self.stage = next;
    }
}

impl From<RunReport> for TaskOutput {
    fn from(report: RunReport) -> Self {
        TaskOutput {
            order_url: report.order_url,
            name: report.site,
            published_url: report.published_url,
            order_state: Some(report.order_state),
            run_id: Some(report.run_id),
        }
    }
}

/// Build the HTTP client used for order status and artifact transfers.
pub fn build_http_client(settings: &FetchSettings) -> SceneResult<Client> {
    Client::builder()
        .timeout(settings.request_timeout())
        .connect_timeout(settings.request_timeout().min(Duration::from_secs(30)))
        .pool_max_idle_per_host(4)
        .build()
        .map_err(|e| {
            SceneError::Transport(TransportError::Request {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })
        })
}

/// Order fulfillment pipeline with its clients.
///
/// Every client is constructed once here and scoped to this pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    status: OrderStatusClient,
    fetcher: ArtifactFetcher,
    publisher: Publisher,
}

impl Pipeline {
    /// Construct clients from configuration.
    pub async fn connect(config: PipelineConfig) -> SceneResult<Self> {
        let client = build_http_client(&config.fetch)?;
        let storage = ObjectStorage::new(&config.storage)
            .await
            .map_err(storage_error)?;
        let ledger = RunLedger::open(&config.resolved_ledger_path())
            .await
            .map_err(ledger_error)?;

        Ok(Self::with_clients(config, client, storage, ledger))
    }

    /// Assemble a pipeline from already-built clients.
    pub fn with_clients(
        config: PipelineConfig,
        client: Client,
        storage: ObjectStorage,
        ledger: RunLedger,
    ) -> Self {
        let fetch_config = FetchConfig {
            overwrite: config.overwrite,
            max_retries: config.fetch.max_retries,
            initial_retry_delay: config.fetch.initial_retry_delay(),
            max_retry_delay: config.fetch.max_retry_delay(),
            max_concurrent: config.fetch.max_concurrent_fetches,
        };

        Self {
            status: OrderStatusClient::new(client.clone(), config.api_key.clone()),
            fetcher: ArtifactFetcher::new(client, ledger.clone(), fetch_config),
            publisher: Publisher::new(storage, ledger),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Process one task input; a fresh run id is generated unless the input
    /// re-enters an earlier run.
    pub async fn invoke(&self, input: &TaskInput) -> SceneResult<TaskOutput> {
        let request = input.order_request()?;
        let run_id = input.run_id.clone().unwrap_or_else(RunId::generate);
        Ok(self.run(&request, run_id).await?.into())
    }

    /// Write and publish the cross-site rollup for the given task outputs.
    pub async fn rollup(&self, input: &TaskInput) -> SceneResult<RollupReport> {
        let run_id = input.run_id.clone().unwrap_or_else(RunId::generate);
        write_rollup(
            &input.task_outputs(),
            &run_id,
            &self.config.scratch_dir,
            &self.publisher,
        )
        .await
    }

    /// Run the pipeline for one order.
    #[instrument(skip(self, request, run_id), fields(site = %request.site, run_id = %run_id))]
    pub async fn run(&self, request: &OrderRequest, run_id: RunId) -> SceneResult<RunReport> {
        let mut report = RunReport::new(request, run_id);
        info!(order_url = %request.order_url, "Working on site");

        let status = self.status.status(&request.order_url).await?;
        report.order_state = status.state.clone();

        if status.state.is_failed() {
            info!(state = %status.state, "Order failed, nothing to process");
            report.advance(PipelineStage::Failed);
            return Ok(report);
        }
        if !status.state.should_proceed() {
            info!(state = %status.state, "Order not ready");
            report.advance(PipelineStage::NotReady);
            return Ok(report);
        }

        report.advance(PipelineStage::Fetching);
        report.requested = status.results.len();
        let destination = self.config.scratch_dir.join(&request.site);
        let fetch = self.fetcher.fetch_all(&status.results, &destination).await;
        report.fetched = fetch.fetched_count();
        report
            .failures
            .extend(fetch.failures.iter().map(|e| e.to_string()));

        if report.requested > 0 && report.fetched == 0 {
            return Err(SceneError::NothingFetched {
                requested: report.requested,
            });
        }

        let rasters: Vec<&FetchedArtifact> = fetch
            .fetched
            .iter()
            .filter(|a| a.name.ends_with(&self.config.raster_suffix))
            .collect();
        report.rasters = rasters.len();
        info!(rasters = rasters.len(), "Selected rasters");
        report.advance(PipelineStage::Extracting);

        let table_path = self.config.scratch_dir.join(StoragePath::site_summary_file(
            report.run_id.as_str(),
            &request.site,
        ));
        let mut table = SummaryTable::open(&table_path).await?;

        let mut attempted = 0;
        let mut undecodable = 0;

        for artifact in rasters {
            report.advance(PipelineStage::Extracting);
            let item_id = file_name(&artifact.name).to_string();
            let raw_key = StoragePath::raw_artifact(
                &self.config.provider,
                &request.site,
                report.run_id.as_str(),
                &item_id,
            );

            if table.contains(&item_id) {
                let record = self
                    .publisher
                    .publish(&artifact.path, &raw_key, &report.run_id)
                    .await?;
                report.publications.push(record);
                report.rows_existing += 1;
                continue;
            }
            attempted += 1;

            let path = artifact.path.clone();
            let bands = match tokio::task::spawn_blocking(move || extract_bands(&path))
                .await
                .map_err(|e| SceneError::Compute(e.to_string()))?
            {
                Ok(bands) => bands,
                Err(e) => {
                    warn!(item_id = %item_id, error = %e, "Skipping raster that failed to decode");
                    metrics::record_decode_failure();
                    report.failures.push(e.to_string());
                    undecodable += 1;
                    continue;
                }
            };

            report.advance(PipelineStage::Computing);
            let site = request.site.clone();
            let row_item = item_id.clone();
            let mode = self.config.reflectance;
            let row = tokio::task::spawn_blocking(move || {
                StatisticsRow::compute(&site, &row_item, bands, &mode)
            })
            .await
            .map_err(|e| SceneError::Compute(e.to_string()))?
            .map_err(|e| match e {
                SpectralError::Decode(e) => SceneError::Decode(e),
                other => SceneError::Compute(other.to_string()),
            })?;

            let record = self
                .publisher
                .publish(&artifact.path, &raw_key, &report.run_id)
                .await?;
            report.publications.push(record);

            if table.append_row(&row).await? {
                metrics::record_row_written();
                report.rows_written += 1;
            }
            info!(
                item_id = %item_id,
                ndvi_mean = row.ndvi.mean,
                valid_cells = row.ndvi.valid_cells,
                "Summarized raster"
            );
        }

        if attempted > 0 && undecodable == attempted && table.row_count() == 0 {
            return Err(SceneError::NoDecodableRasters { attempted });
        }

        let table_path = table.close().await?;
        report.advance(PipelineStage::TableWritten);

        let key = StoragePath::site_summary(
            &self.config.provider,
            report.run_id.as_str(),
            &request.site,
        );
        let record = self
            .publisher
            .publish(&table_path, &key, &report.run_id)
            .await?;
        report.published_url = record.url.clone();
        report.publications.push(record);
        report.advance(PipelineStage::Published);

        info!(
            rows_written = report.rows_written,
            rows_existing = report.rows_existing,
            failures = report.failures.len(),
            url = %report.published_url,
            "Run complete"
        );
        Ok(report)
    }
}

/// Last path segment of a logical artifact name.
fn file_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
