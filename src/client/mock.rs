//! In-memory service backend for tests and offline use
//!
//! Builder-style: script the status sequence and inject failures up front,
//! then hand the backend to a worker. Every submission is recorded so tests
//! can assert how many times the service was actually asked to train.

use crate::client::service::{AutomlService, ServiceStats};
use crate::error::{AutomlError, Result};
use crate::types::{
    DatasetEntry, DatasetId, DatasetMetadata, PipelineConfig, PipelineRun, Predictions, ReportId,
    ReportPayload, SubmissionReceipt, TaskId, TaskStatus, UploadReceipt,
};
use std::collections::VecDeque;
use std::time::Duration;

pub struct MockServiceBackend {
    columns: Vec<String>,
    /// Statuses returned by successive status checks; the last one repeats
    status_script: VecDeque<TaskStatus>,
    last_status: TaskStatus,
    fail_next_uploads: u32,
    fail_next_submits: u32,
    /// Status checks that fail with a transport error before answering
    fail_next_status_checks: u32,
    /// Report fetches answered with NotFound before the report "appears"
    report_not_ready_fetches: u32,
    report: serde_json::Value,
    predictions: serde_json::Value,
    datasets: Vec<DatasetEntry>,
    runs: Vec<PipelineRun>,
    submissions: Vec<(DatasetId, PipelineConfig)>,
    applications: Vec<(ReportId, serde_json::Value)>,
    uploads: Vec<String>,
    next_id: u32,
    stats: ServiceStats,
}

impl Default for MockServiceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServiceBackend {
    pub fn new() -> Self {
        Self {
            columns: vec!["feature_a".to_string(), "feature_b".to_string(), "target".to_string()],
            status_script: VecDeque::new(),
            last_status: TaskStatus::Succeeded,
            fail_next_uploads: 0,
            fail_next_submits: 0,
            fail_next_status_checks: 0,
            report_not_ready_fetches: 0,
            report: serde_json::json!({ "accuracy": 0.93, "model": "Random Forest" }),
            predictions: serde_json::json!({ "predictions": [0, 1, 0] }),
            datasets: Vec::new(),
            runs: Vec::new(),
            submissions: Vec::new(),
            applications: Vec::new(),
            uploads: Vec::new(),
            next_id: 0,
            stats: ServiceStats::default(),
        }
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Script the sequence of statuses returned by status checks
    pub fn with_status_script(mut self, statuses: &[TaskStatus]) -> Self {
        self.status_script = statuses.iter().cloned().collect();
        if let Some(last) = statuses.last() {
            self.last_status = last.clone();
        }
        self
    }

    pub fn with_upload_failures(mut self, count: u32) -> Self {
        self.fail_next_uploads = count;
        self
    }

    pub fn with_submit_failures(mut self, count: u32) -> Self {
        self.fail_next_submits = count;
        self
    }

    /// Make the next `count` status checks fail with a transport error
    pub fn with_transient_status_failures(mut self, count: u32) -> Self {
        self.fail_next_status_checks = count;
        self
    }

    /// Make the first `count` report fetches answer NotFound
    pub fn with_report_not_ready(mut self, count: u32) -> Self {
        self.report_not_ready_fetches = count;
        self
    }

    pub fn with_report(mut self, report: serde_json::Value) -> Self {
        self.report = report;
        self
    }

    pub fn with_predictions(mut self, predictions: serde_json::Value) -> Self {
        self.predictions = predictions;
        self
    }

    /// Submissions the backend has accepted, in order
    pub fn submissions(&self) -> &[(DatasetId, PipelineConfig)] {
        &self.submissions
    }

    /// Model applications the backend has served, in order
    pub fn applications(&self) -> &[(ReportId, serde_json::Value)] {
        &self.applications
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.len()
    }

    fn mint_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl AutomlService for MockServiceBackend {
    fn upload_dataset(&mut self, _bytes: &[u8], filename: &str) -> Result<UploadReceipt> {
        if self.fail_next_uploads > 0 {
            self.fail_next_uploads -= 1;
            self.stats.record_transport_error();
            return Err(AutomlError::Transport("mock upload failure".to_string()));
        }
        self.stats.record_success(Duration::ZERO);
        let id = DatasetId::new(format!("ds-{}", self.mint_id()));
        self.uploads.push(filename.to_string());
        self.datasets.push(DatasetEntry {
            id: id.clone(),
            filename: filename.to_string(),
        });
        Ok(UploadReceipt {
            dataset_id: id,
            filename: filename.to_string(),
        })
    }

    fn dataset_metadata(&mut self, id: &DatasetId) -> Result<DatasetMetadata> {
        if !self.datasets.iter().any(|d| &d.id == id) {
            return Err(AutomlError::NotFound(format!("dataset {}", id)));
        }
        self.stats.record_success(Duration::ZERO);
        Ok(DatasetMetadata::new(self.columns.clone()))
    }

    fn list_datasets(&mut self) -> Result<Vec<DatasetEntry>> {
        self.stats.record_success(Duration::ZERO);
        Ok(self.datasets.clone())
    }

    fn submit_pipeline(
        &mut self,
        dataset: &DatasetId,
        config: &PipelineConfig,
    ) -> Result<SubmissionReceipt> {
        if self.fail_next_submits > 0 {
            self.fail_next_submits -= 1;
            self.stats.record_server_error(Duration::ZERO);
            return Err(AutomlError::Server {
                status: 500,
                message: "mock submit failure".to_string(),
            });
        }
        self.stats.record_success(Duration::ZERO);
        let n = self.mint_id();
        let receipt = SubmissionReceipt {
            task_id: TaskId::new(format!("task-{}", n)),
            report_id: ReportId::new(format!("rep-{}", n)),
        };
        self.submissions.push((dataset.clone(), config.clone()));
        self.runs.push(PipelineRun {
            task_id: receipt.task_id.clone(),
            report_id: receipt.report_id.clone(),
            status: "Running".to_string(),
            dataset_name: config.dataset_name.clone(),
            model_name: config.model_name.api_name().to_string(),
            created_at: chrono::Utc::now(),
        });
        Ok(receipt)
    }

    fn task_status(&mut self, _id: &TaskId) -> Result<TaskStatus> {
        if self.fail_next_status_checks > 0 {
            self.fail_next_status_checks -= 1;
            self.stats.record_transport_error();
            return Err(AutomlError::Transport(
                "mock status check failure".to_string(),
            ));
        }
        self.stats.record_success(Duration::ZERO);
        Ok(self
            .status_script
            .pop_front()
            .unwrap_or_else(|| self.last_status.clone()))
    }

    fn fetch_report(&mut self, id: &ReportId) -> Result<ReportPayload> {
        if self.report_not_ready_fetches > 0 {
            self.report_not_ready_fetches -= 1;
            self.stats.record_success(Duration::ZERO);
            return Err(AutomlError::NotFound(format!("report {}", id)));
        }
        self.stats.record_success(Duration::ZERO);
        Ok(ReportPayload::new(self.report.clone()))
    }

    fn report_url(&self, id: &ReportId, filename: &str) -> String {
        format!("mock://reports/{}/{}", id, filename)
    }

    fn apply_model(
        &mut self,
        report: &ReportId,
        examples: &serde_json::Value,
    ) -> Result<Predictions> {
        if !self.runs.iter().any(|r| &r.report_id == report) {
            return Err(AutomlError::NotFound(format!("report {}", report)));
        }
        self.stats.record_success(Duration::ZERO);
        self.applications.push((report.clone(), examples.clone()));
        Ok(Predictions::new(self.predictions.clone()))
    }

    fn list_runs(&mut self) -> Result<Vec<PipelineRun>> {
        self.stats.record_success(Duration::ZERO);
        Ok(self.runs.clone())
    }

    fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
    }
}
