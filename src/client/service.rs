//! Service abstraction layer
//!
//! The `AutomlService` trait is the seam between the orchestration core and
//! the remote training service: everything above it works in terms of opaque
//! identifiers and domain types, and never sees HTTP.

use crate::error::Result;
use crate::types::{
    DatasetEntry, DatasetId, DatasetMetadata, PipelineConfig, PipelineRun, Predictions, ReportId,
    ReportPayload, SubmissionReceipt, TaskId, TaskStatus, UploadReceipt,
};
use std::time::Duration;

/// Statistics about requests made through a service backend
#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    /// Total requests attempted
    pub requests: u64,
    /// Requests that failed before a response arrived
    pub transport_errors: u64,
    /// Requests the service answered with an error
    pub server_errors: u64,
    /// Minimum observed request duration
    pub min_latency: Option<Duration>,
    /// Maximum observed request duration
    pub max_latency: Option<Duration>,
    /// Sum of all request durations, for averaging
    total_latency: Duration,
}

impl ServiceStats {
    pub fn record_success(&mut self, latency: Duration) {
        self.requests += 1;
        self.record_latency(latency);
    }

    pub fn record_transport_error(&mut self) {
        self.requests += 1;
        self.transport_errors += 1;
    }

    pub fn record_server_error(&mut self, latency: Duration) {
        self.requests += 1;
        self.server_errors += 1;
        self.record_latency(latency);
    }

    fn record_latency(&mut self, latency: Duration) {
        self.total_latency += latency;
        self.min_latency = Some(match self.min_latency {
            Some(min) => min.min(latency),
            None => latency,
        });
        self.max_latency = Some(match self.max_latency {
            Some(max) => max.max(latency),
            None => latency,
        });
    }

    /// Average duration of requests that produced a response
    pub fn avg_latency(&self) -> Option<Duration> {
        let answered = self.requests - self.transport_errors;
        if answered == 0 {
            None
        } else {
            Some(self.total_latency / answered as u32)
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Interface to the remote AutoML service
///
/// All methods block; callers run on the worker thread. Implementations
/// must be safe to move across threads but are only ever used from one.
#[cfg_attr(test, mockall::automock)]
pub trait AutomlService: Send {
    /// Upload a dataset file, receiving its service-side identifier
    fn upload_dataset(&mut self, bytes: &[u8], filename: &str) -> Result<UploadReceipt>;

    /// Fetch the column metadata of an uploaded dataset
    fn dataset_metadata(&mut self, id: &DatasetId) -> Result<DatasetMetadata>;

    /// List previously uploaded datasets
    fn list_datasets(&mut self) -> Result<Vec<DatasetEntry>>;

    /// Submit a pipeline for the given dataset
    ///
    /// On success the service returns a task id and report id as a pair.
    fn submit_pipeline(
        &mut self,
        dataset: &DatasetId,
        config: &PipelineConfig,
    ) -> Result<SubmissionReceipt>;

    /// Query the current status of a task
    fn task_status(&mut self, id: &TaskId) -> Result<TaskStatus>;

    /// Fetch a finished report as JSON
    ///
    /// Returns `NotFound` while the report does not exist yet.
    fn fetch_report(&mut self, id: &ReportId) -> Result<ReportPayload>;

    /// URL a browser could download the report from
    fn report_url(&self, id: &ReportId, filename: &str) -> String;

    /// Apply the trained model behind a report to new example data
    ///
    /// `examples` is the JSON document of rows to predict on.
    fn apply_model(&mut self, report: &ReportId, examples: &serde_json::Value)
        -> Result<Predictions>;

    /// List the service's pipeline run history
    fn list_runs(&mut self) -> Result<Vec<PipelineRun>>;

    /// Request statistics for this backend
    fn stats(&self) -> &ServiceStats;

    fn reset_stats(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_latency_tracking() {
        let mut stats = ServiceStats::default();
        stats.record_success(Duration::from_millis(10));
        stats.record_success(Duration::from_millis(30));
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.min_latency, Some(Duration::from_millis(10)));
        assert_eq!(stats.max_latency, Some(Duration::from_millis(30)));
        assert_eq!(stats.avg_latency(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_stats_error_counting() {
        let mut stats = ServiceStats::default();
        stats.record_transport_error();
        stats.record_server_error(Duration::from_millis(5));
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.transport_errors, 1);
        assert_eq!(stats.server_errors, 1);
        // Transport errors never saw a response, so they carry no latency
        assert_eq!(stats.avg_latency(), Some(Duration::from_millis(5)));

        stats.reset();
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.avg_latency(), None);
    }
}
