//! HTTP implementation of the service interface
//!
//! Wire contract notes: the service answers some lookups with HTTP 200 and
//! an `{"error": …}` body instead of a 404; those are normalized into the
//! same error taxonomy here so callers never see the difference.

use crate::client::service::{AutomlService, ServiceStats};
use crate::config::ServerConfig;
use crate::error::{AutomlError, Result};
use crate::types::{
    DatasetEntry, DatasetId, DatasetMetadata, PipelineConfig, PipelineRun, Predictions, ReportId,
    ReportPayload, SubmissionReceipt, TaskId, TaskStatus, UploadReceipt,
};
use serde::Deserialize;
use std::time::{Duration, Instant};

const MULTIPART_BOUNDARY: &str = "----automl-client-boundary-7f3a9c";
const REPORT_FILENAME: &str = "report.json";

#[derive(Deserialize)]
struct UploadResponse {
    file_id: String,
    filename: String,
}

#[derive(Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    columns: Vec<String>,
}

#[derive(Deserialize)]
struct DatasetListResponse {
    #[serde(default)]
    datasets: Vec<DatasetEntry>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    task_id: String,
    report_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Deserialize)]
struct RunListResponse {
    #[serde(default)]
    pipelines: Vec<PipelineRun>,
}

/// `AutomlService` backed by the real HTTP API
pub struct HttpServiceBackend {
    agent: ureq::Agent,
    base_url: String,
    stats: ServiceStats,
}

impl HttpServiceBackend {
    pub fn new(config: &ServerConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            stats: ServiceStats::default(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Run one request, recording timing and error counts
    fn run(
        &mut self,
        request: impl FnOnce(&ureq::Agent) -> std::result::Result<ureq::Response, ureq::Error>,
    ) -> Result<ureq::Response> {
        let started = Instant::now();
        match request(&self.agent) {
            Ok(response) => {
                self.stats.record_success(started.elapsed());
                Ok(response)
            }
            Err(err @ ureq::Error::Transport(_)) => {
                self.stats.record_transport_error();
                Err(err.into())
            }
            Err(err) => {
                self.stats.record_server_error(started.elapsed());
                Err(err.into())
            }
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.run(|agent| agent.get(&url).call())?;
        response
            .into_json()
            .map_err(|e| AutomlError::Serialization(e.to_string()))
    }

    /// Reject 200 responses whose body is an `{"error": …}` object
    fn reject_error_body(value: &serde_json::Value) -> Result<()> {
        if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
            if message.to_ascii_lowercase().contains("not found") {
                return Err(AutomlError::NotFound(message.to_string()));
            }
            return Err(AutomlError::Server {
                status: 200,
                message: message.to_string(),
            });
        }
        Ok(())
    }

    fn parse_metadata(value: serde_json::Value) -> Result<DatasetMetadata> {
        Self::reject_error_body(&value)?;
        let parsed: MetadataResponse =
            serde_json::from_value(value).map_err(|e| AutomlError::Serialization(e.to_string()))?;
        Ok(DatasetMetadata::new(parsed.columns))
    }

    fn parse_submission(value: serde_json::Value) -> Result<SubmissionReceipt> {
        Self::reject_error_body(&value)?;
        let parsed: SubmitResponse =
            serde_json::from_value(value).map_err(|e| AutomlError::Serialization(e.to_string()))?;
        if parsed.task_id.is_empty() || parsed.report_id.is_empty() {
            return Err(AutomlError::Server {
                status: 200,
                message: "submission response missing task or report id".to_string(),
            });
        }
        Ok(SubmissionReceipt {
            task_id: TaskId::new(parsed.task_id),
            report_id: ReportId::new(parsed.report_id),
        })
    }

    /// Build a single-part multipart/form-data body for a file upload
    fn multipart_body(bytes: &[u8], filename: &str) -> Vec<u8> {
        let mut body = Vec::with_capacity(bytes.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
        body
    }
}

impl AutomlService for HttpServiceBackend {
    fn upload_dataset(&mut self, bytes: &[u8], filename: &str) -> Result<UploadReceipt> {
        let url = self.url("/upload_data");
        let body = Self::multipart_body(bytes, filename);
        let content_type = format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY);
        let response = self.run(|agent| {
            agent
                .post(&url)
                .set("Content-Type", &content_type)
                .send_bytes(&body)
        })?;

        let parsed: UploadResponse = response
            .into_json()
            .map_err(|e| AutomlError::Serialization(e.to_string()))?;
        if parsed.file_id.is_empty() {
            return Err(AutomlError::Server {
                status: 200,
                message: "upload response carried no dataset id".to_string(),
            });
        }
        Ok(UploadReceipt {
            dataset_id: DatasetId::new(parsed.file_id),
            filename: parsed.filename,
        })
    }

    fn dataset_metadata(&mut self, id: &DatasetId) -> Result<DatasetMetadata> {
        let value: serde_json::Value =
            self.get_json(&format!("/get_dataset_info?file_id={}", id))?;
        Self::parse_metadata(value)
    }

    fn list_datasets(&mut self) -> Result<Vec<DatasetEntry>> {
        let parsed: DatasetListResponse = self.get_json("/list_datasets")?;
        Ok(parsed.datasets)
    }

    fn submit_pipeline(
        &mut self,
        dataset: &DatasetId,
        config: &PipelineConfig,
    ) -> Result<SubmissionReceipt> {
        let url = self.url(&format!("/run_pipeline/{}", dataset));
        let payload = serde_json::json!({
            "target_column": config.target_column,
            "task_type": config.task_type,
            "sep": config.sep,
            "dataset_name": config.dataset_name,
            "model_name": config.model_name.api_name(),
        });
        let response = self.run(|agent| agent.post(&url).send_json(payload))?;

        let value: serde_json::Value = response
            .into_json()
            .map_err(|e| AutomlError::Serialization(e.to_string()))?;
        Self::parse_submission(value)
    }

    fn task_status(&mut self, id: &TaskId) -> Result<TaskStatus> {
        let parsed: StatusResponse = self.get_json(&format!("/task_status/{}", id))?;
        if parsed.status == "Task not found" {
            return Err(AutomlError::NotFound(format!("task {}", id)));
        }
        Ok(TaskStatus::parse(&parsed.status))
    }

    fn fetch_report(&mut self, id: &ReportId) -> Result<ReportPayload> {
        // Missing reports come back as 200 with an error body
        let data: serde_json::Value =
            self.get_json(&format!("/download_report/{}/{}", id, REPORT_FILENAME))?;
        Self::reject_error_body(&data)?;
        Ok(ReportPayload::new(data))
    }

    fn report_url(&self, id: &ReportId, filename: &str) -> String {
        format!("{}/download_report/{}/{}", self.base_url, id, filename)
    }

    fn apply_model(&mut self, report: &ReportId, examples: &serde_json::Value) -> Result<Predictions> {
        let url = self.url("/apply_model");
        let payload = serde_json::json!({
            "report_id": report.as_str(),
            "data": examples,
        });
        let response = self.run(|agent| agent.post(&url).send_json(payload))?;
        let value: serde_json::Value = response
            .into_json()
            .map_err(|e| AutomlError::Serialization(e.to_string()))?;
        Self::reject_error_body(&value)?;
        Ok(Predictions::new(value))
    }

    fn list_runs(&mut self) -> Result<Vec<PipelineRun>> {
        let parsed: RunListResponse = self.get_json("/list_pipelines")?;
        Ok(parsed.pipelines)
    }

    fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    fn reset_stats(&mut self) {
        self.stats.reset();
    }
}
