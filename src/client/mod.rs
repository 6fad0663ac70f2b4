//! Client orchestration
//!
//! The worker runs on its own thread and owns the service connection, the
//! lifecycle state machine, and the status poller. The frontend talks to it
//! exclusively through bounded channels via a `SessionHandle`.

pub mod http;
pub mod lifecycle;
#[cfg(feature = "mock-service")]
pub mod mock;
pub mod poller;
pub mod service;
pub mod worker;

use crate::config::ClientConfig;
use crate::error::{AutomlError, Result};
use crate::types::{
    DatasetEntry, DatasetMetadata, PipelineConfig, PipelineRun, Predictions, ReportId,
    ReportPayload,
};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

pub use http::HttpServiceBackend;
pub use lifecycle::{LifecycleSnapshot, PipelineLifecycle, RunPhase};
#[cfg(feature = "mock-service")]
pub use mock::MockServiceBackend;
pub use poller::StatusPoller;
pub use service::{AutomlService, ServiceStats};
pub use worker::ClientWorker;

/// Commands sent from the frontend to the worker
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Upload a dataset file
    StartUpload { bytes: Vec<u8>, filename: String },
    /// Refetch metadata for the current dataset
    FetchMetadata,
    /// Validate, freeze, and submit a pipeline configuration
    Submit { config: PipelineConfig },
    /// Fetch the report of the current run
    FetchReport,
    /// Apply a trained model to new example data
    ApplyModel {
        report_id: ReportId,
        examples: serde_json::Value,
    },
    ListDatasets,
    ListRuns,
    /// Cancel the current run
    Cancel,
    /// Reset a failed run back to idle
    Retry,
    Shutdown,
}

/// Messages sent from the worker to the frontend
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// The lifecycle changed; full snapshot attached
    Lifecycle(LifecycleSnapshot),
    Metadata(DatasetMetadata),
    Report(ReportPayload),
    /// The report does not exist yet; try again later
    ReportPending { report_id: ReportId },
    Predictions(Predictions),
    Datasets(Vec<DatasetEntry>),
    Runs(Vec<PipelineRun>),
    /// A non-fatal error the frontend may want to display
    Error(String),
    Shutdown,
}

/// Frontend half of a client session
pub struct SessionHandle {
    command_tx: Sender<ClientCommand>,
    message_rx: Receiver<ClientMessage>,
}

impl SessionHandle {
    pub fn send_command(&self, command: ClientCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|e| AutomlError::Channel(format!("worker disconnected: {}", e)))
    }

    /// Receive one pending message without blocking
    pub fn try_recv(&self) -> Option<ClientMessage> {
        match self.message_rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drain all pending messages
    pub fn drain(&self) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Some(message) = self.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub fn start_upload(&self, bytes: Vec<u8>, filename: impl Into<String>) -> Result<()> {
        self.send_command(ClientCommand::StartUpload {
            bytes,
            filename: filename.into(),
        })
    }

    pub fn submit(&self, config: PipelineConfig) -> Result<()> {
        self.send_command(ClientCommand::Submit { config })
    }

    pub fn fetch_report(&self) -> Result<()> {
        self.send_command(ClientCommand::FetchReport)
    }

    pub fn apply_model(&self, report_id: ReportId, examples: serde_json::Value) -> Result<()> {
        self.send_command(ClientCommand::ApplyModel {
            report_id,
            examples,
        })
    }

    pub fn cancel(&self) -> Result<()> {
        self.send_command(ClientCommand::Cancel)
    }

    pub fn retry(&self) -> Result<()> {
        self.send_command(ClientCommand::Retry)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(ClientCommand::Shutdown)
    }
}

/// Owning handle for the worker side; call `run()` on a dedicated thread
pub struct AutomlClient {
    worker: ClientWorker,
}

impl AutomlClient {
    /// Create a client backed by the real HTTP service
    pub fn new(config: ClientConfig) -> (Self, SessionHandle) {
        let service = Box::new(HttpServiceBackend::new(&config.server));
        Self::with_service(config, service)
    }

    /// Create a client with an injected service backend
    pub fn with_service(
        config: ClientConfig,
        service: Box<dyn AutomlService>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = bounded(config.polling.command_buffer);
        let (message_tx, message_rx) = bounded(config.polling.message_buffer);
        let worker = ClientWorker::new(config, service, command_rx, message_tx);
        (
            Self { worker },
            SessionHandle {
                command_tx,
                message_rx,
            },
        )
    }

    /// Run the worker loop until shutdown; blocks the calling thread
    pub fn run(self) {
        self.worker.run();
    }
}
