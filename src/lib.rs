//! Client-side orchestration for a remote AutoML training service.
//!
//! The crate drives the full life of one training pipeline: upload a
//! dataset, configure and submit a pipeline, poll the task status, and
//! fetch the finished report. The worker runs on its own thread and the
//! caller talks to it over channels through a [`SessionHandle`].

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::{
    AutomlClient, AutomlService, ClientCommand, ClientMessage, HttpServiceBackend,
    LifecycleSnapshot, PipelineLifecycle, RunPhase, SessionHandle, StatusPoller,
};
#[cfg(feature = "mock-service")]
pub use client::MockServiceBackend;
pub use config::ClientConfig;
pub use error::{AutomlError, Result};
pub use types::{
    DatasetId, DatasetMetadata, ModelKind, PipelineConfig, Predictions, ReportId, TaskId,
    TaskStatus, TaskType,
};
