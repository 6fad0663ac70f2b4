//! Pipeline lifecycle state machine
//!
//! One `PipelineLifecycle` tracks one dataset/pipeline run from upload to
//! report. It is the single owner of the run's identifiers and guards every
//! phase transition; the worker never mutates identifiers directly.

use crate::error::{AutomlError, Result};
use crate::types::{
    DatasetId, DatasetMetadata, PipelineConfig, ReportId, SubmissionReceipt, TaskId, TaskStatus,
    UploadReceipt,
};

/// Phase of the current pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Uploading,
    Uploaded,
    Submitting,
    Polling,
    Done,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Idle => "Idle",
            RunPhase::Uploading => "Uploading",
            RunPhase::Uploaded => "Uploaded",
            RunPhase::Submitting => "Submitting",
            RunPhase::Polling => "Polling",
            RunPhase::Done => "Done",
            RunPhase::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Read-only view of the lifecycle, sent to the frontend on every change
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSnapshot {
    pub phase: RunPhase,
    pub dataset_id: Option<DatasetId>,
    pub task_id: Option<TaskId>,
    pub report_id: Option<ReportId>,
    pub last_status: Option<TaskStatus>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct PipelineLifecycle {
    phase: Phase,
    metadata: Option<DatasetMetadata>,
    last_status: Option<TaskStatus>,
    last_error: Option<String>,
}

/// Internal phase representation; identifiers live inside the phase they
/// belong to, so a phase without its ids is unrepresentable.
#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Uploading,
    Uploaded {
        dataset_id: DatasetId,
    },
    Submitting {
        dataset_id: DatasetId,
        config: PipelineConfig,
    },
    Polling {
        dataset_id: DatasetId,
        config: PipelineConfig,
        task_id: TaskId,
        report_id: ReportId,
    },
    Done {
        dataset_id: DatasetId,
        config: PipelineConfig,
        task_id: TaskId,
        report_id: ReportId,
    },
    Failed {
        dataset_id: Option<DatasetId>,
        task_id: Option<TaskId>,
        report_id: Option<ReportId>,
    },
}

impl PipelineLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RunPhase {
        match &self.phase {
            Phase::Idle => RunPhase::Idle,
            Phase::Uploading => RunPhase::Uploading,
            Phase::Uploaded { .. } => RunPhase::Uploaded,
            Phase::Submitting { .. } => RunPhase::Submitting,
            Phase::Polling { .. } => RunPhase::Polling,
            Phase::Done { .. } => RunPhase::Done,
            Phase::Failed { .. } => RunPhase::Failed,
        }
    }

    pub fn dataset_id(&self) -> Option<&DatasetId> {
        match &self.phase {
            Phase::Idle | Phase::Uploading => None,
            Phase::Uploaded { dataset_id }
            | Phase::Submitting { dataset_id, .. }
            | Phase::Polling { dataset_id, .. }
            | Phase::Done { dataset_id, .. } => Some(dataset_id),
            Phase::Failed { dataset_id, .. } => dataset_id.as_ref(),
        }
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match &self.phase {
            Phase::Polling { task_id, .. } | Phase::Done { task_id, .. } => Some(task_id),
            Phase::Failed { task_id, .. } => task_id.as_ref(),
            _ => None,
        }
    }

    pub fn report_id(&self) -> Option<&ReportId> {
        match &self.phase {
            Phase::Polling { report_id, .. } | Phase::Done { report_id, .. } => Some(report_id),
            Phase::Failed { report_id, .. } => report_id.as_ref(),
            _ => None,
        }
    }

    pub fn metadata(&self) -> Option<&DatasetMetadata> {
        self.metadata.as_ref()
    }

    /// The configuration frozen at submission time, if a run is in flight
    pub fn frozen_config(&self) -> Option<&PipelineConfig> {
        match &self.phase {
            Phase::Submitting { config, .. }
            | Phase::Polling { config, .. }
            | Phase::Done { config, .. } => Some(config),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            phase: self.phase(),
            dataset_id: self.dataset_id().cloned(),
            task_id: self.task_id().cloned(),
            report_id: self.report_id().cloned(),
            last_status: self.last_status.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn reject(&self, operation: &str) -> AutomlError {
        AutomlError::Validation(format!("cannot {} while {}", operation, self.phase()))
    }

    /// Start uploading a dataset; only valid from `Idle`
    pub fn begin_upload(&mut self) -> Result<()> {
        match self.phase {
            Phase::Idle => {
                self.phase = Phase::Uploading;
                Ok(())
            }
            _ => Err(self.reject("start an upload")),
        }
    }

    /// Record a successful upload; previous metadata no longer applies
    pub fn upload_succeeded(&mut self, receipt: UploadReceipt) -> Result<()> {
        match self.phase {
            Phase::Uploading => {
                self.phase = Phase::Uploaded {
                    dataset_id: receipt.dataset_id,
                };
                self.metadata = None;
                self.last_error = None;
                Ok(())
            }
            _ => Err(self.reject("record an upload result")),
        }
    }

    pub fn upload_failed(&mut self, error: &AutomlError) -> Result<()> {
        match self.phase {
            Phase::Uploading => {
                self.fail(error.to_string());
                Ok(())
            }
            _ => Err(self.reject("record an upload failure")),
        }
    }

    /// Attach freshly fetched metadata for the current dataset
    pub fn set_metadata(&mut self, metadata: DatasetMetadata) -> Result<()> {
        if self.dataset_id().is_none() {
            return Err(self.reject("attach metadata"));
        }
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Validate and freeze a configuration, entering `Submitting`
    ///
    /// Rejected outside `Uploaded`: at most one submission may be in
    /// flight, and a dataset must exist to submit against. Validation
    /// failures leave the phase untouched and never reach the network.
    pub fn begin_submit(&mut self, config: PipelineConfig) -> Result<()> {
        match &self.phase {
            Phase::Uploaded { dataset_id } => {
                config.validate(self.metadata.as_ref())?;
                self.phase = Phase::Submitting {
                    dataset_id: dataset_id.clone(),
                    config,
                };
                Ok(())
            }
            _ => Err(self.reject("submit a pipeline")),
        }
    }

    /// Record a successful submission; both identifiers arrive together
    pub fn submit_succeeded(&mut self, receipt: SubmissionReceipt) -> Result<()> {
        match std::mem::take(&mut self.phase) {
            Phase::Submitting { dataset_id, config } => {
                self.phase = Phase::Polling {
                    dataset_id,
                    config,
                    task_id: receipt.task_id,
                    report_id: receipt.report_id,
                };
                self.last_status = None;
                Ok(())
            }
            other => {
                self.phase = other;
                Err(self.reject("record a submission result"))
            }
        }
    }

    pub fn submit_failed(&mut self, error: &AutomlError) -> Result<()> {
        match &self.phase {
            Phase::Submitting { .. } => {
                self.fail(error.to_string());
                Ok(())
            }
            _ => Err(self.reject("record a submission failure")),
        }
    }

    /// Record a status observation while polling
    ///
    /// Returns the resulting phase so the caller can release the poller on
    /// terminal statuses.
    pub fn status_observed(&mut self, status: TaskStatus) -> Result<RunPhase> {
        match std::mem::take(&mut self.phase) {
            Phase::Polling {
                dataset_id,
                config,
                task_id,
                report_id,
            } => {
                self.last_status = Some(status.clone());
                match status {
                    TaskStatus::Succeeded => {
                        self.phase = Phase::Done {
                            dataset_id,
                            config,
                            task_id,
                            report_id,
                        };
                        Ok(RunPhase::Done)
                    }
                    TaskStatus::Failed(message) => {
                        self.phase = Phase::Failed {
                            dataset_id: Some(dataset_id),
                            task_id: Some(task_id),
                            report_id: Some(report_id),
                        };
                        self.last_error = Some(message);
                        Ok(RunPhase::Failed)
                    }
                    _ => {
                        self.phase = Phase::Polling {
                            dataset_id,
                            config,
                            task_id,
                            report_id,
                        };
                        Ok(RunPhase::Polling)
                    }
                }
            }
            other => {
                self.phase = other;
                Err(self.reject("record a task status"))
            }
        }
    }

    /// The poller gave up; the run fails with a distinguished error
    pub fn polling_abandoned(&mut self, attempts: u32) -> Result<()> {
        match std::mem::take(&mut self.phase) {
            Phase::Polling {
                dataset_id,
                task_id,
                report_id,
                ..
            } => {
                self.phase = Phase::Failed {
                    dataset_id: Some(dataset_id),
                    task_id: Some(task_id),
                    report_id: Some(report_id),
                };
                self.last_error = Some(AutomlError::PollingAbandoned { attempts }.to_string());
                Ok(())
            }
            other => {
                self.phase = other;
                Err(self.reject("abandon polling"))
            }
        }
    }

    /// Cancel the current run; valid from any non-terminal phase
    pub fn cancel(&mut self) -> Result<()> {
        match self.phase {
            Phase::Done { .. } => {
                return Err(AutomlError::Validation(
                    "cannot cancel a finished run".to_string(),
                ))
            }
            Phase::Failed { .. } => {
                return Err(AutomlError::Validation(
                    "cannot cancel a failed run".to_string(),
                ))
            }
            _ => {}
        }
        let (dataset_id, task_id, report_id) = match std::mem::take(&mut self.phase) {
            Phase::Uploaded { dataset_id } | Phase::Submitting { dataset_id, .. } => {
                (Some(dataset_id), None, None)
            }
            Phase::Polling {
                dataset_id,
                task_id,
                report_id,
                ..
            } => (Some(dataset_id), Some(task_id), Some(report_id)),
            _ => (None, None, None),
        };
        self.phase = Phase::Failed {
            dataset_id,
            task_id,
            report_id,
        };
        self.last_error = Some("cancelled".to_string());
        Ok(())
    }

    /// Reset a failed run back to `Idle`, discarding every identifier
    pub fn retry(&mut self) -> Result<()> {
        match self.phase {
            Phase::Failed { .. } => {
                self.phase = Phase::Idle;
                self.metadata = None;
                self.last_status = None;
                self.last_error = None;
                Ok(())
            }
            Phase::Done { .. } => Err(AutomlError::Validation(
                "cannot retry a finished run".to_string(),
            )),
            _ => Err(self.reject("retry")),
        }
    }

    fn fail(&mut self, message: String) {
        self.phase = Phase::Failed {
            dataset_id: None,
            task_id: None,
            report_id: None,
        };
        self.last_error = Some(message);
    }

    /// Structural invariants, checked by the property tests
    #[cfg(test)]
    fn assert_invariants(&self) {
        // Task and report ids exist together or not at all
        assert_eq!(self.task_id().is_some(), self.report_id().is_some());
        match self.phase() {
            RunPhase::Idle => {
                assert!(self.dataset_id().is_none());
                assert!(self.task_id().is_none());
            }
            RunPhase::Uploaded | RunPhase::Submitting => {
                assert!(self.dataset_id().is_some());
                assert!(self.task_id().is_none());
            }
            RunPhase::Polling | RunPhase::Done => {
                assert!(self.dataset_id().is_some());
                assert!(self.task_id().is_some());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DatasetMetadata;

    fn receipt(id: &str) -> UploadReceipt {
        UploadReceipt {
            dataset_id: DatasetId::new(id),
            filename: "data.csv".to_string(),
        }
    }

    fn submission(n: u32) -> SubmissionReceipt {
        SubmissionReceipt {
            task_id: TaskId::new(format!("task-{}", n)),
            report_id: ReportId::new(format!("rep-{}", n)),
        }
    }

    fn valid_config() -> PipelineConfig {
        PipelineConfig {
            target_column: "target".to_string(),
            ..Default::default()
        }
    }

    fn drive_to_polling(lc: &mut PipelineLifecycle) {
        lc.begin_upload().unwrap();
        lc.upload_succeeded(receipt("ds-1")).unwrap();
        lc.set_metadata(DatasetMetadata::new(vec!["target".to_string()]))
            .unwrap();
        lc.begin_submit(valid_config()).unwrap();
        lc.submit_succeeded(submission(1)).unwrap();
    }

    #[test]
    fn test_happy_path_to_done() {
        let mut lc = PipelineLifecycle::new();
        assert_eq!(lc.phase(), RunPhase::Idle);

        drive_to_polling(&mut lc);
        assert_eq!(lc.phase(), RunPhase::Polling);
        assert_eq!(lc.task_id().unwrap().as_str(), "task-1");
        assert_eq!(lc.report_id().unwrap().as_str(), "rep-1");

        assert_eq!(
            lc.status_observed(TaskStatus::Running).unwrap(),
            RunPhase::Polling
        );
        assert_eq!(
            lc.status_observed(TaskStatus::Succeeded).unwrap(),
            RunPhase::Done
        );
        // Done keeps the report id so the report can still be fetched
        assert_eq!(lc.report_id().unwrap().as_str(), "rep-1");
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        let mut lc = PipelineLifecycle::new();
        assert!(lc.begin_submit(valid_config()).is_err());
        assert!(lc.submit_succeeded(submission(1)).is_err());
        assert!(lc.status_observed(TaskStatus::Running).is_err());

        lc.begin_upload().unwrap();
        // A second upload cannot start while one is in flight
        assert!(lc.begin_upload().is_err());
    }

    #[test]
    fn test_validation_failure_keeps_phase() {
        let mut lc = PipelineLifecycle::new();
        lc.begin_upload().unwrap();
        lc.upload_succeeded(receipt("ds-1")).unwrap();
        lc.set_metadata(DatasetMetadata::new(vec!["other".to_string()]))
            .unwrap();

        let err = lc.begin_submit(valid_config()).unwrap_err();
        assert!(matches!(err, AutomlError::Validation(_)));
        assert_eq!(lc.phase(), RunPhase::Uploaded);
        // Still submittable after fixing the config
        lc.begin_submit(PipelineConfig {
            target_column: "other".to_string(),
            ..Default::default()
        })
        .unwrap();
    }

    #[test]
    fn test_at_most_one_submission_in_flight() {
        let mut lc = PipelineLifecycle::new();
        drive_to_polling(&mut lc);
        assert!(lc.begin_submit(valid_config()).is_err());
    }

    #[test]
    fn test_task_failure_and_retry_clears_identifiers() {
        let mut lc = PipelineLifecycle::new();
        drive_to_polling(&mut lc);

        lc.status_observed(TaskStatus::Failed("Error: bad data".to_string()))
            .unwrap();
        assert_eq!(lc.phase(), RunPhase::Failed);
        assert!(lc.last_error().unwrap().contains("bad data"));
        // Failed keeps the ids for inspection
        assert!(lc.task_id().is_some());

        lc.retry().unwrap();
        assert_eq!(lc.phase(), RunPhase::Idle);
        assert!(lc.dataset_id().is_none());
        assert!(lc.task_id().is_none());
        assert!(lc.report_id().is_none());
        assert!(lc.last_error().is_none());
    }

    #[test]
    fn test_polling_abandoned() {
        let mut lc = PipelineLifecycle::new();
        drive_to_polling(&mut lc);
        lc.polling_abandoned(5).unwrap();
        assert_eq!(lc.phase(), RunPhase::Failed);
        assert!(lc.last_error().unwrap().contains("abandoned"));
    }

    #[test]
    fn test_cancel_semantics() {
        let mut lc = PipelineLifecycle::new();
        drive_to_polling(&mut lc);
        lc.cancel().unwrap();
        assert_eq!(lc.phase(), RunPhase::Failed);
        assert_eq!(lc.last_error(), Some("cancelled"));

        // Terminal phases cannot be cancelled
        assert!(lc.cancel().is_err());

        let mut done = PipelineLifecycle::new();
        drive_to_polling(&mut done);
        done.status_observed(TaskStatus::Succeeded).unwrap();
        assert!(done.cancel().is_err());
        assert_eq!(done.phase(), RunPhase::Done);
    }

    #[test]
    fn test_done_is_terminal() {
        let mut lc = PipelineLifecycle::new();
        drive_to_polling(&mut lc);
        lc.status_observed(TaskStatus::Succeeded).unwrap();
        assert!(lc.retry().is_err());
        assert_eq!(lc.phase(), RunPhase::Done);
    }

    #[test]
    fn test_upload_replaces_stale_metadata() {
        let mut lc = PipelineLifecycle::new();
        lc.begin_upload().unwrap();
        lc.upload_succeeded(receipt("ds-1")).unwrap();
        lc.set_metadata(DatasetMetadata::new(vec!["a".to_string()]))
            .unwrap();
        lc.cancel().unwrap();
        lc.retry().unwrap();

        lc.begin_upload().unwrap();
        lc.upload_succeeded(receipt("ds-2")).unwrap();
        // Metadata from the previous dataset does not linger
        assert!(lc.metadata().is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone, Copy)]
        enum Op {
            BeginUpload,
            UploadOk,
            UploadErr,
            SetMetadata,
            BeginSubmit,
            SubmitOk,
            SubmitErr,
            StatusRunning,
            StatusSucceeded,
            StatusFailed,
            Abandon,
            Cancel,
            Retry,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                Just(Op::BeginUpload),
                Just(Op::UploadOk),
                Just(Op::UploadErr),
                Just(Op::SetMetadata),
                Just(Op::BeginSubmit),
                Just(Op::SubmitOk),
                Just(Op::SubmitErr),
                Just(Op::StatusRunning),
                Just(Op::StatusSucceeded),
                Just(Op::StatusFailed),
                Just(Op::Abandon),
                Just(Op::Cancel),
                Just(Op::Retry),
            ]
        }

        fn apply(lc: &mut PipelineLifecycle, op: Op, n: u32) {
            // Rejected transitions are expected; only invariants matter here
            let transport = AutomlError::Transport("injected".to_string());
            let _ = match op {
                Op::BeginUpload => lc.begin_upload(),
                Op::UploadOk => lc.upload_succeeded(receipt(&format!("ds-{}", n))),
                Op::UploadErr => lc.upload_failed(&transport),
                Op::SetMetadata => {
                    lc.set_metadata(DatasetMetadata::new(vec!["target".to_string()]))
                }
                Op::BeginSubmit => lc.begin_submit(valid_config()),
                Op::SubmitOk => lc.submit_succeeded(submission(n)),
                Op::SubmitErr => lc.submit_failed(&transport),
                Op::StatusRunning => lc.status_observed(TaskStatus::Running).map(|_| ()),
                Op::StatusSucceeded => lc.status_observed(TaskStatus::Succeeded).map(|_| ()),
                Op::StatusFailed => lc
                    .status_observed(TaskStatus::Failed("injected".to_string()))
                    .map(|_| ()),
                Op::Abandon => lc.polling_abandoned(5),
                Op::Cancel => lc.cancel(),
                Op::Retry => lc.retry(),
            };
        }

        proptest! {
            #[test]
            fn invariants_hold_under_any_interleaving(ops in prop::collection::vec(op_strategy(), 0..64)) {
                let mut lc = PipelineLifecycle::new();
                for (i, op) in ops.into_iter().enumerate() {
                    apply(&mut lc, op, i as u32);
                    lc.assert_invariants();
                }
            }

            #[test]
            fn done_is_unreachable_without_full_sequence(ops in prop::collection::vec(op_strategy(), 0..32)) {
                let mut lc = PipelineLifecycle::new();
                let mut submitted = false;
                for (i, op) in ops.into_iter().enumerate() {
                    if matches!(op, Op::SubmitOk) && lc.phase() == RunPhase::Submitting {
                        submitted = true;
                    }
                    apply(&mut lc, op, i as u32);
                    if lc.phase() == RunPhase::Done {
                        prop_assert!(submitted);
                    }
                }
            }
        }
    }
}
