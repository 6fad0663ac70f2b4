//! Worker loop
//!
//! Single-threaded command processing: commands are handled strictly in
//! arrival order, and the poller is ticked between batches. That ordering
//! is what makes completion notifications causally consistent with the
//! lifecycle snapshots the frontend sees.

use crate::client::lifecycle::{PipelineLifecycle, RunPhase};
use crate::client::poller::StatusPoller;
use crate::client::service::AutomlService;
use crate::client::{ClientCommand, ClientMessage};
use crate::config::ClientConfig;
use crate::error::AutomlError;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const IDLE_SLEEP: Duration = Duration::from_millis(10);

pub struct ClientWorker {
    config: ClientConfig,
    service: Box<dyn AutomlService>,
    command_rx: Receiver<ClientCommand>,
    message_tx: Sender<ClientMessage>,
    lifecycle: PipelineLifecycle,
    poller: Option<StatusPoller>,
    running: bool,
}

impl ClientWorker {
    pub fn new(
        config: ClientConfig,
        service: Box<dyn AutomlService>,
        command_rx: Receiver<ClientCommand>,
        message_tx: Sender<ClientMessage>,
    ) -> Self {
        Self {
            config,
            service,
            command_rx,
            message_tx,
            lifecycle: PipelineLifecycle::new(),
            poller: None,
            running: true,
        }
    }

    /// Process commands and poll until shutdown
    pub fn run(mut self) {
        info!("Client worker started");
        while self.running {
            self.process_commands();
            self.tick_poller(Instant::now());
            std::thread::sleep(IDLE_SLEEP);
        }
        info!("Client worker stopped");
    }

    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Command channel disconnected, shutting down");
                    self.running = false;
                    break;
                }
            }
        }
    }

    fn send(&self, message: ClientMessage) {
        if let Err(e) = self.message_tx.try_send(message) {
            warn!("Dropping client message, channel full or closed: {}", e);
        }
    }

    fn send_snapshot(&self) {
        self.send(ClientMessage::Lifecycle(self.lifecycle.snapshot()));
    }

    fn send_error(&self, error: &AutomlError) {
        self.send(ClientMessage::Error(error.to_string()));
    }

    pub(crate) fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::StartUpload { bytes, filename } => self.do_upload(&bytes, &filename),
            ClientCommand::FetchMetadata => self.do_fetch_metadata(),
            ClientCommand::Submit { config } => self.do_submit(config),
            ClientCommand::FetchReport => self.do_fetch_report(),
            ClientCommand::ApplyModel {
                report_id,
                examples,
            } => match self.service.apply_model(&report_id, &examples) {
                Ok(predictions) => self.send(ClientMessage::Predictions(predictions)),
                Err(e) => {
                    warn!("Model application for {} failed: {}", report_id, e);
                    self.send_error(&e);
                }
            },
            ClientCommand::ListDatasets => match self.service.list_datasets() {
                Ok(datasets) => self.send(ClientMessage::Datasets(datasets)),
                Err(e) => self.send_error(&e),
            },
            ClientCommand::ListRuns => match self.service.list_runs() {
                Ok(runs) => self.send(ClientMessage::Runs(runs)),
                Err(e) => self.send_error(&e),
            },
            ClientCommand::Cancel => self.do_cancel(),
            ClientCommand::Retry => self.do_retry(),
            ClientCommand::Shutdown => {
                self.running = false;
                self.send(ClientMessage::Shutdown);
            }
        }
    }

    fn do_upload(&mut self, bytes: &[u8], filename: &str) {
        if let Err(e) = self.lifecycle.begin_upload() {
            self.send_error(&e);
            return;
        }
        self.send_snapshot();

        match self.service.upload_dataset(bytes, filename) {
            Ok(receipt) => {
                info!("Uploaded {} as {}", filename, receipt.dataset_id);
                if let Err(e) = self.lifecycle.upload_succeeded(receipt) {
                    self.send_error(&e);
                    return;
                }
                self.send_snapshot();
                // Fetch columns for the new dataset; failure is non-fatal
                self.do_fetch_metadata();
            }
            Err(e) => {
                warn!("Upload failed: {}", e);
                if self.lifecycle.upload_failed(&e).is_ok() {
                    self.send_snapshot();
                }
                self.send_error(&e);
            }
        }
    }

    fn do_fetch_metadata(&mut self) {
        let Some(dataset_id) = self.lifecycle.dataset_id().cloned() else {
            self.send_error(&AutomlError::Validation(
                "no dataset to fetch metadata for".to_string(),
            ));
            return;
        };
        match self.service.dataset_metadata(&dataset_id) {
            Ok(metadata) => {
                if self.lifecycle.set_metadata(metadata.clone()).is_ok() {
                    self.send(ClientMessage::Metadata(metadata));
                }
            }
            Err(e) => {
                warn!("Metadata fetch failed for {}: {}", dataset_id, e);
                self.send_error(&e);
            }
        }
    }

    fn do_submit(&mut self, config: crate::types::PipelineConfig) {
        // Validation happens here, before any request is made
        if let Err(e) = self.lifecycle.begin_submit(config) {
            self.send_error(&e);
            return;
        }
        self.send_snapshot();

        let dataset_id = match self.lifecycle.dataset_id().cloned() {
            Some(id) => id,
            None => return,
        };
        let frozen = match self.lifecycle.frozen_config().cloned() {
            Some(config) => config,
            None => return,
        };

        match self.service.submit_pipeline(&dataset_id, &frozen) {
            Ok(receipt) => {
                info!(
                    "Submitted pipeline, task {} report {}",
                    receipt.task_id, receipt.report_id
                );
                let task_id = receipt.task_id.clone();
                if let Err(e) = self.lifecycle.submit_succeeded(receipt) {
                    self.send_error(&e);
                    return;
                }
                // Replace any previous poller; one poller per run
                self.poller = Some(StatusPoller::new(
                    task_id,
                    Duration::from_secs(self.config.polling.interval_secs),
                    self.config.polling.transport_retry_budget,
                ));
                self.send_snapshot();
            }
            Err(e) => {
                warn!("Submission failed: {}", e);
                if self.lifecycle.submit_failed(&e).is_ok() {
                    self.send_snapshot();
                }
                self.send_error(&e);
            }
        }
    }

    fn do_fetch_report(&mut self) {
        let Some(report_id) = self.lifecycle.report_id().cloned() else {
            self.send_error(&AutomlError::Validation(
                "no report to fetch".to_string(),
            ));
            return;
        };
        match self.service.fetch_report(&report_id) {
            Ok(report) => self.send(ClientMessage::Report(report)),
            Err(e) if e.is_not_ready() => {
                debug!("Report {} not ready yet", report_id);
                self.send(ClientMessage::ReportPending { report_id });
            }
            Err(e) => self.send_error(&e),
        }
    }

    fn do_cancel(&mut self) {
        // Stop polling before the phase changes so no status-derived
        // transition can race the cancellation
        if let Some(poller) = self.poller.as_mut() {
            poller.stop();
        }
        self.poller = None;
        match self.lifecycle.cancel() {
            Ok(()) => {
                info!("Run cancelled");
                self.send_snapshot();
            }
            Err(e) => self.send_error(&e),
        }
    }

    fn do_retry(&mut self) {
        if let Some(poller) = self.poller.as_mut() {
            poller.stop();
        }
        self.poller = None;
        match self.lifecycle.retry() {
            Ok(()) => {
                info!("Run reset for retry");
                self.send_snapshot();
            }
            Err(e) => self.send_error(&e),
        }
    }

    pub(crate) fn tick_poller(&mut self, now: Instant) {
        let task_id = match &self.poller {
            Some(poller) if poller.is_due(now) => poller.task_id().clone(),
            _ => return,
        };

        match self.service.task_status(&task_id) {
            Ok(status) => {
                if let Some(poller) = self.poller.as_mut() {
                    poller.record_success(now);
                }
                debug!("Task {} status: {}", task_id, status);
                match self.lifecycle.status_observed(status) {
                    Ok(RunPhase::Polling) => self.send_snapshot(),
                    Ok(phase) => {
                        info!("Task {} reached terminal phase {}", task_id, phase);
                        if let Some(mut poller) = self.poller.take() {
                            poller.stop();
                        }
                        self.send_snapshot();
                    }
                    Err(e) => self.send_error(&e),
                }
            }
            Err(e) => {
                warn!("Status check for {} failed: {}", task_id, e);
                let exhausted = self.poller.as_mut().and_then(|p| p.record_error(now));
                if let Some(attempts) = exhausted {
                    self.poller = None;
                    if self.lifecycle.polling_abandoned(attempts).is_ok() {
                        self.send_snapshot();
                    }
                    self.send_error(&AutomlError::PollingAbandoned { attempts });
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn lifecycle(&self) -> &PipelineLifecycle {
        &self.lifecycle
    }

    #[cfg(test)]
    pub(crate) fn has_poller(&self) -> bool {
        self.poller.is_some()
    }
}
