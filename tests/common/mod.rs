//! Shared helpers for integration tests

use automl_client::{
    AutomlClient, ClientConfig, ClientMessage, MockServiceBackend, PipelineConfig, RunPhase,
    SessionHandle,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn a worker thread over the given mock backend
///
/// Polling interval is zero so scripted statuses are consumed as fast as
/// the worker loop runs.
pub fn spawn_client(mock: MockServiceBackend) -> (SessionHandle, JoinHandle<()>) {
    let mut config = ClientConfig::default();
    config.polling.interval_secs = 0;
    config.polling.transport_retry_budget = 3;
    let (client, session) = AutomlClient::with_service(config, Box::new(mock));
    let worker = std::thread::spawn(move || client.run());
    (session, worker)
}

/// A submittable configuration matching the mock's default columns
pub fn valid_config() -> PipelineConfig {
    PipelineConfig {
        target_column: "target".to_string(),
        ..Default::default()
    }
}

/// Collect messages until one matches the predicate
///
/// Returns everything received up to and including the match; panics if
/// the timeout expires first.
pub fn wait_for(
    session: &SessionHandle,
    predicate: impl Fn(&ClientMessage) -> bool,
) -> Vec<ClientMessage> {
    let deadline = Instant::now() + TEST_TIMEOUT;
    let mut received = Vec::new();
    while Instant::now() < deadline {
        for message in session.drain() {
            let matched = predicate(&message);
            received.push(message);
            if matched {
                return received;
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!(
        "timed out waiting for message; received so far: {:?}",
        received
    );
}

/// Wait until a lifecycle snapshot reaches the given phase
pub fn wait_for_phase(session: &SessionHandle, phase: RunPhase) -> Vec<ClientMessage> {
    wait_for(session, |m| {
        matches!(m, ClientMessage::Lifecycle(s) if s.phase == phase)
    })
}
