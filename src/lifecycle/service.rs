// DM Bridge - Service Lifecycle
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Host-process lifecycle around the dispatch server.
//!
//! The control task owns the lifecycle state and reacts to supervisor
//! requests. The worker task owns the [`DispatchServer`]. They talk over
//! channels only.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::status::{LifecycleState, ServiceStatus, StatusReporter};
use crate::context::BridgeContext;
use crate::error::{BridgeError, BridgeResult};
use crate::server::DispatchServer;

/// Requests from the supervisor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Stop,
    Shutdown,
    /// Report the current status again.
    Interrogate,
}

#[derive(Debug)]
enum WorkerEvent {
    Listening,
    SetupFailed(BridgeError),
}

#[derive(Debug)]
enum WorkerCommand {
    Stop(oneshot::Sender<BridgeResult<()>>),
}

/// Current state plus the reporter that hears about every change.
struct StatusTracker {
    status: ServiceStatus,
    next_checkpoint: u32,
    reporter: Arc<dyn StatusReporter>,
}

impl StatusTracker {
    fn new(reporter: Arc<dyn StatusReporter>) -> Self {
        Self {
            status: ServiceStatus {
                state: LifecycleState::StartPending,
                checkpoint: 0,
                exit_code: 0,
            },
            next_checkpoint: 1,
            reporter,
        }
    }

    fn transition(&mut self, state: LifecycleState) {
        self.status.state = state;
        self.status.checkpoint = if state.is_pending() {
            let checkpoint = self.next_checkpoint;
            self.next_checkpoint += 1;
            checkpoint
        } else {
            0
        };
        self.report();
    }

    fn report(&self) {
        self.reporter.report(&self.status);
    }
}

/// What the worker drives: opened once, closed on request.
trait ServiceEndpoint: Send + 'static {
    fn open(&mut self) -> BridgeResult<()>;
    fn close(&mut self) -> impl Future<Output = BridgeResult<()>> + Send;
}

impl ServiceEndpoint for DispatchServer {
    fn open(&mut self) -> BridgeResult<()> {
        self.setup()?;
        self.listen()
    }

    fn close(&mut self) -> impl Future<Output = BridgeResult<()>> + Send {
        self.stop()
    }
}

pub struct BridgeService {
    ctx: Arc<BridgeContext>,
    reporter: Arc<dyn StatusReporter>,
}

impl BridgeService {
    pub fn new(ctx: Arc<BridgeContext>, reporter: Arc<dyn StatusReporter>) -> Self {
        Self { ctx, reporter }
    }

    /// Run until stopped and return the final status.
    ///
    /// A closed `control` channel counts as a stop request.
    pub async fn run(self, control: mpsc::Receiver<ControlRequest>) -> ServiceStatus {
        run_with(DispatchServer::new(self.ctx), self.reporter, control).await
    }
}

async fn run_with<E: ServiceEndpoint>(
    endpoint: E,
    reporter: Arc<dyn StatusReporter>,
    mut control: mpsc::Receiver<ControlRequest>,
) -> ServiceStatus {
    let mut tracker = StatusTracker::new(reporter);
    tracker.transition(LifecycleState::StartPending);

    let (event_tx, mut events) = mpsc::channel(4);
    let (command_tx, command_rx) = mpsc::channel(1);
    let worker = tokio::spawn(run_worker(endpoint, event_tx, command_rx));
    tracker.transition(LifecycleState::Running);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(WorkerEvent::Listening) => info!("Bridge service is listening"),
                Some(WorkerEvent::SetupFailed(e)) => {
                    error!(target: "eventlog", "Service failed to start: {}", e);
                    tracker.status.exit_code = e.status();
                    tracker.transition(LifecycleState::Stopped);
                    break;
                }
                None => {
                    error!(target: "eventlog", "Service worker exited unexpectedly");
                    tracker.transition(LifecycleState::Stopped);
                    break;
                }
            },
            request = control.recv() => match request {
                Some(ControlRequest::Interrogate) => {
                    debug!("Service interrogate received");
                    tracker.report();
                }
                Some(ControlRequest::Shutdown) => {
                    info!("Service shutdown received");
                    stop_worker(&mut tracker, &command_tx).await;
                    break;
                }
                Some(ControlRequest::Stop) | None => {
                    info!("Service stop received");
                    stop_worker(&mut tracker, &command_tx).await;
                    break;
                }
            },
        }
    }

    drop(command_tx);
    if let Err(e) = worker.await {
        warn!("Service worker did not finish cleanly: {}", e);
    }
    tracker.status
}

/// StopPending, ask the worker to stop, then Stopped whatever the outcome.
async fn stop_worker(tracker: &mut StatusTracker, commands: &mpsc::Sender<WorkerCommand>) {
    tracker.transition(LifecycleState::StopPending);

    let (reply_tx, reply_rx) = oneshot::channel();
    if commands.send(WorkerCommand::Stop(reply_tx)).await.is_err() {
        warn!("Service worker already exited");
    } else {
        match reply_rx.await {
            Ok(Ok(())) => info!("Service stopped"),
            Ok(Err(e)) => error!(target: "eventlog", "Service failed to stop: {}", e),
            Err(_) => error!(target: "eventlog", "Service worker exited while stopping"),
        }
    }

    tracker.transition(LifecycleState::Stopped);
}

async fn run_worker<E: ServiceEndpoint>(
    mut endpoint: E,
    events: mpsc::Sender<WorkerEvent>,
    mut commands: mpsc::Receiver<WorkerCommand>,
) {
    if let Err(e) = endpoint.open() {
        let _ = events.send(WorkerEvent::SetupFailed(e)).await;
        return;
    }
    let _ = events.send(WorkerEvent::Listening).await;

    if let Some(WorkerCommand::Stop(reply)) = commands.recv().await {
        let _ = reply.send(endpoint.close().await);
    }
    debug!("Service worker exiting");
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::config::BridgeConfig;
    use crate::context::testing::FakePlatform;
    use crate::lifecycle::status::testing::RecordingReporter;

    async fn wait_for_socket(path: &Path) {
        for _ in 0..200 {
            if path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("socket {} never appeared", path.display());
    }

    // `_fakes` owns the socket directory and must outlive the run.
    struct Harness {
        _fakes: FakePlatform,
        service: BridgeService,
        ctx: Arc<BridgeContext>,
        reporter: Arc<RecordingReporter>,
    }

    fn service(config: Option<BridgeConfig>) -> Harness {
        let fakes = FakePlatform::default();
        let ctx = Arc::new(fakes.context(config));
        let reporter = Arc::new(RecordingReporter::default());
        Harness {
            service: BridgeService::new(ctx.clone(), reporter.clone()),
            _fakes: fakes,
            ctx,
            reporter,
        }
    }

    /// Opens fine, then fails to close.
    struct StuckEndpoint;

    impl ServiceEndpoint for StuckEndpoint {
        fn open(&mut self) -> BridgeResult<()> {
            Ok(())
        }

        async fn close(&mut self) -> BridgeResult<()> {
            Err(BridgeError::Listen("accept loop failed".into()))
        }
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let Harness { _fakes, service, ctx, reporter } = service(Some(BridgeConfig::default()));
        let (control, rx) = mpsc::channel(4);
        let run = tokio::spawn(service.run(rx));

        wait_for_socket(&ctx.endpoint.socket_path).await;
        control.send(ControlRequest::Stop).await.unwrap();
        let status = run.await.unwrap();

        assert_eq!(status.state, LifecycleState::Stopped);
        assert_eq!(status.exit_code, 0);
        assert_eq!(
            reporter.states(),
            vec![
                LifecycleState::StartPending,
                LifecycleState::Running,
                LifecycleState::StopPending,
                LifecycleState::Stopped,
            ]
        );
        let checkpoints: Vec<u32> = reporter.reports().iter().map(|s| s.checkpoint).collect();
        assert_eq!(checkpoints, vec![1, 0, 2, 0]);
        assert!(!ctx.endpoint.socket_path.exists());
    }

    #[tokio::test]
    async fn test_setup_failure_goes_straight_to_stopped() {
        let Harness { _fakes, service, ctx, reporter } = service(None);
        let (_control, rx) = mpsc::channel(4);

        let status = service.run(rx).await;

        assert_eq!(status.state, LifecycleState::Stopped);
        assert_eq!(status.exit_code, BridgeError::NotConfigured.status());
        assert_eq!(
            reporter.states(),
            vec![
                LifecycleState::StartPending,
                LifecycleState::Running,
                LifecycleState::Stopped,
            ]
        );
        assert!(!ctx.endpoint.socket_path.exists());
    }

    #[tokio::test]
    async fn test_interrogate_reports_again() {
        let Harness { _fakes, service, ctx, reporter } = service(Some(BridgeConfig::default()));
        let (control, rx) = mpsc::channel(4);
        let run = tokio::spawn(service.run(rx));

        wait_for_socket(&ctx.endpoint.socket_path).await;
        control.send(ControlRequest::Interrogate).await.unwrap();
        control.send(ControlRequest::Shutdown).await.unwrap();
        run.await.unwrap();

        assert_eq!(
            reporter.states(),
            vec![
                LifecycleState::StartPending,
                LifecycleState::Running,
                LifecycleState::Running,
                LifecycleState::StopPending,
                LifecycleState::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn test_closed_control_channel_stops() {
        let Harness { _fakes, service, ctx, reporter: _ } = service(Some(BridgeConfig::default()));
        let (control, rx) = mpsc::channel(1);
        let run = tokio::spawn(service.run(rx));

        wait_for_socket(&ctx.endpoint.socket_path).await;
        drop(control);
        assert_eq!(run.await.unwrap().state, LifecycleState::Stopped);
        assert!(!ctx.endpoint.socket_path.exists());
    }

    #[tokio::test]
    async fn test_failed_stop_still_reaches_stopped() {
        let reporter = Arc::new(RecordingReporter::default());
        let (control, rx) = mpsc::channel(4);
        control.send(ControlRequest::Stop).await.unwrap();

        let status = run_with(StuckEndpoint, reporter.clone(), rx).await;

        assert_eq!(status.state, LifecycleState::Stopped);
        assert_eq!(
            reporter.states(),
            vec![
                LifecycleState::StartPending,
                LifecycleState::Running,
                LifecycleState::StopPending,
                LifecycleState::Stopped,
            ]
        );
    }
}
