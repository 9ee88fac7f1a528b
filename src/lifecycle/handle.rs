//! Worker task around the lifecycle controller
//!
//! One task owns the [`LifecycleController`] and serves lifecycle commands
//! and joy samples one at a time. Commands are polled first, so a pending
//! transition is never starved by a busy joystick, and no sample is ever
//! handled halfway through a transition.

use super::{LifecycleController, LifecycleState, NodeError, Transition};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMMAND_CAPACITY: usize = 32;
const SERVICE_POLL_INTERVAL: Duration = Duration::from_millis(100);

macro_rules! respond {
    ($result:expr, $response_tx:expr) => {
        if $response_tx.send($result).is_err() {
            debug!("Caller dropped before the response was sent");
        }
    };
}

#[derive(Debug)]
pub enum NodeCommand {
    Transition {
        transition: Transition,
        response_tx: oneshot::Sender<Result<LifecycleState, NodeError>>,
    },
    ServiceReady {
        response_tx: oneshot::Sender<bool>,
    },
}

/// Host-side handle of a running node
///
/// Dropping the handle closes the command channel; the worker then shuts the
/// node down (releasing every transport handle) and exits.
#[derive(Debug)]
pub struct NodeHandle {
    name: String,
    command_tx: mpsc::Sender<NodeCommand>,
    state_rx: watch::Receiver<LifecycleState>,
    task_handle: JoinHandle<()>,
}

impl NodeHandle {
    /// Moves the controller into its own task. Must be called from within a
    /// tokio runtime.
    pub fn spawn(controller: LifecycleController) -> Self {
        let name = controller.settings().node_name.clone();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(controller.state());

        let task_name = name.clone();
        let task_handle = tokio::spawn(async move {
            info!("Node task started: {}", task_name);
            run_node_loop(controller, command_rx, state_tx).await;
            info!("Node task stopped: {}", task_name);
        });

        Self {
            name,
            command_tx,
            state_rx,
            task_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// State after the last completed transition
    pub fn state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_rx.clone()
    }

    pub async fn transition(&self, transition: Transition) -> Result<LifecycleState, NodeError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(NodeCommand::Transition {
                transition,
                response_tx,
            })
            .await
            .map_err(|_| NodeError::TaskGone)?;
        response_rx.await.map_err(|_| NodeError::TaskGone)?
    }

    pub async fn configure(&self) -> Result<LifecycleState, NodeError> {
        self.transition(Transition::Configure).await
    }

    pub async fn activate(&self) -> Result<LifecycleState, NodeError> {
        self.transition(Transition::Activate).await
    }

    pub async fn deactivate(&self) -> Result<LifecycleState, NodeError> {
        self.transition(Transition::Deactivate).await
    }

    pub async fn cleanup(&self) -> Result<LifecycleState, NodeError> {
        self.transition(Transition::Cleanup).await
    }

    pub async fn shutdown(&self) -> Result<LifecycleState, NodeError> {
        match self.transition(Transition::Shutdown).await {
            Err(NodeError::TaskGone) if self.state() == LifecycleState::Finalized => {
                Ok(LifecycleState::Finalized)
            }
            other => other,
        }
    }

    pub async fn service_ready(&self) -> Result<bool, NodeError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(NodeCommand::ServiceReady { response_tx })
            .await
            .map_err(|_| NodeError::TaskGone)?;
        response_rx.await.map_err(|_| NodeError::TaskGone)
    }

    /// Polls the action service until it reports ready. Returns `Ok(false)`
    /// if it did not within `timeout`.
    pub async fn wait_for_service(&self, timeout: Duration) -> Result<bool, NodeError> {
        let poll = async {
            loop {
                if self.service_ready().await? {
                    return Ok::<bool, NodeError>(true);
                }
                tokio::time::sleep(SERVICE_POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Action service not ready after {:?}", timeout);
                Ok(false)
            }
        }
    }

    /// Closes the command channel and waits for the worker to finish.
    pub async fn join(self) {
        let Self {
            name,
            command_tx,
            task_handle,
            ..
        } = self;
        drop(command_tx);

        if let Err(e) = task_handle.await {
            error!("Node task panicked: {} - {}", name, e);
        }
    }
}

async fn run_node_loop(
    mut controller: LifecycleController,
    mut command_rx: mpsc::Receiver<NodeCommand>,
    state_tx: watch::Sender<LifecycleState>,
) {
    loop {
        tokio::select! {
            biased;

            command = command_rx.recv() => match command {
                Some(NodeCommand::Transition { transition, response_tx }) => {
                    debug!("Transition requested: {}", transition);
                    let result = controller.transition(transition);
                    state_tx.send_replace(controller.state());
                    respond!(result, response_tx);
                }
                Some(NodeCommand::ServiceReady { response_tx }) => {
                    respond!(controller.service_ready(), response_tx);
                }
                None => {
                    if controller.state() != LifecycleState::Finalized {
                        info!("Command channel closed, shutting node down");
                        state_tx.send_replace(controller.shutdown());
                    }
                    break;
                }
            },

            sample = controller.next_sample() => match controller.on_joy(&sample) {
                Ok(action) => debug!("Handled joy sample: {:?}", action),
                Err(NodeError::NotActive(state)) => {
                    debug!("Joy sample ignored while {}", state);
                }
                Err(e) => warn!("Failed to handle joy sample: {}", e),
            },
        }
    }
}
