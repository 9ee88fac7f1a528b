//! Node parameters
//!
//! Parameters are shared between the host (which may change them at any time)
//! and the node (which reads them once per configure). Access goes through a
//! tokio `RwLock` with bounded, non-blocking retries so a stuck writer can
//! never hang a lifecycle transition.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

pub const DRONE_NAME: &str = "drone_name";
pub const DEFAULT_DRONE_NAME: &str = "drone1";

const MAX_LOCK_ATTEMPTS: usize = 5;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub default: &'static str,
}

pub const DRONE_NAME_DESCRIPTOR: ParameterDescriptor = ParameterDescriptor {
    name: DRONE_NAME,
    description: "Name of the controlled drone; velocity goes to /<drone_name>/cmd_vel",
    default: DEFAULT_DRONE_NAME,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("Parameter lock still held after {0} attempts")]
    LockTimeout(usize),
}

#[derive(Clone, Debug)]
struct NodeParameters {
    drone_name: String,
}

macro_rules! with_lock {
    (@read, $lock:expr, $operation:expr) => {{
        let mut attempts = 0;
        loop {
            match $lock.try_read() {
                Ok(guard) => break Ok($operation(&*guard)),
                Err(e) => {
                    attempts += 1;
                    tracing::warn!(
                        "Parameter read blocked: {} (attempt {}/{})",
                        e,
                        attempts,
                        MAX_LOCK_ATTEMPTS
                    );
                    if attempts >= MAX_LOCK_ATTEMPTS {
                        break Err(ParameterError::LockTimeout(attempts));
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
            }
        }
    }};

    (@write, $lock:expr, $operation:expr) => {{
        let mut attempts = 0;
        loop {
            match $lock.try_write() {
                Ok(mut guard) => break Ok($operation(&mut *guard)),
                Err(e) => {
                    attempts += 1;
                    tracing::warn!(
                        "Parameter write blocked: {} (attempt {}/{})",
                        e,
                        attempts,
                        MAX_LOCK_ATTEMPTS
                    );
                    if attempts >= MAX_LOCK_ATTEMPTS {
                        break Err(ParameterError::LockTimeout(attempts));
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
            }
        }
    }};
}

/// Shared, cloneable parameter storage for one node
#[derive(Clone, Debug)]
pub struct ParameterStore {
    params: Arc<RwLock<NodeParameters>>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new(DEFAULT_DRONE_NAME)
    }
}

impl ParameterStore {
    pub fn new(drone_name: impl Into<String>) -> Self {
        Self {
            params: Arc::new(RwLock::new(NodeParameters {
                drone_name: drone_name.into(),
            })),
        }
    }

    pub fn describe() -> Vec<ParameterDescriptor> {
        vec![DRONE_NAME_DESCRIPTOR]
    }

    pub fn drone_name(&self) -> Result<String, ParameterError> {
        with_lock!(@read, self.params, |params: &NodeParameters| params
            .drone_name
            .clone())
    }

    /// Takes effect on the next configure; a configured node keeps its name.
    pub fn set_drone_name(&self, drone_name: impl Into<String>) -> Result<(), ParameterError> {
        let drone_name = drone_name.into();
        with_lock!(@write, self.params, |params: &mut NodeParameters| {
            params.drone_name.clone_from(&drone_name);
        })
    }
}
