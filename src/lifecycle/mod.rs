//! Lifecycle-managed joystick node
//!
//! The node owns three resources (joy subscription, velocity publisher and
//! action client) and a four-state lifecycle that decides when they exist and
//! when they may act on the drone:
//!
//! ```text
//!                configure              activate
//! Unconfigured ───────────► Inactive ───────────► Active
//!      ▲                     │    ▲                 │
//!      └─────── cleanup ─────┘    └── deactivate ───┘
//!
//!   shutdown: any state ──► Finalized (terminal)
//! ```
//!
//! Configure acquires, activate enables. Splitting the two lets the host
//! check the wiring (for example that the action service is reachable) before
//! anything can reach the vehicle.
//!
//! - [`node`] - typestate machine over the node's resources
//! - [`controller`] - runtime-checked wrapper exposing the five transitions
//! - [`handle`] - worker task serializing transitions and sample handling
//! - [`params`] - node parameters read at configure time

pub mod controller;
pub mod handle;
pub mod node;
pub mod params;

pub use controller::LifecycleController;
pub use handle::{NodeCommand, NodeHandle};
pub use params::{ParameterDescriptor, ParameterError, ParameterStore};

use crate::mapping::MappingError;
use crate::transport::{self, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Unconfigured,
    Inactive,
    Active,
    Finalized,
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unconfigured => write!(f, "unconfigured"),
            LifecycleState::Inactive => write!(f, "inactive"),
            LifecycleState::Active => write!(f, "active"),
            LifecycleState::Finalized => write!(f, "finalized"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    Configure,
    Activate,
    Deactivate,
    Cleanup,
    Shutdown,
}

impl Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Configure => write!(f, "configure"),
            Transition::Activate => write!(f, "activate"),
            Transition::Deactivate => write!(f, "deactivate"),
            Transition::Cleanup => write!(f, "cleanup"),
            Transition::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The transition is not allowed from the current state; nothing changed
    #[error("Cannot {transition} while {state}")]
    InvalidTransition {
        transition: Transition,
        state: LifecycleState,
    },

    /// A joy sample arrived outside the active state and was ignored
    #[error("Joy sample rejected, node is {0}")]
    NotActive(LifecycleState),

    #[error("Invalid drone name '{name}': {reason}")]
    InvalidIdentity { name: String, reason: String },

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Node resources missing while {0}")]
    MissingResources(LifecycleState),

    #[error("Node task is no longer running")]
    TaskGone,
}

/// Static wiring of the node, fixed at construction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub node_name: String,
    /// Initial value of the `drone_name` parameter
    pub drone_name: String,
    pub joy_topic: String,
    pub action_service: String,
    /// Joy samples queued before newer ones are dropped
    pub queue_depth: usize,
    /// How long the host waits for the action service before activating
    pub service_timeout_ms: u64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            node_name: "tello_joy".to_string(),
            drone_name: params::DEFAULT_DRONE_NAME.to_string(),
            joy_topic: "joy".to_string(),
            action_service: "tello_action".to_string(),
            queue_depth: 1,
            service_timeout_ms: 5000,
        }
    }
}

pub fn cmd_vel_topic(drone_name: &str) -> String {
    format!("/{}/cmd_vel", drone_name)
}

/// A drone name has to form a single valid topic token.
pub fn validate_drone_name(name: &str) -> Result<(), NodeError> {
    let invalid = |reason: &str| NodeError::InvalidIdentity {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.contains('/') {
        return Err(invalid("must be a single name without '/'"));
    }
    transport::validate_topic(&cmd_vel_topic(name)).map_err(|_| {
        invalid("only letters, digits and underscores are allowed, and no leading digit")
    })
}
