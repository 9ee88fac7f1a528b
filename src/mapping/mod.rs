//! Translation of joystick samples into drone actions
//!
//! Every sample yields exactly one [`OutputAction`]. Buttons win over sticks:
//!
//! ```text
//! JoySample ──► takeoff pressed? ──yes──► Takeoff
//!                    │no
//!                    ▼
//!               land pressed? ──yes──► Land
//!                    │no
//!                    ▼
//!               Velocity(throttle, strafe, vertical, yaw)
//! ```
//!
//! The translator keeps no state between samples; the only configuration is
//! the [`InputBinding`] fixed when the node is built.

pub mod binding;
pub mod error;
pub mod translator;

pub use binding::{AxisRole, ButtonRole, InputBinding};
pub use error::MappingError;
pub use translator::translate;

use crate::msgs::{ActionCommand, ActionRequest, Twist, Vector3};

/// Four velocity channels read straight from the bound axes
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VelocitySetpoint {
    pub longitudinal: f32,
    pub lateral: f32,
    pub vertical: f32,
    pub rotational: f32,
}

impl From<VelocitySetpoint> for Twist {
    fn from(setpoint: VelocitySetpoint) -> Self {
        Twist {
            linear: Vector3 {
                x: f64::from(setpoint.longitudinal),
                y: f64::from(setpoint.lateral),
                z: f64::from(setpoint.vertical),
            },
            angular: Vector3 {
                x: 0.0,
                y: 0.0,
                z: f64::from(setpoint.rotational),
            },
        }
    }
}

/// The single result of translating one sample
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutputAction {
    Takeoff,
    Land,
    Velocity(VelocitySetpoint),
}

impl OutputAction {
    /// Discrete actions go to the action service, velocities do not.
    pub fn command(&self) -> Option<ActionCommand> {
        match self {
            OutputAction::Takeoff => Some(ActionCommand::Takeoff),
            OutputAction::Land => Some(ActionCommand::Land),
            OutputAction::Velocity(_) => None,
        }
    }

    pub fn request(&self) -> Option<ActionRequest> {
        self.command().map(ActionRequest::from)
    }
}
