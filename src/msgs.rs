//! Message types exchanged with the outside world
//!
//! Shapes follow the usual robotics conventions: a joystick sample carries raw
//! axis and button arrays, velocity commands are a 6-DoF twist and the drone's
//! command executor accepts a single command string.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One snapshot of controller state as delivered by a joystick driver
///
/// Axis values are normalized to `-1.0..=1.0`; a button counts as pressed when
/// its entry is non-zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoySample {
    #[serde(default = "Local::now")]
    pub stamp: DateTime<Local>,
    #[serde(default)]
    pub axes: Vec<f32>,
    #[serde(default)]
    pub buttons: Vec<i32>,
}

impl JoySample {
    pub fn new(axes: Vec<f32>, buttons: Vec<i32>) -> Self {
        Self {
            stamp: Local::now(),
            axes,
            buttons,
        }
    }

    /// Buttons outside the reported range count as released.
    pub fn is_pressed(&self, index: usize) -> bool {
        self.buttons.get(index).is_some_and(|state| *state != 0)
    }

    pub fn axis(&self, index: usize) -> Option<f32> {
        self.axes.get(index).copied()
    }
}

impl Default for JoySample {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Velocity in free space broken into its linear and angular parts
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

/// Commands understood by the drone's action service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCommand {
    Takeoff,
    Land,
}

impl ActionCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCommand::Takeoff => "takeoff",
            ActionCommand::Land => "land",
        }
    }
}

impl fmt::Display for ActionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload for the action service: `{"cmd": "takeoff"}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub cmd: String,
}

impl From<ActionCommand> for ActionRequest {
    fn from(command: ActionCommand) -> Self {
        Self {
            cmd: command.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_buttons_read_as_released() {
        let sample = JoySample::new(vec![0.0], vec![0, 1]);
        assert!(!sample.is_pressed(0));
        assert!(sample.is_pressed(1));
        assert!(!sample.is_pressed(7));
        assert_eq!(sample.axis(3), None);
    }

    #[test]
    fn action_request_wire_shape() {
        let request = ActionRequest::from(ActionCommand::Land);
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"cmd":"land"}"#);
    }

    #[test]
    fn sample_without_stamp_still_decodes() {
        let sample: JoySample = serde_json::from_str(r#"{"axes":[0.5],"buttons":[1]}"#).unwrap();
        assert_eq!(sample.axes, vec![0.5]);
        assert!(sample.is_pressed(0));
    }
}
