//! Physical index assignment for each semantic control role

use super::MappingError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Joy indices of the Xbox layout produced by the bundled driver
pub mod xbox {
    pub const AXIS_LEFT_LR: usize = 0;
    pub const AXIS_LEFT_FB: usize = 1;
    pub const AXIS_LEFT_TRIGGER: usize = 2;
    pub const AXIS_RIGHT_LR: usize = 3;
    pub const AXIS_RIGHT_FB: usize = 4;
    pub const AXIS_RIGHT_TRIGGER: usize = 5;
    pub const AXIS_DPAD_LR: usize = 6;
    pub const AXIS_DPAD_FB: usize = 7;
    pub const AXIS_COUNT: usize = 8;

    pub const BUTTON_A: usize = 0;
    pub const BUTTON_B: usize = 1;
    pub const BUTTON_X: usize = 2;
    pub const BUTTON_Y: usize = 3;
    pub const BUTTON_LEFT_BUMPER: usize = 4;
    pub const BUTTON_RIGHT_BUMPER: usize = 5;
    pub const BUTTON_VIEW: usize = 6;
    pub const BUTTON_MENU: usize = 7;
    pub const BUTTON_LOGO: usize = 8;
    pub const BUTTON_LEFT_STICK: usize = 9;
    pub const BUTTON_RIGHT_STICK: usize = 10;
    pub const BUTTON_COUNT: usize = 11;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AxisRole {
    Throttle,
    Strafe,
    Vertical,
    Yaw,
}

impl Display for AxisRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisRole::Throttle => write!(f, "throttle"),
            AxisRole::Strafe => write!(f, "strafe"),
            AxisRole::Vertical => write!(f, "vertical"),
            AxisRole::Yaw => write!(f, "yaw"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ButtonRole {
    Takeoff,
    Land,
}

impl Display for ButtonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonRole::Takeoff => write!(f, "takeoff"),
            ButtonRole::Land => write!(f, "land"),
        }
    }
}

/// Which joy index drives which role
///
/// Fixed for the lifetime of a node. The default matches an Xbox pad: the
/// right stick flies the drone in the horizontal plane, the left stick
/// handles climb and yaw, menu takes off and view lands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputBinding {
    pub takeoff_button: usize,
    pub land_button: usize,
    pub throttle_axis: usize,
    pub strafe_axis: usize,
    pub vertical_axis: usize,
    pub yaw_axis: usize,
}

impl Default for InputBinding {
    fn default() -> Self {
        Self {
            takeoff_button: xbox::BUTTON_MENU,
            land_button: xbox::BUTTON_VIEW,
            throttle_axis: xbox::AXIS_RIGHT_FB,
            strafe_axis: xbox::AXIS_RIGHT_LR,
            vertical_axis: xbox::AXIS_LEFT_FB,
            yaw_axis: xbox::AXIS_LEFT_LR,
        }
    }
}

impl InputBinding {
    pub fn axis(&self, role: AxisRole) -> usize {
        match role {
            AxisRole::Throttle => self.throttle_axis,
            AxisRole::Strafe => self.strafe_axis,
            AxisRole::Vertical => self.vertical_axis,
            AxisRole::Yaw => self.yaw_axis,
        }
    }

    pub fn button(&self, role: ButtonRole) -> usize {
        match role {
            ButtonRole::Takeoff => self.takeoff_button,
            ButtonRole::Land => self.land_button,
        }
    }

    /// Takeoff and land must sit on different buttons, otherwise land could
    /// never be reached.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.takeoff_button == self.land_button {
            return Err(MappingError::InvalidBinding(format!(
                "takeoff and land share button {}",
                self.takeoff_button
            )));
        }
        Ok(())
    }
}
