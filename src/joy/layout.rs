//! Xbox joy layout
//!
//! Axes: left stick left/right and forward/back, left trigger, right stick
//! left/right and forward/back, right trigger, dpad left/right and up/down.
//! Sticks and dpad read +1 towards left and forward. Triggers rest at +1 and
//! reach -1 fully pulled.
//!
//! Buttons: A, B, X, Y, LB, RB, view, menu, logo, left stick, right stick.

use crate::mapping::binding::xbox;
use crate::msgs::JoySample;
use gilrs::{Axis, Button};

/// Where a gilrs input lands in the joy layout
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Slot {
    Button(usize),
    /// Digital dpad press driving one of the dpad axes
    DPad { axis: usize, direction: f32 },
    /// Analog trigger reported as a button value in `0.0..=1.0`
    Trigger(usize),
}

pub fn map_button(button: Button) -> Option<Slot> {
    let slot = match button {
        Button::South => Slot::Button(xbox::BUTTON_A),
        Button::East => Slot::Button(xbox::BUTTON_B),
        Button::West => Slot::Button(xbox::BUTTON_X),
        Button::North => Slot::Button(xbox::BUTTON_Y),
        Button::LeftTrigger => Slot::Button(xbox::BUTTON_LEFT_BUMPER),
        Button::RightTrigger => Slot::Button(xbox::BUTTON_RIGHT_BUMPER),
        Button::Select => Slot::Button(xbox::BUTTON_VIEW),
        Button::Start => Slot::Button(xbox::BUTTON_MENU),
        Button::Mode => Slot::Button(xbox::BUTTON_LOGO),
        Button::LeftThumb => Slot::Button(xbox::BUTTON_LEFT_STICK),
        Button::RightThumb => Slot::Button(xbox::BUTTON_RIGHT_STICK),
        Button::LeftTrigger2 => Slot::Trigger(xbox::AXIS_LEFT_TRIGGER),
        Button::RightTrigger2 => Slot::Trigger(xbox::AXIS_RIGHT_TRIGGER),
        Button::DPadLeft => Slot::DPad {
            axis: xbox::AXIS_DPAD_LR,
            direction: 1.0,
        },
        Button::DPadRight => Slot::DPad {
            axis: xbox::AXIS_DPAD_LR,
            direction: -1.0,
        },
        Button::DPadUp => Slot::DPad {
            axis: xbox::AXIS_DPAD_FB,
            direction: 1.0,
        },
        Button::DPadDown => Slot::DPad {
            axis: xbox::AXIS_DPAD_FB,
            direction: -1.0,
        },
        _ => return None,
    };
    Some(slot)
}

/// Axis slot and the factor turning gilrs orientation (right and up
/// positive) into joy orientation
pub fn map_axis(axis: Axis) -> Option<(usize, f32)> {
    match axis {
        Axis::LeftStickX => Some((xbox::AXIS_LEFT_LR, -1.0)),
        Axis::LeftStickY => Some((xbox::AXIS_LEFT_FB, 1.0)),
        Axis::RightStickX => Some((xbox::AXIS_RIGHT_LR, -1.0)),
        Axis::RightStickY => Some((xbox::AXIS_RIGHT_FB, 1.0)),
        Axis::DPadX => Some((xbox::AXIS_DPAD_LR, -1.0)),
        Axis::DPadY => Some((xbox::AXIS_DPAD_FB, 1.0)),
        _ => None,
    }
}

pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        // Rescale the value to the range outside the deadzone
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

fn trigger_axis(pull: f32) -> f32 {
    1.0 - 2.0 * pull.clamp(0.0, 1.0)
}

/// Current controller state in joy layout
#[derive(Clone, Debug, PartialEq)]
pub struct JoyState {
    axes: [f32; xbox::AXIS_COUNT],
    buttons: [i32; xbox::BUTTON_COUNT],
}

impl Default for JoyState {
    fn default() -> Self {
        Self::neutral()
    }
}

impl JoyState {
    /// Sticks centered, triggers released, nothing pressed
    pub fn neutral() -> Self {
        let mut axes = [0.0; xbox::AXIS_COUNT];
        axes[xbox::AXIS_LEFT_TRIGGER] = 1.0;
        axes[xbox::AXIS_RIGHT_TRIGGER] = 1.0;
        Self {
            axes,
            buttons: [0; xbox::BUTTON_COUNT],
        }
    }

    pub fn reset(&mut self) -> bool {
        let neutral = Self::neutral();
        let changed = *self != neutral;
        *self = neutral;
        changed
    }

    pub fn axes(&self) -> &[f32] {
        &self.axes
    }

    pub fn buttons(&self) -> &[i32] {
        &self.buttons
    }

    fn set_axis(&mut self, index: usize, value: f32) -> bool {
        let changed = self.axes[index] != value;
        self.axes[index] = value;
        changed
    }

    /// Returns whether the state changed.
    pub fn apply_axis(&mut self, axis: Axis, value: f32, deadzone: f32) -> bool {
        match map_axis(axis) {
            Some((index, factor)) => self.set_axis(index, factor * apply_deadzone(value, deadzone)),
            None => false,
        }
    }

    /// Returns whether the state changed.
    pub fn apply_button(&mut self, button: Button, pressed: bool) -> bool {
        match map_button(button) {
            Some(Slot::Button(index)) => {
                let value = i32::from(pressed);
                let changed = self.buttons[index] != value;
                self.buttons[index] = value;
                changed
            }
            Some(Slot::DPad { axis, direction }) => {
                if pressed {
                    self.set_axis(axis, direction)
                } else if self.axes[axis] == direction {
                    self.set_axis(axis, 0.0)
                } else {
                    false
                }
            }
            Some(Slot::Trigger(axis)) => {
                self.set_axis(axis, trigger_axis(if pressed { 1.0 } else { 0.0 }))
            }
            None => false,
        }
    }

    /// Analog update of a button, as reported for triggers. Returns whether
    /// the state changed.
    pub fn apply_button_value(&mut self, button: Button, value: f32, deadzone: f32) -> bool {
        match map_button(button) {
            Some(Slot::Trigger(axis)) => {
                self.set_axis(axis, trigger_axis(apply_deadzone(value, deadzone)))
            }
            _ => false,
        }
    }

    pub fn to_sample(&self) -> JoySample {
        JoySample::new(self.axes.to_vec(), self.buttons.to_vec())
    }
}
