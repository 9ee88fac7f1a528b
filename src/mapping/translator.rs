//! Stateless sample-to-action translation

use super::{AxisRole, ButtonRole, InputBinding, MappingError, OutputAction, VelocitySetpoint};
use crate::msgs::JoySample;

/// Decides the one action a sample stands for.
///
/// Takeoff beats land, and either button beats the sticks: axis data in a
/// sample that also presses an action button is dropped. Axis values pass
/// through untouched (no deadzone, no clamping, no scaling).
pub fn translate(binding: &InputBinding, sample: &JoySample) -> Result<OutputAction, MappingError> {
    if sample.is_pressed(binding.button(ButtonRole::Takeoff)) {
        return Ok(OutputAction::Takeoff);
    }
    if sample.is_pressed(binding.button(ButtonRole::Land)) {
        return Ok(OutputAction::Land);
    }

    let axis = |role: AxisRole| {
        let index = binding.axis(role);
        sample.axis(index).ok_or(MappingError::MissingAxis {
            role,
            index,
            available: sample.axes.len(),
        })
    };

    Ok(OutputAction::Velocity(VelocitySetpoint {
        longitudinal: axis(AxisRole::Throttle)?,
        lateral: axis(AxisRole::Strafe)?,
        vertical: axis(AxisRole::Vertical)?,
        rotational: axis(AxisRole::Yaw)?,
    }))
}
