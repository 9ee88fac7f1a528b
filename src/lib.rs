//! Joystick teleoperation node for Tello drones
//!
//! A lifecycle-managed node turns joystick samples into either a takeoff or
//! land request for the drone's action service, or a velocity setpoint on
//! `/<drone_name>/cmd_vel`.
//!
//! - [`lifecycle`] - the node, its state machine and worker task
//! - [`mapping`] - pure translation of one sample into one action
//! - [`transport`] - broker seam with MQTT and in-memory backends
//! - [`joy`] - gilrs gamepad driver producing samples
//! - [`config`] - TOML configuration
//! - [`msgs`] - message types

pub mod config;
pub mod joy;
pub mod lifecycle;
pub mod mapping;
pub mod msgs;
pub mod transport;
