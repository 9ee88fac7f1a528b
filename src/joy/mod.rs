//! Gamepad driver producing joy samples
//!
//! Polls a gamepad through gilrs on a blocking thread, folds its events into
//! the Xbox joy layout and hands complete [`JoySample`](crate::msgs::JoySample)s
//! to an async channel. It is a separate producer: the node only ever sees
//! its samples through a transport.

pub mod driver;
pub mod layout;

pub use driver::{JoyDriver, JoyDriverHandle};
pub use layout::JoyState;

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Failed to initialize gamepad interface: {0}")]
    Initialization(String),

    #[error("Joy sample channel closed")]
    ChannelClosed,

    #[error("Driver task failed: {0}")]
    Task(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    /// Stick and trigger values below this magnitude read as zero
    pub deadzone: f32,
    /// Rate at which an unchanged state is re-sent; 0 sends on change only
    pub autorepeat_rate_hz: f32,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 10,
            deadzone: 0.05,
            autorepeat_rate_hz: 20.0,
        }
    }
}

impl DriverSettings {
    /// Rejects values that would turn full deflection into NaN or inflate
    /// small readings.
    pub fn validate(&self) -> Result<(), DriverError> {
        if !(self.deadzone.is_finite() && (0.0..1.0).contains(&self.deadzone)) {
            return Err(DriverError::Initialization(format!(
                "deadzone must be in [0, 1), got {}",
                self.deadzone
            )));
        }
        if !self.autorepeat_rate_hz.is_finite() || self.autorepeat_rate_hz < 0.0 {
            return Err(DriverError::Initialization(format!(
                "autorepeat rate must be finite and not negative, got {}",
                self.autorepeat_rate_hz
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn autorepeat_interval(&self) -> Option<Duration> {
        if self.autorepeat_rate_hz > 0.0 && self.autorepeat_rate_hz.is_finite() {
            Some(Duration::from_secs_f64(1.0 / f64::from(self.autorepeat_rate_hz)))
        } else {
            None
        }
    }
}
