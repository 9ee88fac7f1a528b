//! Publisher wrapper gated by the node's activation state

use super::{TransportError, TwistPublisher};
use crate::msgs::Twist;
use tracing::{debug, warn};

/// A publisher that only emits while activated
///
/// Created deactivated. Publishing while deactivated drops the message with a
/// warning instead of failing; the node flips the gate on activate and
/// deactivate.
pub struct ManagedPublisher {
    inner: Box<dyn TwistPublisher>,
    activated: bool,
}

impl ManagedPublisher {
    pub fn new(inner: Box<dyn TwistPublisher>) -> Self {
        Self {
            inner,
            activated: false,
        }
    }

    pub fn topic(&self) -> &str {
        self.inner.topic()
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn on_activate(&mut self) {
        debug!("Publisher on '{}' activated", self.topic());
        self.activated = true;
    }

    pub fn on_deactivate(&mut self) {
        debug!("Publisher on '{}' deactivated", self.topic());
        self.activated = false;
    }

    /// Returns `Ok(false)` when the message was dropped by the gate.
    pub fn publish(&self, msg: &Twist) -> Result<bool, TransportError> {
        if !self.activated {
            warn!(
                "Trying to publish on '{}', but the publisher is not activated",
                self.topic()
            );
            return Ok(false);
        }
        self.inner.publish(msg)?;
        Ok(true)
    }
}
