//! Transport seam between the node and the outside world
//!
//! The node never talks to a broker directly. It asks a [`Transport`] for the
//! three handles it needs while configured:
//!
//! ```text
//!              ┌────────────── Transport ──────────────┐
//! joy topic ──►│ JoySubscription                       │
//!              │ TwistPublisher  ──► /<drone>/cmd_vel  │
//!              │ ActionClient    ──► tello_action      │
//!              └───────────────────────────────────────┘
//! ```
//!
//! Handles release themselves on drop, so dropping them is all a cleanup has
//! to do. Implementations:
//!
//! - [`mqtt::MqttTransport`] maps topics onto an MQTT broker with JSON payloads
//! - [`memory::MemoryTransport`] keeps everything in process and records it

pub mod managed;
pub mod memory;
pub mod mqtt;

pub use managed::ManagedPublisher;

use crate::msgs::{ActionRequest, JoySample, Twist};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid topic name '{0}'")]
    InvalidTopic(String),

    #[error("Failed to subscribe to '{topic}': {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Failed to create publisher for '{topic}': {reason}")]
    Publisher { topic: String, reason: String },

    #[error("Failed to create client for service '{service}': {reason}")]
    Client { service: String, reason: String },

    #[error("Publish on '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Request to service '{service}' failed: {reason}")]
    Request { service: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outbound velocity stream
pub trait TwistPublisher: Send {
    fn topic(&self) -> &str;

    /// Must not block the caller.
    fn publish(&self, msg: &Twist) -> Result<(), TransportError>;
}

/// Request side of the drone's action service
pub trait ActionClient: Send {
    fn service(&self) -> &str;

    /// Whether a request sent now has somewhere to go.
    fn is_ready(&self) -> bool;

    /// Fire and forget: hands the request off and returns without waiting for
    /// any acknowledgment.
    fn send_request(&self, request: ActionRequest) -> Result<(), TransportError>;
}

/// Factory for the node's resource handles
pub trait Transport: Send + Sync {
    fn subscribe_joy(&self, topic: &str, depth: usize) -> Result<JoySubscription, TransportError>;

    fn create_publisher(&self, topic: &str) -> Result<Box<dyn TwistPublisher>, TransportError>;

    fn create_client(&self, service: &str) -> Result<Box<dyn ActionClient>, TransportError>;
}

/// Inbound joystick stream
///
/// Backed by a bounded channel the transport feeds. Dropping the subscription
/// closes the channel, which the transport takes as the signal to stop
/// delivering.
#[derive(Debug)]
pub struct JoySubscription {
    topic: String,
    receiver: mpsc::Receiver<JoySample>,
}

impl JoySubscription {
    pub fn new(topic: impl Into<String>, receiver: mpsc::Receiver<JoySample>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the next sample; `None` once the transport side is gone.
    pub async fn recv(&mut self) -> Option<JoySample> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<JoySample> {
        self.receiver.try_recv().ok()
    }
}

/// Accepts ROS-style names: `/`-separated tokens of ASCII alphanumerics and
/// underscores, no token starting with a digit, no empty tokens.
pub fn validate_topic(topic: &str) -> Result<(), TransportError> {
    let body = topic.strip_prefix('/').unwrap_or(topic);
    let valid = !body.is_empty()
        && body.split('/').all(|token| {
            !token.is_empty()
                && !token.starts_with(|c: char| c.is_ascii_digit())
                && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidTopic(topic.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names() {
        for good in ["joy", "/drone1/cmd_vel", "tello_action", "_private/x"] {
            assert!(validate_topic(good).is_ok(), "{good} should be valid");
        }
        for bad in ["", "/", "//cmd_vel", "/1drone/cmd_vel", "/drone 1/cmd_vel", "a/#", "a/+/b", "cmd_vel/"] {
            assert!(validate_topic(bad).is_err(), "{bad} should be invalid");
        }
    }
}
