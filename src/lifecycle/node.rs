//! Typestate joystick node built on statum
//!
//! Each lifecycle state is its own type, so only the operations valid in a
//! state exist on it: samples can only be handled by `JoyNode<Active>`, and
//! only `JoyNode<Unconfigured>` can be configured. Resources are attached on
//! configure and dropped on cleanup or shutdown.

use super::{LifecycleState, NodeError};
use crate::mapping::{translate, InputBinding, OutputAction};
use crate::msgs::{JoySample, Twist};
use crate::transport::{ActionClient, JoySubscription, ManagedPublisher, Transport, TransportError};
use statum::{machine, state};
use tracing::{debug, info};

#[state]
#[derive(Debug, Clone)]
pub enum NodeState {
    Unconfigured,
    Inactive,
    Active,
    Finalized,
}

/// Everything a configured node holds
pub struct NodeResources {
    pub subscription: JoySubscription,
    pub publisher: ManagedPublisher,
    pub client: Box<dyn ActionClient>,
}

impl NodeResources {
    /// All or nothing: if a later handle fails, the ones already created are
    /// dropped before the error is returned.
    pub fn acquire(
        transport: &dyn Transport,
        joy_topic: &str,
        queue_depth: usize,
        cmd_vel_topic: &str,
        action_service: &str,
    ) -> Result<Self, TransportError> {
        let subscription = transport.subscribe_joy(joy_topic, queue_depth)?;
        debug!("Subscribed to joy samples on '{}'", joy_topic);

        let publisher = ManagedPublisher::new(transport.create_publisher(cmd_vel_topic)?);
        debug!("Created velocity publisher on '{}'", cmd_vel_topic);

        let client = transport.create_client(action_service)?;
        debug!("Created client for service '{}'", action_service);

        Ok(Self {
            subscription,
            publisher,
            client,
        })
    }
}

#[machine]
pub struct JoyNode<S: NodeState> {
    name: String,
    binding: InputBinding,
    drone_name: Option<String>,
    resources: Option<NodeResources>,
}

impl<S: NodeState> JoyNode<S> {
    pub fn drone_name(&self) -> Option<&str> {
        self.drone_name.as_deref()
    }

    pub fn cmd_vel_topic(&self) -> Option<&str> {
        self.resources
            .as_ref()
            .map(|resources| resources.publisher.topic())
    }

    pub fn service_ready(&self) -> bool {
        self.resources
            .as_ref()
            .is_some_and(|resources| resources.client.is_ready())
    }

    pub fn publisher_activated(&self) -> bool {
        self.resources
            .as_ref()
            .is_some_and(|resources| resources.publisher.is_activated())
    }

    fn release(&mut self) {
        match self.resources.take() {
            Some(resources) => {
                drop(resources);
                debug!("Released joy subscription, publisher and action client");
            }
            None => debug!("No resources held, nothing to release"),
        }
        self.drone_name = None;
    }
}

impl JoyNode<Unconfigured> {
    pub fn create(name: impl Into<String>, binding: InputBinding) -> Self {
        let name = name.into();
        debug!("Creating node '{}'", name);
        Self::new(name, binding, None, None)
    }

    pub fn configure(mut self, drone_name: String, resources: NodeResources) -> JoyNode<Inactive> {
        self.drone_name = Some(drone_name);
        self.resources = Some(resources);
        info!("Node '{}' configured", self.name);
        self.transition()
    }

    pub fn shutdown(mut self) -> JoyNode<Finalized> {
        self.release();
        info!("Node shut down");
        self.transition()
    }
}

impl JoyNode<Inactive> {
    pub fn activate(mut self) -> JoyNode<Active> {
        info!("Activating command controller in TelloJoy node...");
        if let Some(resources) = self.resources.as_mut() {
            resources.publisher.on_activate();
        }
        info!("Controller activated");
        self.transition()
    }

    pub fn cleanup(mut self) -> JoyNode<Unconfigured> {
        info!("Cleaning up TelloJoy node...");
        self.release();
        info!("Node '{}' cleaned up", self.name);
        self.transition()
    }

    pub fn shutdown(mut self) -> JoyNode<Finalized> {
        self.release();
        info!("Node shut down");
        self.transition()
    }

    pub fn subscription_mut(&mut self) -> Option<&mut JoySubscription> {
        self.resources
            .as_mut()
            .map(|resources| &mut resources.subscription)
    }
}

impl JoyNode<Active> {
    pub fn deactivate(mut self) -> JoyNode<Inactive> {
        info!("Deactivating command controller in TelloJoy node...");
        if let Some(resources) = self.resources.as_mut() {
            resources.publisher.on_deactivate();
        }
        info!("Controller deactivated");
        self.transition()
    }

    pub fn shutdown(mut self) -> JoyNode<Finalized> {
        if let Some(resources) = self.resources.as_mut() {
            resources.publisher.on_deactivate();
        }
        self.release();
        info!("Node shut down");
        self.transition()
    }

    pub fn subscription_mut(&mut self) -> Option<&mut JoySubscription> {
        self.resources
            .as_mut()
            .map(|resources| &mut resources.subscription)
    }

    /// Translates one sample and emits the result.
    ///
    /// Takeoff and land are handed to the action client without waiting for
    /// an answer; velocities go straight to the publisher.
    pub fn on_joy(&mut self, sample: &JoySample) -> Result<OutputAction, NodeError> {
        let resources = self
            .resources
            .as_ref()
            .ok_or(NodeError::MissingResources(LifecycleState::Active))?;

        let action = translate(&self.binding, sample)?;
        if let Some(request) = action.request() {
            resources.client.send_request(request)?;
            match action {
                OutputAction::Takeoff => info!("request takeoff"),
                _ => info!("request landing"),
            }
        } else if let OutputAction::Velocity(setpoint) = action {
            resources.publisher.publish(&Twist::from(setpoint))?;
            debug!("sending rc command {:?}", setpoint);
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::ActionRequest;
    use crate::transport::memory::MemoryTransport;

    fn binding() -> InputBinding {
        InputBinding {
            takeoff_button: 0,
            land_button: 1,
            throttle_axis: 0,
            strafe_axis: 1,
            vertical_axis: 2,
            yaw_axis: 3,
        }
    }

    fn configured(transport: &MemoryTransport) -> JoyNode<Inactive> {
        let resources =
            NodeResources::acquire(transport, "joy", 1, "/drone1/cmd_vel", "tello_action").unwrap();
        JoyNode::create("tello_joy", binding()).configure("drone1".to_string(), resources)
    }

    #[test]
    fn activation_gates_publisher() {
        let transport = MemoryTransport::new();
        let node = configured(&transport);
        assert!(!node.publisher_activated());

        let node = node.activate();
        assert!(node.publisher_activated());

        let node = node.deactivate();
        assert!(!node.publisher_activated());
        assert_eq!(node.cmd_vel_topic(), Some("/drone1/cmd_vel"));
    }

    #[test]
    fn cleanup_releases_everything() {
        let transport = MemoryTransport::new();
        let node = configured(&transport);
        assert_eq!(transport.live_handles(), 3);

        let node = node.cleanup();
        assert_eq!(transport.live_handles(), 0);
        assert_eq!(node.drone_name(), None);
        assert_eq!(node.cmd_vel_topic(), None);
    }

    #[test]
    fn active_node_dispatches() {
        let transport = MemoryTransport::new();
        let mut node = configured(&transport).activate();

        let action = node
            .on_joy(&JoySample::new(vec![0.0; 4], vec![0, 1]))
            .unwrap();
        assert_eq!(action, OutputAction::Land);
        assert_eq!(
            transport.requests(),
            vec![("tello_action".to_string(), ActionRequest { cmd: "land".into() })]
        );
        assert!(transport.published().is_empty());
    }

    #[test]
    fn failed_acquisition_leaks_nothing() {
        let transport = MemoryTransport::new();
        transport.set_faults(crate::transport::memory::MemoryFaults {
            create_client: true,
            ..Default::default()
        });

        let result = NodeResources::acquire(&transport, "joy", 1, "/drone1/cmd_vel", "tello_action");
        assert!(matches!(result, Err(TransportError::Client { .. })));
        assert_eq!(transport.live_handles(), 0);
    }
}
