use super::node::{Active, Finalized, Inactive, JoyNode, NodeResources, Unconfigured};
use super::params::ParameterStore;
use super::{cmd_vel_topic, validate_drone_name, LifecycleState, NodeError, NodeSettings, Transition};
use crate::mapping::{InputBinding, OutputAction};
use crate::msgs::JoySample;
use crate::transport::{JoySubscription, Transport};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

enum Slot {
    Unconfigured(JoyNode<Unconfigured>),
    Inactive(JoyNode<Inactive>),
    Active(JoyNode<Active>),
    Finalized(JoyNode<Finalized>),
}

impl Slot {
    fn state(&self) -> LifecycleState {
        match self {
            Slot::Unconfigured(_) => LifecycleState::Unconfigured,
            Slot::Inactive(_) => LifecycleState::Inactive,
            Slot::Active(_) => LifecycleState::Active,
            Slot::Finalized(_) => LifecycleState::Finalized,
        }
    }
}

/// Runtime face of the typestate node
///
/// Holds whichever `JoyNode<S>` is current and checks each requested
/// transition against it. A rejected transition leaves the node untouched.
pub struct LifecycleController {
    slot: Option<Slot>,
    params: ParameterStore,
    transport: Arc<dyn Transport>,
    settings: NodeSettings,
}

impl LifecycleController {
    pub fn new(
        settings: NodeSettings,
        binding: InputBinding,
        params: ParameterStore,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, NodeError> {
        binding.validate()?;
        let node = JoyNode::create(settings.node_name.clone(), binding);
        Ok(Self {
            slot: Some(Slot::Unconfigured(node)),
            params,
            transport,
            settings,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.slot
            .as_ref()
            .map_or(LifecycleState::Finalized, Slot::state)
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn transition(&mut self, transition: Transition) -> Result<LifecycleState, NodeError> {
        match transition {
            Transition::Configure => self.configure(),
            Transition::Activate => self.activate(),
            Transition::Deactivate => self.deactivate(),
            Transition::Cleanup => self.cleanup(),
            Transition::Shutdown => Ok(self.shutdown()),
        }
    }

    pub fn configure(&mut self) -> Result<LifecycleState, NodeError> {
        let node = match self.slot.take() {
            Some(Slot::Unconfigured(node)) => node,
            other => return self.reject(Transition::Configure, other),
        };

        info!("Configuring TelloJoy node...");
        match self.acquire() {
            Ok((drone_name, resources)) => {
                self.slot = Some(Slot::Inactive(node.configure(drone_name, resources)));
                Ok(LifecycleState::Inactive)
            }
            Err(e) => {
                error!("Configuration failed: {}", e);
                self.slot = Some(Slot::Unconfigured(node));
                Err(e)
            }
        }
    }

    fn acquire(&self) -> Result<(String, NodeResources), NodeError> {
        let drone_name = self.params.drone_name()?;
        validate_drone_name(&drone_name)?;
        let topic = cmd_vel_topic(&drone_name);
        debug!("Drone '{}' commands go to '{}'", drone_name, topic);

        let resources = NodeResources::acquire(
            self.transport.as_ref(),
            &self.settings.joy_topic,
            self.settings.queue_depth,
            &topic,
            &self.settings.action_service,
        )?;
        Ok((drone_name, resources))
    }

    pub fn activate(&mut self) -> Result<LifecycleState, NodeError> {
        match self.slot.take() {
            Some(Slot::Inactive(node)) => {
                self.slot = Some(Slot::Active(node.activate()));
                Ok(LifecycleState::Active)
            }
            other => self.reject(Transition::Activate, other),
        }
    }

    pub fn deactivate(&mut self) -> Result<LifecycleState, NodeError> {
        match self.slot.take() {
            Some(Slot::Active(node)) => {
                self.slot = Some(Slot::Inactive(node.deactivate()));
                Ok(LifecycleState::Inactive)
            }
            other => self.reject(Transition::Deactivate, other),
        }
    }

    pub fn cleanup(&mut self) -> Result<LifecycleState, NodeError> {
        match self.slot.take() {
            Some(Slot::Inactive(node)) => {
                self.slot = Some(Slot::Unconfigured(node.cleanup()));
                Ok(LifecycleState::Unconfigured)
            }
            other => self.reject(Transition::Cleanup, other),
        }
    }

    /// Allowed from every state, and again once finalized.
    pub fn shutdown(&mut self) -> LifecycleState {
        let finalized = match self.slot.take() {
            Some(Slot::Unconfigured(node)) => node.shutdown(),
            Some(Slot::Inactive(node)) => node.shutdown(),
            Some(Slot::Active(node)) => node.shutdown(),
            Some(Slot::Finalized(node)) => {
                debug!("Shutdown requested on a finalized node");
                node
            }
            None => {
                warn!("Node slot was empty during shutdown");
                return LifecycleState::Finalized;
            }
        };
        self.slot = Some(Slot::Finalized(finalized));
        LifecycleState::Finalized
    }

    fn reject(
        &mut self,
        transition: Transition,
        slot: Option<Slot>,
    ) -> Result<LifecycleState, NodeError> {
        self.slot = slot;
        let state = self.state();
        warn!("Rejected {} while {}", transition, state);
        Err(NodeError::InvalidTransition { transition, state })
    }

    /// Handles one joy sample. Only an active node produces output; in any
    /// other state the sample is rejected and nothing is touched.
    pub fn on_joy(&mut self, sample: &JoySample) -> Result<OutputAction, NodeError> {
        let state = self.state();
        match self.slot.as_mut() {
            Some(Slot::Active(node)) => node.on_joy(sample),
            _ => Err(NodeError::NotActive(state)),
        }
    }

    pub fn service_ready(&self) -> bool {
        match self.slot.as_ref() {
            Some(Slot::Inactive(node)) => node.service_ready(),
            Some(Slot::Active(node)) => node.service_ready(),
            _ => false,
        }
    }

    /// Identity of the configured drone, if any
    pub fn drone_name(&self) -> Option<&str> {
        match self.slot.as_ref() {
            Some(Slot::Inactive(node)) => node.drone_name(),
            Some(Slot::Active(node)) => node.drone_name(),
            _ => None,
        }
    }

    pub fn cmd_vel_topic(&self) -> Option<&str> {
        match self.slot.as_ref() {
            Some(Slot::Inactive(node)) => node.cmd_vel_topic(),
            Some(Slot::Active(node)) => node.cmd_vel_topic(),
            _ => None,
        }
    }

    fn subscription_mut(&mut self) -> Option<&mut JoySubscription> {
        match self.slot.as_mut() {
            Some(Slot::Inactive(node)) => node.subscription_mut(),
            Some(Slot::Active(node)) => node.subscription_mut(),
            _ => None,
        }
    }

    /// Waits for the next joy sample.
    ///
    /// Never resolves without a live subscription, which makes it safe to use
    /// as one branch of a `select!`.
    pub async fn next_sample(&mut self) -> JoySample {
        if let Some(subscription) = self.subscription_mut() {
            if let Some(sample) = subscription.recv().await {
                return sample;
            }
            debug!("Joy subscription closed by transport");
        }
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::VelocitySetpoint;
    use crate::transport::memory::{MemoryFaults, MemoryTransport};

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

    fn controller(transport: &MemoryTransport) -> LifecycleController {
        LifecycleController::new(
            NodeSettings::default(),
            binding(),
            ParameterStore::default(),
            Arc::new(transport.clone()),
        )
        .unwrap()
    }

    #[test]
    fn full_cycle() {
        let transport = MemoryTransport::new();
        let mut controller = controller(&transport);
        assert_eq!(controller.state(), LifecycleState::Unconfigured);

        assert_eq!(controller.configure().unwrap(), LifecycleState::Inactive);
        assert_eq!(controller.drone_name(), Some("drone1"));
        assert_eq!(controller.cmd_vel_topic(), Some("/drone1/cmd_vel"));
        assert_eq!(controller.activate().unwrap(), LifecycleState::Active);
        assert_eq!(controller.deactivate().unwrap(), LifecycleState::Inactive);
        assert_eq!(controller.cleanup().unwrap(), LifecycleState::Unconfigured);
        assert_eq!(transport.live_handles(), 0);
        assert_eq!(controller.shutdown(), LifecycleState::Finalized);
    }

    #[test]
    fn invalid_transitions_keep_state() {
        let transport = MemoryTransport::new();
        let mut controller = controller(&transport);

        assert!(matches!(
            controller.activate(),
            Err(NodeError::InvalidTransition {
                transition: Transition::Activate,
                state: LifecycleState::Unconfigured
            })
        ));
        assert_eq!(controller.state(), LifecycleState::Unconfigured);

        controller.configure().unwrap();
        controller.activate().unwrap();
        assert!(matches!(
            controller.cleanup(),
            Err(NodeError::InvalidTransition {
                state: LifecycleState::Active,
                ..
            })
        ));
        assert!(controller.configure().is_err());
        assert_eq!(controller.state(), LifecycleState::Active);
        assert_eq!(transport.live_handles(), 3);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let transport = MemoryTransport::new();
        let mut controller = controller(&transport);
        controller.configure().unwrap();
        controller.activate().unwrap();

        assert_eq!(controller.shutdown(), LifecycleState::Finalized);
        assert_eq!(controller.shutdown(), LifecycleState::Finalized);
        assert_eq!(transport.live_handles(), 0);
        assert!(controller.configure().is_err());
        assert_eq!(controller.state(), LifecycleState::Finalized);
    }

    #[test]
    fn failed_configure_stays_unconfigured() {
        let transport = MemoryTransport::new();
        transport.set_faults(MemoryFaults {
            create_publisher: true,
            ..MemoryFaults::default()
        });
        let mut controller = controller(&transport);

        assert!(matches!(controller.configure(), Err(NodeError::Transport(_))));
        assert_eq!(controller.state(), LifecycleState::Unconfigured);
        assert_eq!(transport.live_handles(), 0);

        transport.set_faults(MemoryFaults::default());
        assert_eq!(controller.configure().unwrap(), LifecycleState::Inactive);
    }

    #[test]
    fn invalid_identity_rejected() {
        let transport = MemoryTransport::new();
        let mut controller = controller(&transport);
        controller.params().set_drone_name("").unwrap();

        assert!(matches!(
            controller.configure(),
            Err(NodeError::InvalidIdentity { .. })
        ));
        assert_eq!(controller.state(), LifecycleState::Unconfigured);
        assert_eq!(transport.live_handles(), 0);
    }

    #[test]
    fn parameter_change_applies_on_next_configure() {
        let transport = MemoryTransport::new();
        let mut controller = controller(&transport);
        controller.configure().unwrap();

        controller.params().set_drone_name("drone2").unwrap();
        assert_eq!(controller.cmd_vel_topic(), Some("/drone1/cmd_vel"));

        controller.cleanup().unwrap();
        controller.configure().unwrap();
        assert_eq!(controller.cmd_vel_topic(), Some("/drone2/cmd_vel"));
    }

    #[test]
    fn samples_outside_active_are_rejected() {
        let transport = MemoryTransport::new();
        let mut controller = controller(&transport);
        let sample = JoySample::new(vec![0.1, 0.2, 0.3, 0.4], vec![0, 0]);

        assert!(matches!(
            controller.on_joy(&sample),
            Err(NodeError::NotActive(LifecycleState::Unconfigured))
        ));
        controller.configure().unwrap();
        assert!(matches!(
            controller.on_joy(&sample),
            Err(NodeError::NotActive(LifecycleState::Inactive))
        ));
        assert!(transport.published().is_empty());

        controller.activate().unwrap();
        assert_eq!(
            controller.on_joy(&sample).unwrap(),
            OutputAction::Velocity(VelocitySetpoint {
                longitudinal: 0.1,
                lateral: 0.2,
                vertical: 0.3,
                rotational: 0.4,
            })
        );
        assert_eq!(transport.published().len(), 1);

        controller.deactivate().unwrap();
        let takeoff = JoySample::new(vec![0.0; 4], vec![1, 0]);
        for s in [&sample, &takeoff] {
            assert!(matches!(
                controller.on_joy(s),
                Err(NodeError::NotActive(LifecycleState::Inactive))
            ));
        }
        assert_eq!(transport.published().len(), 1);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn conflicting_binding_refused() {
        let transport = MemoryTransport::new();
        let result = LifecycleController::new(
            NodeSettings::default(),
            InputBinding {
                land_button: 0,
                ..binding()
            },
            ParameterStore::default(),
            Arc::new(transport),
        );
        assert!(matches!(result, Err(NodeError::Mapping(_))));
    }
}
