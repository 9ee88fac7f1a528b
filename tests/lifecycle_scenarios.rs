use std::sync::Arc;
use std::time::Duration;
use tello_joy::lifecycle::{
    LifecycleController, LifecycleState, NodeError, NodeHandle, NodeSettings, ParameterStore,
};
use tello_joy::mapping::{InputBinding, OutputAction, VelocitySetpoint};
use tello_joy::msgs::{ActionRequest, JoySample, Twist, Vector3};
use tello_joy::transport::memory::{MemoryFaults, MemoryTransport};

/// Two buttons and four axes, in the order the node expects them
fn compact_binding() -> InputBinding {
    InputBinding {
        takeoff_button: 0,
        land_button: 1,
        throttle_axis: 0,
        strafe_axis: 1,
        vertical_axis: 2,
        yaw_axis: 3,
    }
}

fn controller(transport: &MemoryTransport, drone_name: &str) -> LifecycleController {
    LifecycleController::new(
        NodeSettings::default(),
        compact_binding(),
        ParameterStore::new(drone_name),
        Arc::new(transport.clone()),
    )
    .unwrap()
}

fn active_controller(transport: &MemoryTransport) -> LifecycleController {
    let mut controller = controller(transport, "drone1");
    controller.configure().unwrap();
    controller.activate().unwrap();
    controller
}

fn sample(buttons: [i32; 2], axes: [f32; 4]) -> JoySample {
    JoySample::new(axes.to_vec(), buttons.to_vec())
}

#[test]
fn takeoff_button_dispatches_takeoff_only() {
    let transport = MemoryTransport::new();
    let mut controller = active_controller(&transport);

    let action = controller
        .on_joy(&sample([1, 0], [0.0, 0.0, 0.0, 0.0]))
        .unwrap();

    assert_eq!(action, OutputAction::Takeoff);
    assert_eq!(
        transport.requests(),
        vec![(
            "tello_action".to_string(),
            ActionRequest {
                cmd: "takeoff".to_string()
            }
        )]
    );
    assert!(transport.published().is_empty());
}

#[test]
fn axes_publish_unmodified_velocity() {
    let transport = MemoryTransport::new();
    let mut controller = active_controller(&transport);

    let action = controller
        .on_joy(&sample([0, 0], [0.5, -0.2, 0.0, 1.0]))
        .unwrap();

    assert_eq!(
        action,
        OutputAction::Velocity(VelocitySetpoint {
            longitudinal: 0.5,
            lateral: -0.2,
            vertical: 0.0,
            rotational: 1.0,
        })
    );
    assert_eq!(
        transport.published(),
        vec![(
            "/drone1/cmd_vel".to_string(),
            Twist {
                linear: Vector3 {
                    x: f64::from(0.5f32),
                    y: f64::from(-0.2f32),
                    z: 0.0,
                },
                angular: Vector3 {
                    x: 0.0,
                    y: 0.0,
                    z: 1.0,
                },
            }
        )]
    );
    assert!(transport.requests().is_empty());
}

#[test]
fn takeoff_wins_over_land_and_axes() {
    let transport = MemoryTransport::new();
    let mut controller = active_controller(&transport);

    assert_eq!(
        controller
            .on_joy(&sample([1, 1], [0.9, 0.9, 0.9, 0.9]))
            .unwrap(),
        OutputAction::Takeoff
    );
    assert_eq!(
        controller
            .on_joy(&sample([0, 1], [0.9, 0.9, 0.9, 0.9]))
            .unwrap(),
        OutputAction::Land
    );

    let commands: Vec<String> = transport
        .requests()
        .into_iter()
        .map(|(_, request)| request.cmd)
        .collect();
    assert_eq!(commands, vec!["takeoff", "land"]);
    assert!(transport.published().is_empty());
}

#[test]
fn samples_after_cleanup_are_ignored() {
    let transport = MemoryTransport::new();
    let mut controller = controller(&transport, "drone1");
    controller.configure().unwrap();
    controller.cleanup().unwrap();

    assert!(matches!(
        controller.on_joy(&sample([1, 0], [0.5, 0.5, 0.5, 0.5])),
        Err(NodeError::NotActive(LifecycleState::Unconfigured))
    ));
    assert!(transport.requests().is_empty());
    assert!(transport.published().is_empty());
    assert_eq!(transport.live_handles(), 0);
}

#[test]
fn inactive_node_produces_nothing() {
    let transport = MemoryTransport::new();
    let mut controller = controller(&transport, "drone1");
    controller.configure().unwrap();

    for s in [
        sample([1, 0], [0.0; 4]),
        sample([0, 1], [0.0; 4]),
        sample([0, 0], [0.3; 4]),
    ] {
        assert!(controller.on_joy(&s).is_err());
    }
    assert!(transport.requests().is_empty());
    assert!(transport.published().is_empty());
}

#[test]
fn shutdown_without_configure_twice() {
    let transport = MemoryTransport::new();
    let mut controller = controller(&transport, "drone1");

    assert_eq!(controller.shutdown(), LifecycleState::Finalized);
    assert_eq!(controller.shutdown(), LifecycleState::Finalized);
    assert_eq!(transport.live_handles(), 0);
}

#[test]
fn dispatch_failure_is_reported_not_retried() {
    let transport = MemoryTransport::new();
    let mut controller = active_controller(&transport);
    transport.set_faults(MemoryFaults {
        request: true,
        publish: true,
        ..MemoryFaults::default()
    });

    assert!(matches!(
        controller.on_joy(&sample([1, 0], [0.0; 4])),
        Err(NodeError::Transport(_))
    ));
    assert!(matches!(
        controller.on_joy(&sample([0, 0], [0.1; 4])),
        Err(NodeError::Transport(_))
    ));
    assert_eq!(controller.state(), LifecycleState::Active);

    transport.set_faults(MemoryFaults::default());
    assert!(controller.on_joy(&sample([0, 0], [0.1; 4])).is_ok());
    assert_eq!(transport.published().len(), 1);
}

#[test]
fn short_sample_is_rejected() {
    let transport = MemoryTransport::new();
    let mut controller = active_controller(&transport);

    assert!(matches!(
        controller.on_joy(&JoySample::new(vec![0.1, 0.2], vec![0, 0])),
        Err(NodeError::Mapping(_))
    ));
    assert!(transport.published().is_empty());

    // A missing button reads as released, the buttons still decide first
    assert_eq!(
        controller
            .on_joy(&JoySample::new(vec![], vec![1]))
            .unwrap(),
        OutputAction::Takeoff
    );
}

#[test]
fn drone_name_drives_topic() {
    let transport = MemoryTransport::new();
    let mut controller = controller(&transport, "tello_7");
    controller.configure().unwrap();
    controller.activate().unwrap();
    controller.on_joy(&sample([0, 0], [0.0; 4])).unwrap();

    assert_eq!(transport.published()[0].0, "/tello_7/cmd_vel");
}

#[tokio::test]
async fn worker_serves_samples_in_order() {
    let transport = MemoryTransport::new();
    let settings = NodeSettings {
        queue_depth: 8,
        ..NodeSettings::default()
    };
    let controller = LifecycleController::new(
        settings,
        compact_binding(),
        ParameterStore::default(),
        Arc::new(transport.clone()),
    )
    .unwrap();
    let node = NodeHandle::spawn(controller);
    node.configure().await.unwrap();
    node.activate().await.unwrap();

    for value in [0.1, 0.2, 0.3] {
        assert_eq!(transport.inject("joy", sample([0, 0], [value, 0.0, 0.0, 0.0])), 1);
    }

    let mut served = false;
    for _ in 0..100 {
        if transport.published().len() == 3 {
            served = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(served);

    let throttle: Vec<f64> = transport
        .published()
        .into_iter()
        .map(|(_, twist)| twist.linear.x)
        .collect();
    assert_eq!(
        throttle,
        vec![f64::from(0.1f32), f64::from(0.2f32), f64::from(0.3f32)]
    );

    node.shutdown().await.unwrap();
    assert_eq!(transport.live_handles(), 0);
    node.join().await;
}
