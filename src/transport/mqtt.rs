//! MQTT-backed transport
//!
//! Topic names are used verbatim as MQTT topics and every payload is JSON.
//! Velocity setpoints go out at QoS 0 since a newer one always follows;
//! action requests use QoS 1 and land on `<service>/request`, where the
//! drone-side executor listens. Responses are not consumed.
//!
//! The rumqttc event loop runs in its own tokio task. It tracks broker
//! connectivity, re-subscribes after reconnects and routes inbound joy samples
//! to the matching subscriptions.

use super::{ActionClient, JoySubscription, Transport, TransportError, TwistPublisher};
use crate::msgs::{ActionRequest, JoySample, Twist};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Capacity of the request queue between client handles and event loop
    pub channel_capacity: usize,
    pub reconnect_delay_ms: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "tello_joy".to_string(),
            keep_alive_secs: 5,
            channel_capacity: 100,
            reconnect_delay_ms: 1000,
        }
    }
}

type Routes = Arc<Mutex<HashMap<String, Vec<mpsc::Sender<JoySample>>>>>;

fn lock_routes(routes: &Routes) -> MutexGuard<'_, HashMap<String, Vec<mpsc::Sender<JoySample>>>> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn request_topic(service: &str) -> String {
    format!("{}/request", service)
}

pub struct MqttTransport {
    client: AsyncClient,
    routes: Routes,
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Creates the client and spawns its event loop. Must be called from
    /// within a tokio runtime.
    pub fn connect(settings: &MqttSettings) -> Self {
        info!(
            "Connecting to MQTT broker at {}:{} as '{}'",
            settings.host, settings.port, settings.client_id
        );

        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.host.clone(),
            settings.port,
        );
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(options, settings.channel_capacity);
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let (connected_tx, connected_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let task_handle = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            routes.clone(),
            connected_tx,
            Duration::from_millis(settings.reconnect_delay_ms),
            cancel.clone(),
        ));

        Self {
            client,
            routes,
            connected: connected_rx,
            cancel,
            task_handle: Mutex::new(Some(task_handle)),
        }
    }

    /// Feeds a sample into the broker, as a joystick driver would.
    pub fn publish_joy(&self, topic: &str, sample: &JoySample) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(sample)?;
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    /// Stops the event loop and waits for it to finish. Later calls return
    /// immediately.
    pub async fn disconnect(&self) {
        info!("Disconnecting from MQTT broker");
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect request not queued: {}", e);
        }
        self.cancel.cancel();

        let task_handle = self
            .task_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task_handle) = task_handle {
            if let Err(e) = task_handle.await {
                error!("MQTT event loop task failed: {}", e);
            }
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Transport for MqttTransport {
    fn subscribe_joy(&self, topic: &str, depth: usize) -> Result<JoySubscription, TransportError> {
        super::validate_topic(topic)?;

        let (sender, receiver) = mpsc::channel(depth.max(1));
        let mut routes = lock_routes(&self.routes);
        let senders = routes.entry(topic.to_string()).or_default();
        senders.retain(|sender| !sender.is_closed());

        if senders.is_empty() {
            self.client
                .try_subscribe(topic, QoS::AtMostOnce)
                .map_err(|e| TransportError::Subscribe {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
            debug!("Subscribed to '{}'", topic);
        }
        senders.push(sender);

        Ok(JoySubscription::new(topic, receiver))
    }

    fn create_publisher(&self, topic: &str) -> Result<Box<dyn TwistPublisher>, TransportError> {
        super::validate_topic(topic)?;
        debug!("Creating publisher for '{}'", topic);
        Ok(Box::new(MqttPublisher {
            topic: topic.to_string(),
            client: self.client.clone(),
        }))
    }

    fn create_client(&self, service: &str) -> Result<Box<dyn ActionClient>, TransportError> {
        super::validate_topic(service)?;
        debug!("Creating client for service '{}'", service);
        Ok(Box::new(MqttActionClient {
            service: service.to_string(),
            request_topic: request_topic(service),
            client: self.client.clone(),
            connected: self.connected.clone(),
        }))
    }
}

struct MqttPublisher {
    topic: String,
    client: AsyncClient,
}

impl TwistPublisher for MqttPublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&self, msg: &Twist) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(msg)?;
        self.client
            .try_publish(self.topic.as_str(), QoS::AtMostOnce, false, payload)
            .map_err(|e| TransportError::Publish {
                topic: self.topic.clone(),
                reason: e.to_string(),
            })
    }
}

struct MqttActionClient {
    service: String,
    request_topic: String,
    client: AsyncClient,
    connected: watch::Receiver<bool>,
}

impl ActionClient for MqttActionClient {
    fn service(&self) -> &str {
        &self.service
    }

    fn is_ready(&self) -> bool {
        *self.connected.borrow()
    }

    fn send_request(&self, request: ActionRequest) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(&request)?;
        self.client
            .try_publish(self.request_topic.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| TransportError::Request {
                service: self.service.clone(),
                reason: e.to_string(),
            })
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    routes: Routes,
    connected: watch::Sender<bool>,
    reconnect_delay: Duration,
    cancel: CancellationToken,
) {
    info!("MQTT event loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("MQTT event loop cancelled");
                break;
            }

            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to MQTT broker ({:?})", ack.code);
                    connected.send_replace(true);

                    // Clean sessions forget subscriptions across reconnects
                    let topics: Vec<String> = lock_routes(&routes).keys().cloned().collect();
                    for topic in topics {
                        if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                            error!("Failed to re-subscribe to '{}': {}", topic, e);
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    route_publish(&routes, &client, &publish.topic, &publish.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    if connected.send_replace(false) {
                        warn!("Lost connection to MQTT broker: {}", e);
                    } else {
                        debug!("MQTT broker still unreachable: {}", e);
                    }
                    tokio::time::sleep(reconnect_delay).await;
                }
            }
        }
    }

    connected.send_replace(false);
}

fn route_publish(routes: &Routes, client: &AsyncClient, topic: &str, payload: &[u8]) {
    let mut routes = lock_routes(routes);
    let Some(senders) = routes.get_mut(topic) else {
        debug!("Message on unrouted topic '{}' ignored", topic);
        return;
    };

    let sample: JoySample = match serde_json::from_slice(payload) {
        Ok(sample) => sample,
        Err(e) => {
            warn!("Discarding malformed joy sample on '{}': {}", topic, e);
            return;
        }
    };

    senders.retain(|sender| match sender.try_send(sample.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("Subscriber queue on '{}' full, sample dropped", topic);
            true
        }
        Err(TrySendError::Closed(_)) => false,
    });

    if senders.is_empty() {
        routes.remove(topic);
        if let Err(e) = client.try_unsubscribe(topic) {
            warn!("Failed to unsubscribe from '{}': {}", topic, e);
        } else {
            debug!("Last subscriber on '{}' gone, unsubscribed", topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_go_to_request_subtopic() {
        assert_eq!(request_topic("tello_action"), "tello_action/request");
    }

    #[test]
    fn settings_fill_missing_fields() {
        let settings: MqttSettings = toml::from_str("host = \"broker.local\"").unwrap();
        assert_eq!(settings.host, "broker.local");
        assert_eq!(settings.port, 1883);
        assert_eq!(settings.client_id, "tello_joy");
    }

    #[tokio::test]
    async fn handles_are_created_without_a_broker() {
        let transport = MqttTransport::connect(&MqttSettings {
            port: 1,
            reconnect_delay_ms: 10,
            ..MqttSettings::default()
        });

        let publisher = transport.create_publisher("/drone1/cmd_vel").unwrap();
        assert_eq!(publisher.topic(), "/drone1/cmd_vel");

        let client = transport.create_client("tello_action").unwrap();
        assert_eq!(client.service(), "tello_action");
        assert!(!client.is_ready());

        assert!(matches!(
            transport.create_publisher("/drone 1/cmd_vel"),
            Err(TransportError::InvalidTopic(_))
        ));
        transport.disconnect().await;
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn inbound_samples_fan_out_until_last_subscriber_leaves() {
        // Event loop is never polled, requests just queue up
        let (client, _eventloop) =
            AsyncClient::new(MqttOptions::new("tello_joy_test", "localhost", 1883), 10);
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let (first_tx, mut first_rx) = mpsc::channel(4);
        let (second_tx, mut second_rx) = mpsc::channel(4);
        lock_routes(&routes).insert("joy".to_string(), vec![first_tx, second_tx]);

        let sample = JoySample::new(vec![0.5, -1.0], vec![1, 0]);
        let payload = serde_json::to_vec(&sample).unwrap();
        route_publish(&routes, &client, "joy", &payload);
        route_publish(&routes, &client, "joy", b"not json");
        route_publish(&routes, &client, "other", &payload);

        for rx in [&mut first_rx, &mut second_rx] {
            let received = rx.try_recv().unwrap();
            assert_eq!(received.axes, sample.axes);
            assert_eq!(received.buttons, sample.buttons);
            assert!(rx.try_recv().is_err());
        }

        drop(first_rx);
        route_publish(&routes, &client, "joy", &payload);
        assert_eq!(lock_routes(&routes)["joy"].len(), 1);
        assert!(second_rx.try_recv().is_ok());

        drop(second_rx);
        route_publish(&routes, &client, "joy", &payload);
        assert!(lock_routes(&routes).get("joy").is_none());
    }
}
