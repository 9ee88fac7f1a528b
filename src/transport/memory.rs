//! In-process transport that records every message
//!
//! Used wherever a broker would get in the way: tests, dry runs and local
//! experiments. Samples are injected by hand, publishes and requests are
//! recorded in order, and each kind of failure can be switched on to exercise
//! error paths.

use super::{ActionClient, JoySubscription, Transport, TransportError, TwistPublisher};
use crate::msgs::{ActionRequest, JoySample, Twist};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Failure switches, each affecting every later call of its kind
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryFaults {
    pub subscribe: bool,
    pub create_publisher: bool,
    pub create_client: bool,
    pub publish: bool,
    pub request: bool,
}

struct MemoryState {
    subscribers: HashMap<String, Vec<mpsc::Sender<JoySample>>>,
    published: Vec<(String, Twist)>,
    requests: Vec<(String, ActionRequest)>,
    faults: MemoryFaults,
    service_ready: bool,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            subscribers: HashMap::new(),
            published: Vec::new(),
            requests: Vec::new(),
            faults: MemoryFaults::default(),
            service_ready: true,
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    live_handles: Arc<AtomicUsize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_faults(&self, faults: MemoryFaults) {
        self.lock().faults = faults;
    }

    pub fn set_service_ready(&self, ready: bool) {
        self.lock().service_ready = ready;
    }

    /// Delivers a sample to every live subscriber of `topic`, returning how
    /// many received it. Full queues drop the sample for that subscriber.
    pub fn inject(&self, topic: &str, sample: JoySample) -> usize {
        let mut state = self.lock();
        let Some(senders) = state.subscribers.get_mut(topic) else {
            debug!("No subscriber on '{}', sample dropped", topic);
            return 0;
        };

        senders.retain(|sender| !sender.is_closed());
        senders
            .iter()
            .filter(|sender| sender.try_send(sample.clone()).is_ok())
            .count()
    }

    pub fn published(&self) -> Vec<(String, Twist)> {
        self.lock().published.clone()
    }

    pub fn requests(&self) -> Vec<(String, ActionRequest)> {
        self.lock().requests.clone()
    }

    pub fn live_subscriptions(&self) -> usize {
        self.lock()
            .subscribers
            .values()
            .flatten()
            .filter(|sender| !sender.is_closed())
            .count()
    }

    /// Publishers, clients and subscriptions not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst) + self.live_subscriptions()
    }

    fn token(&self) -> HandleToken {
        self.live_handles.fetch_add(1, Ordering::SeqCst);
        HandleToken(self.live_handles.clone())
    }
}

impl Transport for MemoryTransport {
    fn subscribe_joy(&self, topic: &str, depth: usize) -> Result<JoySubscription, TransportError> {
        super::validate_topic(topic)?;
        let mut state = self.lock();
        if state.faults.subscribe {
            return Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "injected fault".to_string(),
            });
        }

        let (sender, receiver) = mpsc::channel(depth.max(1));
        state
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        Ok(JoySubscription::new(topic, receiver))
    }

    fn create_publisher(&self, topic: &str) -> Result<Box<dyn TwistPublisher>, TransportError> {
        super::validate_topic(topic)?;
        if self.lock().faults.create_publisher {
            return Err(TransportError::Publisher {
                topic: topic.to_string(),
                reason: "injected fault".to_string(),
            });
        }

        Ok(Box::new(MemoryPublisher {
            topic: topic.to_string(),
            transport: self.clone(),
            _token: self.token(),
        }))
    }

    fn create_client(&self, service: &str) -> Result<Box<dyn ActionClient>, TransportError> {
        super::validate_topic(service)?;
        if self.lock().faults.create_client {
            return Err(TransportError::Client {
                service: service.to_string(),
                reason: "injected fault".to_string(),
            });
        }

        Ok(Box::new(MemoryClient {
            service: service.to_string(),
            transport: self.clone(),
            _token: self.token(),
        }))
    }
}

struct HandleToken(Arc<AtomicUsize>);

impl Drop for HandleToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MemoryPublisher {
    topic: String,
    transport: MemoryTransport,
    _token: HandleToken,
}

impl TwistPublisher for MemoryPublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&self, msg: &Twist) -> Result<(), TransportError> {
        let mut state = self.transport.lock();
        if state.faults.publish {
            return Err(TransportError::Publish {
                topic: self.topic.clone(),
                reason: "injected fault".to_string(),
            });
        }
        state.published.push((self.topic.clone(), *msg));
        Ok(())
    }
}

struct MemoryClient {
    service: String,
    transport: MemoryTransport,
    _token: HandleToken,
}

impl ActionClient for MemoryClient {
    fn service(&self) -> &str {
        &self.service
    }

    fn is_ready(&self) -> bool {
        self.transport.lock().service_ready
    }

    fn send_request(&self, request: ActionRequest) -> Result<(), TransportError> {
        let mut state = self.transport.lock();
        if state.faults.request {
            return Err(TransportError::Request {
                service: self.service.clone(),
                reason: "injected fault".to_string(),
            });
        }
        state.requests.push((self.service.clone(), request));
        Ok(())
    }
}
