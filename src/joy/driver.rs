use super::layout::JoyState;
use super::{DriverError, DriverSettings};
use crate::msgs::JoySample;
use gilrs::{Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[state]
#[derive(Debug, Clone)]
pub enum DriverState {
    Initializing,
    Polling,
}

#[machine]
#[derive(Debug)]
pub struct JoyDriver<S: DriverState> {
    gilrs: Gilrs,
    active_gamepad: Option<GamepadId>,
    settings: DriverSettings,
    joy: JoyState,
    sample_tx: mpsc::Sender<JoySample>,
    last_sent: Option<Instant>,
}

impl JoyDriver<Initializing> {
    pub fn create(
        settings: DriverSettings,
        sample_tx: mpsc::Sender<JoySample>,
    ) -> Result<Self, DriverError> {
        debug!("Creating joy driver with settings: {:?}", settings);
        settings.validate()?;

        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(DriverError::Initialization(e.to_string()));
            }
        };

        Ok(Self::new(
            gilrs,
            None,
            settings,
            JoyState::neutral(),
            sample_tx,
            None,
        ))
    }

    /// Picks the first connected gamepad. Without one the driver idles until
    /// a gamepad connects.
    pub fn initialize(mut self) -> JoyDriver<Polling> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for one");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
            }
            let (id, gamepad) = &gamepads[0];
            self.active_gamepad = Some(*id);
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
        }

        debug!("Joy driver initialized, transitioning to Polling state");
        self.transition()
    }
}

impl JoyDriver<Polling> {
    /// Drains pending gilrs events into the joy state. Returns whether the
    /// state changed.
    pub fn poll_events(&mut self) -> bool {
        let mut changed = false;
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            changed |= self.apply_event(id, event);
        }
        changed
    }

    fn apply_event(&mut self, id: GamepadId, event: EventType) -> bool {
        match event {
            EventType::Connected => {
                if self.active_gamepad.is_none() {
                    info!("Gamepad connected, selecting it: {}", id);
                    self.active_gamepad = Some(id);
                } else {
                    debug!("Additional gamepad connected: {}", id);
                }
                return false;
            }
            EventType::Disconnected if self.active_gamepad == Some(id) => {
                warn!("Active gamepad disconnected, resetting to neutral");
                self.active_gamepad = None;
                return self.joy.reset();
            }
            _ => {}
        }

        if self.active_gamepad != Some(id) {
            debug!("Skipping event from non-active gamepad: {:?}", id);
            return false;
        }

        let deadzone = self.settings.deadzone;
        match event {
            EventType::AxisChanged(axis, value, _) => self.joy.apply_axis(axis, value, deadzone),
            EventType::ButtonPressed(button, _) => {
                debug!("Button pressed: {:?}", button);
                self.joy.apply_button(button, true)
            }
            EventType::ButtonReleased(button, _) => {
                debug!("Button released: {:?}", button);
                self.joy.apply_button(button, false)
            }
            EventType::ButtonChanged(button, value, _) => {
                self.joy.apply_button_value(button, value, deadzone)
            }
            _ => false,
        }
    }

    /// Sends the current state unless the consumer is lagging behind.
    fn send_sample(&mut self) -> Result<(), DriverError> {
        match self.sample_tx.try_send(self.joy.to_sample()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Joy sample channel full, sample dropped"),
            Err(TrySendError::Closed(_)) => return Err(DriverError::ChannelClosed),
        }
        self.last_sent = Some(Instant::now());
        Ok(())
    }

    fn repeat_due(&self, now: Instant) -> bool {
        if self.active_gamepad.is_none() {
            return false;
        }
        match (self.settings.autorepeat_interval(), self.last_sent) {
            (Some(interval), Some(last)) => now.duration_since(last) >= interval,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Blocking poll loop; runs until cancelled or the receiver goes away.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<(), DriverError> {
        info!("Starting joy driver loop");
        let poll_interval: Duration = self.settings.poll_interval();

        while !cancel.is_cancelled() {
            let changed = self.poll_events();
            if changed || self.repeat_due(Instant::now()) {
                self.send_sample()?;
            }
            std::thread::sleep(poll_interval);
        }

        info!("Joy driver loop stopped");
        Ok(())
    }
}

/// Runs a [`JoyDriver`] on tokio's blocking pool
pub struct JoyDriverHandle {
    cancel: CancellationToken,
    task_handle: JoinHandle<Result<(), DriverError>>,
}

impl JoyDriverHandle {
    /// The gilrs context is created on the blocking thread, so this returns
    /// before the gamepad interface is known to be usable; initialization
    /// errors surface from [`JoyDriverHandle::stop`].
    pub fn spawn(settings: DriverSettings, sample_tx: mpsc::Sender<JoySample>) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let task_handle = tokio::task::spawn_blocking(move || {
            let mut driver = JoyDriver::create(settings, sample_tx)?.initialize();
            driver.run(&task_cancel)
        });
        info!("Joy driver started");

        Self {
            cancel,
            task_handle,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }

    pub async fn stop(self) -> Result<(), DriverError> {
        self.cancel.cancel();
        match self.task_handle.await {
            Ok(result) => result,
            Err(e) => Err(DriverError::Task(e.to_string())),
        }
    }
}
