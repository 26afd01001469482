//! Periodic polling of the door state.
//!
//! The poller issues one read per tick and reports every outcome to its
//! subscribers. It keeps going after failed polls. Polling only ends when
//! [`Poller::stop`] is called, when the optional deadline passes, or when
//! the [`Poller`] is dropped.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::select;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::api;
use crate::pipes::{self, Subscription};
use crate::spawn;

/// Polling behaviour.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct Config {
    /// Milliseconds between polls.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Stop polling this many milliseconds after start. `None` polls until
    /// stopped.
    #[serde(default)]
    pub stop_after_ms: Option<u64>,
}

const fn default_interval_ms() -> u64 {
    2200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            stop_after_ms: None,
        }
    }
}

/// One poll outcome, as seen by subscribers.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Event {
    /// The service replied.
    State(api::DoorState),
    /// The request never completed.
    Failed(String),
}

/// An error starting the poller.
#[derive(Error, Debug)]
pub enum Error {
    /// The polling interval cannot be zero.
    #[error("interval_ms must be non-zero")]
    ZeroInterval,
}

/// Owns the repeating state poll.
///
/// The first poll happens one full interval after [`Poller::start`]. A
/// failed poll is reported like any other outcome and the next tick happens
/// regardless; the poller never gives up on its own.
pub struct Poller {
    events: pipes::Receiver<Event>,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Start polling in a background task.
    ///
    /// # Errors
    ///
    /// Returns `Error::ZeroInterval` if `interval_ms` is zero.
    pub fn start(service: api::Config, config: Config) -> Result<Self, Error> {
        if config.interval_ms == 0 {
            return Err(Error::ZeroInterval);
        }

        let (tx, events) = pipes::create_pipe("door_state");
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = spawn(run(config, service, tx, stop_rx));
        Ok(Self {
            events,
            stop_tx,
            handle,
        })
    }

    /// Subscribe to poll outcomes.
    pub async fn subscribe(&self) -> Subscription<Event> {
        self.events.subscribe().await
    }

    /// Has the poll task ended without [`Poller::stop`] being called?
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop polling and wait for the poll task to end.
    ///
    /// A poll already in flight finishes first. No polls are issued after
    /// this returns.
    pub async fn stop(self) {
        if self.stop_tx.send(()).is_err() {
            debug!("Poll task already finished");
        }
        if let Err(err) = self.handle.await {
            error!("The poll task aborted with error: {err}");
        }
    }
}

async fn run(
    config: Config,
    service: api::Config,
    tx: pipes::Sender<Event>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let period = Duration::from_millis(config.interval_ms);
    let deadline = config
        .stop_after_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));

    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = &mut stop_rx => {
                debug!("Polling stopped");
                break;
            }
            Some(()) = maybe_sleep_until(deadline) => {
                info!("Polling deadline reached");
                break;
            }
            _ = ticks.tick() => {
                match api::get_door_state(&service).await {
                    Ok(state) => {
                        info!("Door state: {state}");
                        tx.try_send(Event::State(state));
                    }
                    Err(err) => {
                        error!("Failed to get door state: {err}");
                        tx.try_send(Event::Failed(err.to_string()));
                    }
                }
            }
        }
    }
}

async fn maybe_sleep_until(instant: Option<Instant>) -> Option<()> {
    if let Some(instant) = instant {
        sleep_until(instant).await;
        Some(())
    } else {
        None
    }
}
