//! Broadcast pipes carrying values from a single producer to many subscribers.
//!
//! A pipe is a small actor task sitting between a [`Sender`] and any number of
//! [`Subscription`]s. Unlike a raw broadcast channel, the pipe closes down as
//! soon as the producer goes away, so subscribers can observe the end of the
//! stream.

use thiserror::Error;
use tokio::select;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error};

use crate::spawn;

/// Size of all pipes.
pub const PIPE_SIZE: usize = 10;

/// Something went wrong in Receiver.
#[derive(Error, Debug)]
pub enum RecvError {
    /// The pipe was closed.
    #[error("The pipe was closed")]
    Closed,
}

enum SendMessage<T> {
    Set(T),
}

enum ReceiveMessage<T> {
    Subscribe(oneshot::Sender<broadcast::Receiver<T>>),
}

/// Send a value to a pipe.
#[derive(Clone)]
pub struct Sender<T> {
    name: String,
    tx: mpsc::Sender<SendMessage<T>>,
}

impl<T: Send> Sender<T> {
    /// Send data down the pipe or drop it if the buffer is full.
    pub fn try_send(&self, data: T) {
        let msg = SendMessage::Set(data);
        if let Err(err) = self.tx.try_send(msg) {
            error!("{}: send failed: {err}", self.name);
        }
    }
}

/// Receive values from a pipe.
#[derive(Debug, Clone)]
pub struct Receiver<T> {
    name: String,
    tx: mpsc::Sender<ReceiveMessage<T>>,
}

impl<T> Receiver<T>
where
    T: Send + Clone,
{
    /// Subscribe to this pipe.
    ///
    /// Returns an already closed subscription if the pipe is closed.
    pub async fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = oneshot::channel();
        let msg = ReceiveMessage::Subscribe(tx);
        if let Err(err) = self.tx.send(msg).await {
            debug!("{}: subscribe/send failed: {err}", self.name);
            return Subscription::null();
        };
        rx.await.map_or_else(
            |_| {
                debug!("{}: subscribe/await failed", self.name);
                Subscription::null()
            },
            |rx| Subscription { rx },
        )
    }
}

/// A subscription to values from a pipe.
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
}

impl<T> Subscription<T>
where
    T: Clone,
{
    /// Create a null subscription that is already closed.
    fn null() -> Self {
        let (tx, rx) = broadcast::channel(1);
        drop(tx);
        Self { rx }
    }

    /// Wait for the next value from the pipe.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Closed` if the pipe is closed.
    pub async fn recv(&mut self) -> Result<T, RecvError> {
        loop {
            match self.rx.recv().await {
                Ok(v) => return Ok(v),
                Err(err) => match err {
                    broadcast::error::RecvError::Closed => return Err(RecvError::Closed),
                    broadcast::error::RecvError::Lagged(_) => {
                        error!("recv failed: The pipe was lagged");
                    }
                },
            }
        }
    }

    /// Get the next value but don't wait for it. Returns `None` if there is no value.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Closed` if the pipe is closed.
    pub fn try_recv(&mut self) -> Result<Option<T>, RecvError> {
        loop {
            match self.rx.try_recv() {
                Ok(v) => return Ok(Some(v)),
                Err(err) => match err {
                    broadcast::error::TryRecvError::Closed => return Err(RecvError::Closed),
                    broadcast::error::TryRecvError::Empty => return Ok(None),
                    broadcast::error::TryRecvError::Lagged(_) => {
                        error!("try_recv failed: The pipe was lagged");
                    }
                },
            }
        }
    }
}

async fn try_receive<T: Send>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<Option<T>> {
    match rx {
        Some(rx) => Some(rx.recv().await),
        None => None,
    }
}

/// Create a pipe that forwards every message to all subscribers.
#[must_use]
pub fn create_pipe<T>(name: impl Into<String>) -> (Sender<T>, Receiver<T>)
where
    T: Clone + Send + 'static,
{
    let (send_tx, mut send_rx) = mpsc::channel::<SendMessage<T>>(PIPE_SIZE);
    let (receive_tx, receive_rx) = mpsc::channel::<ReceiveMessage<T>>(PIPE_SIZE);
    let (out_tx, out_rx) = broadcast::channel::<T>(PIPE_SIZE);

    drop(out_rx);

    let name = name.into();

    let sender: Sender<T> = Sender {
        tx: send_tx,
        name: name.clone(),
    };
    let receiver: Receiver<T> = Receiver {
        tx: receive_tx,
        name: name.clone(),
    };

    spawn(async move {
        let name = name;
        let mut receive_rx = Some(receive_rx);

        loop {
            select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(SendMessage::Set(data)) => {
                            if let Err(_err) = out_tx.send(data) {
                                // It is not an error if there are no subscribers.
                            }
                        }
                        None => {
                            debug!("create_pipe({name}): source closed");
                            break;
                        }
                    }
                }
                Some(msg) = try_receive(&mut receive_rx) => {
                    match msg {
                        Some(ReceiveMessage::Subscribe(tx)) => {
                            let rx = out_tx.subscribe();
                            if tx.send(rx).is_err() {
                                error!("create_pipe({name}): subscribe send failed");
                            };
                        }
                        None => {
                            debug!("create_pipe({name}): command channel closed");
                            receive_rx = None;
                        }
                    }
                }
            }

            if receive_rx.is_none() && out_tx.receiver_count() == 0 {
                debug!("create_pipe({name}): receiver closed and all subscriptions closed");
                break;
            }
        }
    });

    (sender, receiver)
}
