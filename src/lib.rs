//! Client agent for a remote `doorOpener` service.
//!
//! The service exposes a small JSON API over HTTP. This crate wraps that API
//! ([`api`]), polls the read endpoint on a timer with an owned start/stop
//! lifecycle ([`poller`]), fans poll results out to subscribers ([`pipes`]),
//! and loads connection details and credentials from YAML files named by the
//! environment ([`config`]).
#![warn(missing_docs)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::use_self)]

pub mod api;
pub mod config;
pub mod pipes;
pub mod poller;

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawn a task and automatically monitor its execution.
pub fn spawn<T>(future: T) -> JoinHandle<()>
where
    T: Future + Send + 'static,
    T::Output: Send + 'static,
{
    let task = tokio::spawn(future);

    tokio::spawn(async move {
        let rc = task.await;

        match rc {
            Ok(_rc) => {
                debug!("The task terminated normally");
            }
            Err(err) => {
                error!("The task aborted with error: {err}");
                std::process::exit(1);
            }
        };
    })
}
