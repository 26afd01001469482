//! Command line agent for a remote `doorOpener` service.

#![warn(missing_docs)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use doorstate::api::{self, Mode, Role};
use doorstate::config::{Config, Environment};
use doorstate::poller::Poller;

/// Agent talking to a remote `doorOpener` service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the door state until interrupted.
    Watch,

    /// Read the door state once and print the reply.
    GetState,

    /// Ask the service to unlock the door.
    SetState,

    /// Ask whether the actor has polled recently. Needs a maintenance key.
    ActorHealth {
        /// Maximum age of the actor's last poll, in seconds.
        #[arg(long)]
        timeout: u32,
    },

    /// Create a user. Needs an admin key.
    AddUser {
        /// Name of the new user.
        #[arg(long)]
        name: String,

        /// Role of the new user.
        #[arg(long)]
        role: Role,

        /// Password for the new user.
        #[arg(long)]
        password: Option<String>,
    },

    /// Grant a user access to an actor. Needs an admin key.
    AddScope {
        /// Id of the user being granted access.
        #[arg(long)]
        user_id: String,

        /// Id of the actor being accessed.
        #[arg(long)]
        actor_id: String,

        /// What the scope allows.
        #[arg(long)]
        mode: Mode,
    },

    /// Add a validity window for a user. Needs an admin key.
    AddValid {
        /// Id of the user the window applies to.
        #[arg(long)]
        user_id: String,

        /// Start of the window, RFC 3339. Open if omitted.
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// End of the window, RFC 3339. Open if omitted.
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },

    /// Swap the configured API key for a fresh one.
    RegenerateApiKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    color_backtrace::install();

    let args = Args::parse();

    let env = Environment::load()?;
    let config = env.config()?;

    match args.command {
        Command::Watch => watch(config).await?,
        Command::GetState => {
            let state = api::get_door_state(&config.service).await?;
            println!("{state}");
        }
        Command::SetState => set_state(&config.service).await?,
        Command::ActorHealth { timeout } => {
            let healthy = api::actor_health(&config.service, timeout).await?;
            println!("healthy: {healthy}");
        }
        Command::AddUser {
            name,
            role,
            password,
        } => {
            let user = api::add_user(&config.service, &name, role, password.as_deref()).await?;
            println!("id: {}", user.id);
            println!("api-key: {}", user.api_key);
            if let Some(password) = user.password {
                println!("password: {password}");
            }
        }
        Command::AddScope {
            user_id,
            actor_id,
            mode,
        } => {
            api::add_scope(&config.service, &user_id, &actor_id, mode).await?;
            println!("scope added");
        }
        Command::AddValid {
            user_id,
            start,
            end,
        } => {
            api::add_valid(&config.service, &user_id, start, end).await?;
            println!("validity window added");
        }
        Command::RegenerateApiKey => {
            let new_key = api::regenerate_api_key(&config.service).await?;
            println!("api-key: {}", new_key.api_key);
            println!("The old key no longer works. Update the secrets file now.");
        }
    }

    Ok(())
}

/// Run the poller until interrupted or it reaches its deadline.
async fn watch(config: Config) -> Result<()> {
    info!("Watching door state every {} ms", config.poller.interval_ms);

    let poller = Poller::start(config.service, config.poller)?;
    let mut events = poller.subscribe().await;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Interrupted");
                break;
            }
            event = events.recv() => {
                // Readings are logged by the poller itself.
                if event.is_err() {
                    break;
                }
            }
        }
    }

    poller.stop().await;
    Ok(())
}

/// Send one unlock command and log the outcome.
async fn set_state(service: &api::Config) -> Result<()> {
    match api::set_state(service).await {
        Ok(()) => {
            info!("success");
            Ok(())
        }
        Err(err) => {
            error!("error");
            Err(err.into())
        }
    }
}
