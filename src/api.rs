//! Wrappers around the `doorOpener` HTTP API.
//!
//! The read path is deliberately blind: whatever the service replies to a
//! state poll is passed through as a [`DoorState`] without interpretation.
//! The write path checks the reply status and nothing else. The admin calls
//! do parse their replies, because returning that data is their whole point.

use std::fmt::{self, Display};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Credentials sent with every request to the service.
#[derive(Deserialize, Clone)]
pub struct Credentials {
    /// Id of the actor this agent polls and unlocks.
    pub actor_id: String,
    /// Raw API key identifying the calling user.
    pub api_key: String,
}

/// Connection details for the service.
#[derive(Deserialize, Clone)]
pub struct Config {
    /// Base URL of the service, without a trailing slash.
    pub url: String,
    /// Credentials sent with every request.
    pub credentials: Credentials,
}

/// Roles a user of the service can hold.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    /// Account exists but cannot do anything.
    Deactivated,
    /// Can create users, scopes and validity windows.
    Admin,
    /// A door. Polls the service for its own state.
    Actor,
    /// Can unlock doors within scope.
    User,
    /// Guest account.
    Guest,
    /// Can query actor health.
    Maintenance,
}

impl Role {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Deactivated => "deactivated",
            Self::Admin => "admin",
            Self::Actor => "actor",
            Self::User => "user",
            Self::Guest => "guest",
            Self::Maintenance => "maintenance",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deactivated" => Ok(Self::Deactivated),
            "admin" => Ok(Self::Admin),
            "actor" => Ok(Self::Actor),
            "user" => Ok(Self::User),
            "guest" => Ok(Self::Guest),
            "maintenance" => Ok(Self::Maintenance),
            _ => Err(ParseError(s.to_string())),
        }
    }
}

/// Access modes a scope can grant.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Mode {
    /// Scope exists but grants nothing.
    Unset,
    /// May read the actor's state.
    Read,
    /// May set the actor's state.
    Write,
}

impl Mode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unset" => Ok(Self::Unset),
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            _ => Err(ParseError(s.to_string())),
        }
    }
}

/// A role or mode name the service would not recognize.
#[derive(Error, Debug)]
#[error("unknown name: {0}")]
pub struct ParseError(String);

/// One reading from the state endpoint.
///
/// The service replies with JSON like `{"state": true}` when all is well,
/// but replies are reported, not validated, so an error reply or an
/// unexpected body is a reading too.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DoorState {
    /// Status of the reply.
    pub status: StatusCode,
    /// Raw body of the reply.
    pub body: String,
}

impl Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.body)
    }
}

/// Reply from the add user endpoint.
#[derive(Deserialize, Debug)]
pub struct NewUser {
    /// Id of the new user.
    pub id: String,
    /// Raw API key of the new user. This is the only copy.
    pub api_key: String,
    /// Set if a password was stored for the user.
    pub password: Option<String>,
}

/// Reply from the regenerate key endpoint.
#[derive(Deserialize, Debug)]
pub struct NewApiKey {
    /// The caller's replacement API key. The old key no longer works.
    pub api_key: String,
}

#[derive(Deserialize, Debug)]
struct HealthReply {
    health: bool,
}

#[derive(Deserialize)]
struct MsgReply {
    msg: String,
}

#[derive(Serialize, Debug)]
struct SetStateRequest<'a> {
    #[serde(rename = "api-key")]
    api_key: &'a str,
    #[serde(rename = "actor-id")]
    actor_id: &'a str,
}

/// An error talking to the service.
#[derive(Error, Debug)]
pub enum Error {
    /// The request never completed.
    #[error("HTTP Error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The service replied with a failure status.
    #[error("Server Error: {0}")]
    ServerError(StatusCode),

    /// The service refused the request and said why.
    #[error("Rejected ({status}): {msg}")]
    Rejected {
        /// Status of the refusal.
        status: StatusCode,
        /// The `msg` field of the reply, if one could be read.
        msg: String,
    },
}

/// Read the door state once.
///
/// Every reply is a reading, whatever its status. Only a transport failure
/// is an error.
///
/// # Errors
///
/// Returns `Error::HttpError` if the request could not be sent or the body
/// could not be read.
pub async fn get_door_state(config: &Config) -> Result<DoorState, Error> {
    let url = format!("{}/api/getDoorState", config.url);

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("accept", "application/json")
        .query(&[
            ("actor-id", config.credentials.actor_id.as_str()),
            ("api-key", config.credentials.api_key.as_str()),
        ])
        .timeout(Duration::from_secs(30))
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    Ok(DoorState { status, body })
}

/// Ask the service to unlock the door.
///
/// Only the status of the reply is checked. The body is never read.
///
/// # Errors
///
/// Returns `Error::ServerError` if the service replied with a failure
/// status, or `Error::HttpError` if the request never completed.
pub async fn set_state(config: &Config) -> Result<(), Error> {
    let url = format!("{}/api/setState", config.url);
    let request = SetStateRequest {
        api_key: &config.credentials.api_key,
        actor_id: &config.credentials.actor_id,
    };

    let client = reqwest::Client::new();
    let res = client
        .post(url)
        .header("accept", "application/json")
        .header("content-type", "application/json")
        .json(&request)
        .timeout(Duration::from_secs(30))
        .send()
        .await?;

    if res.status().is_success() {
        Ok(())
    } else {
        Err(Error::ServerError(res.status()))
    }
}

/// Ask whether the actor has polled the service recently.
///
/// `timeout` is the maximum age in seconds of the actor's last poll for the
/// actor to still count as healthy. Needs a maintenance API key.
///
/// # Errors
///
/// Returns `Error::Rejected` if the service refused the request.
pub async fn actor_health(config: &Config, timeout: u32) -> Result<bool, Error> {
    let url = format!("{}/api/actorHealth", config.url);

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("accept", "application/json")
        .query(&[
            ("actor-id", config.credentials.actor_id.clone()),
            ("api-key", config.credentials.api_key.clone()),
            ("timeout", timeout.to_string()),
        ])
        .timeout(Duration::from_secs(30))
        .send()
        .await?;

    if response.status().is_success() {
        let reply: HealthReply = response.json().await?;
        Ok(reply.health)
    } else {
        Err(rejected(response).await)
    }
}

/// Create a new user. Needs an admin API key.
///
/// The reply carries the only copy of the new user's API key.
///
/// # Errors
///
/// Returns `Error::Rejected` if the service refused the request.
pub async fn add_user(
    config: &Config,
    name: &str,
    role: Role,
    password: Option<&str>,
) -> Result<NewUser, Error> {
    let url = format!("{}/api/addUser", config.url);

    let mut query = vec![
        ("api-key", config.credentials.api_key.clone()),
        ("name", name.to_string()),
        ("role", role.to_string()),
    ];
    if let Some(password) = password {
        query.push(("password", password.to_string()));
    }

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("accept", "application/json")
        .query(&query)
        .timeout(Duration::from_secs(30))
        .send()
        .await?;

    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(rejected(response).await)
    }
}

/// Grant a user access to an actor. Needs an admin API key.
///
/// # Errors
///
/// Returns `Error::Rejected` if the service refused the request.
pub async fn add_scope(
    config: &Config,
    user_id: &str,
    actor_id: &str,
    mode: Mode,
) -> Result<(), Error> {
    let url = format!("{}/api/addScope", config.url);

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("accept", "application/json")
        .query(&[
            ("api-key", config.credentials.api_key.clone()),
            ("user-id", user_id.to_string()),
            ("actor-id", actor_id.to_string()),
            ("mode", mode.to_string()),
        ])
        .timeout(Duration::from_secs(30))
        .send()
        .await?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(rejected(response).await)
    }
}

/// Add a validity window for a user. Needs an admin API key.
///
/// An open `start` means valid since forever, an open `end` means valid
/// until forever. A user with no window at all is never valid.
///
/// # Errors
///
/// Returns `Error::Rejected` if the service refused the request.
pub async fn add_valid(
    config: &Config,
    user_id: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), Error> {
    let url = format!("{}/api/addValid", config.url);

    let mut query = vec![
        ("api-key", config.credentials.api_key.clone()),
        ("user-id", user_id.to_string()),
    ];
    if let Some(start) = start {
        query.push(("start", start.to_rfc3339()));
    }
    if let Some(end) = end {
        query.push(("end", end.to_rfc3339()));
    }

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("accept", "application/json")
        .query(&query)
        .timeout(Duration::from_secs(30))
        .send()
        .await?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(rejected(response).await)
    }
}

/// Replace the caller's API key with a fresh one.
///
/// The old key stops working the moment this succeeds.
///
/// # Errors
///
/// Returns `Error::Rejected` if the service refused the request.
pub async fn regenerate_api_key(config: &Config) -> Result<NewApiKey, Error> {
    let url = format!("{}/api/regenerateApiKey", config.url);

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("accept", "application/json")
        .query(&[("api-key", config.credentials.api_key.as_str())])
        .timeout(Duration::from_secs(30))
        .send()
        .await?;

    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(rejected(response).await)
    }
}

async fn rejected(response: reqwest::Response) -> Error {
    let status = response.status();
    let msg = response
        .text()
        .await
        .ok()
        .and_then(|body| serde_json::from_str::<MsgReply>(&body).ok())
        .map_or_else(|| "no message".to_string(), |reply| reply.msg);
    Error::Rejected { status, msg }
}
