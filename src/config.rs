//! Configuration from YAML files named by the environment.
//!
//! Credentials never live in code. The main file carries the service URL and
//! whatever else is harmless to commit; the optional secrets file overlays
//! the values that are not, such as the API key.

use std::path::{Path, PathBuf};

use envconfig::Envconfig;
use serde::Deserialize;
use serde_yml::{Mapping, Value};
use thiserror::Error;

use crate::{api, poller};

/// Environment variables naming the configuration files.
#[derive(Envconfig)]
pub struct Environment {
    /// Main YAML configuration file.
    #[envconfig(from = "DOORSTATE_CONFIG_FILE")]
    pub config_file: PathBuf,

    /// Optional YAML overlay for values that should not live in the main
    /// file, such as the API key.
    #[envconfig(from = "DOORSTATE_SECRETS_FILE")]
    pub secrets_file: Option<PathBuf>,
}

/// Top level configuration for the agent.
#[derive(Deserialize)]
pub struct Config {
    /// Service connection details and credentials.
    pub service: api::Config,

    /// Polling behaviour. Defaults apply if the section is missing.
    #[serde(default)]
    pub poller: poller::Config,
}

/// An error loading the Config
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading the file
    #[error("Error reading file {0}: {1}")]
    File(PathBuf, std::io::Error),

    /// Error parsing the file
    #[error("Error parsing file {0}: {1}")]
    Yaml(PathBuf, serde_yml::Error),

    /// The config and secrets files disagree about the type of a value.
    #[error("Types do not match {0} != {1}")]
    InvalidTypes(String, String),
}

fn load_file(filename: &Path) -> Result<Value, Error> {
    let f = std::fs::File::open(filename).map_err(|e| Error::File(filename.to_path_buf(), e))?;
    let config: Value =
        serde_yml::from_reader(f).map_err(|e| Error::Yaml(filename.to_path_buf(), e))?;

    Ok(config)
}

/// Merge two YAML values, the second taking precedence.
///
/// # Errors
///
/// Will return an error if the types of the values do not match.
fn merge_yaml(a: Value, b: Value) -> Result<Value, Error> {
    #[allow(clippy::match_same_arms)]
    match (a, b) {
        (Value::Mapping(mut a), Value::Mapping(b)) => {
            let mut r = Mapping::new();
            for (k, vb) in b {
                let va = a.remove(k.clone()).unwrap_or(Value::Null);
                if !vb.is_null() {
                    r.insert(k.clone(), merge_yaml(va, vb)?);
                }
            }
            for (k, va) in a {
                if !va.is_null() {
                    r.insert(k, va);
                }
            }

            Ok(Value::Mapping(r))
        }
        (Value::Number(_), b @ Value::Number(_)) => Ok(b),
        (Value::String(_), b @ Value::String(_)) => Ok(b),
        (Value::Sequence(_), b @ Value::Sequence(_)) => Ok(b),
        (Value::Bool(_), b @ Value::Bool(_)) => Ok(b),
        (Value::Null, b) => Ok(b),
        (_, b @ Value::Null) => Ok(b),
        (a, b) => Err(Error::InvalidTypes(
            serde_yml::to_string(&a).unwrap_or_default(),
            serde_yml::to_string(&b).unwrap_or_default(),
        )),
    }
}

impl Environment {
    /// Load the environment from the environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `DOORSTATE_CONFIG_FILE` is not set.
    pub fn load() -> Result<Self, envconfig::Error> {
        Self::init_from_env()
    }

    /// Load and assemble the configuration files.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read, parsed, or merged.
    pub fn config(&self) -> Result<Config, Error> {
        let config = load_file(&self.config_file)?;

        let config = if let Some(secrets_file) = &self.secrets_file {
            let secrets = load_file(secrets_file)?;
            merge_yaml(config, secrets)?
        } else {
            config
        };

        let config: Config =
            serde_yml::from_value(config).map_err(|e| Error::Yaml(self.config_file.clone(), e))?;

        Ok(config)
    }
}
