//! Server Configuration
//!
//! Parsed from command-line flags. Parsing never exits the process; `main`
//! decides what to do with a [`CliAction`] or a [`ConfigError`].

use crate::protocol::ParserConfig;
use crate::storage::{ExpiryConfig, DEFAULT_SWEEP_INTERVAL};
use std::time::Duration;
use thiserror::Error;

/// Errors from command-line parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Runtime configuration for the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Time between expiry sweeps
    pub sweep_interval: Duration,
    /// Accept inline (space separated) requests
    pub inline_commands: bool,
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            inline_commands: false,
            log_level: "info".to_string(),
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(Config),
    Help,
    Version,
}

impl Config {
    /// Parses flags, not including the program name.
    pub fn parse<I>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = next_value(&mut args, &arg)?;
                }
                "--port" | "-p" => {
                    let value = next_value(&mut args, &arg)?;
                    config.port = value.parse().map_err(|_| invalid(&arg, &value))?;
                }
                "--sweep-interval" => {
                    let value = next_value(&mut args, &arg)?;
                    let ms: u64 = value.parse().map_err(|_| invalid(&arg, &value))?;
                    if ms == 0 {
                        return Err(invalid(&arg, &value));
                    }
                    config.sweep_interval = Duration::from_millis(ms);
                }
                "--inline" => config.inline_commands = true,
                "--log-level" => {
                    config.log_level = next_value(&mut args, &arg)?;
                }
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(CliAction::Run(config))
    }

    /// Parses the current process arguments.
    pub fn from_env() -> Result<CliAction, ConfigError> {
        Self::parse(std::env::args().skip(1))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            allow_inline: self.inline_commands,
        }
    }

    pub fn expiry_config(&self) -> ExpiryConfig {
        ExpiryConfig {
            interval: self.sweep_interval,
        }
    }
}

fn next_value<I>(args: &mut I, flag: &str) -> Result<String, ConfigError>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn invalid(flag: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    }
}

pub const HELP: &str = r#"
FlintKV - in-memory key-value server

USAGE:
    flintkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>           Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>           Port to listen on (default: 6379)
        --sweep-interval <MS>   Milliseconds between expiry sweeps (default: 100)
        --inline                Also accept inline commands (e.g. from telnet)
        --log-level <LEVEL>     Default log filter (default: info, RUST_LOG wins)
    -v, --version               Print version information
        --help                  Print this help message

COMMANDS:
    PING [message]
    ECHO message
    SET key value [PX milliseconds]
    GET key
"#;
