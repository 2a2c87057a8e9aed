//! Server configuration.
//!
//! Settings are read from environment variables first, then overridden by
//! command-line flags.
//!
//! # Environment Variables
//!
//! - `PARLEY_BIND_ADDR`: Listen address. Default: `0.0.0.0:8080`
//! - `PARLEY_UI_DIR`: Directory holding `index.html` and `static/`. Default: `ui`
//! - `PARLEY_OUTBOUND_BUFFER`: Per-connection outbound queue size. Default: `256`
//! - `PARLEY_ERROR_NOTICES`: Send error notices for bad frames. Default: `true`
//! - `PARLEY_NOTIFY_PEER_ON_DISCONNECT`: Tell the peer when a paired
//!   connection drops. Default: `false`
//! - `PARLEY_LOG_FORMAT`: `pretty` or `json`. Default: `pretty`
//!
//! # Examples
//!
//! ```bash
//! PARLEY_BIND_ADDR=127.0.0.1:9000 parley-server --notify-peer-on-disconnect
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::builder::RangedU64ValueParser;
use clap::{Parser, ValueEnum};
use parley_signal::RelayConfig;
use thiserror::Error;
use tracing::info;

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable console output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Command-line flags. Anything left unset keeps the environment value.
#[derive(Debug, Default, Parser)]
#[command(name = "parley-server", version, about = "Signaling relay for peer-to-peer session negotiation")]
pub struct Cli {
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Directory holding index.html and static/
    #[arg(long)]
    pub ui_dir: Option<PathBuf>,

    /// Per-connection outbound queue size
    #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub outbound_buffer: Option<usize>,

    /// Do not reply with error notices to malformed frames
    #[arg(long)]
    pub no_error_notices: bool,

    /// Send a leave notice to the peer when a paired connection drops
    #[arg(long)]
    pub notify_peer_on_disconnect: bool,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub ui_dir: PathBuf,
    pub log_format: LogFormat,
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ui_dir: PathBuf::from("ui"),
            log_format: LogFormat::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("PARLEY_BIND_ADDR") {
            config.bind_addr = parse_value("PARLEY_BIND_ADDR", &raw)?;
        }
        if let Some(raw) = lookup("PARLEY_UI_DIR") {
            config.ui_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("PARLEY_OUTBOUND_BUFFER") {
            let buffer: usize = parse_value("PARLEY_OUTBOUND_BUFFER", &raw)?;
            if buffer == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "PARLEY_OUTBOUND_BUFFER",
                    value: raw,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.relay.outbound_buffer = buffer;
        }
        if let Some(raw) = lookup("PARLEY_ERROR_NOTICES") {
            config.relay.error_notices = parse_bool("PARLEY_ERROR_NOTICES", &raw)?;
        }
        if let Some(raw) = lookup("PARLEY_NOTIFY_PEER_ON_DISCONNECT") {
            config.relay.notify_peer_on_disconnect =
                parse_bool("PARLEY_NOTIFY_PEER_ON_DISCONNECT", &raw)?;
        }
        if let Some(raw) = lookup("PARLEY_LOG_FORMAT") {
            config.log_format = LogFormat::from_str(&raw, true).map_err(|reason| {
                ConfigError::InvalidValue {
                    var: "PARLEY_LOG_FORMAT",
                    value: raw.clone(),
                    reason,
                }
            })?;
        }

        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(bind) = cli.bind {
            self.bind_addr = bind;
        }
        if let Some(ui_dir) = &cli.ui_dir {
            self.ui_dir = ui_dir.clone();
        }
        if let Some(buffer) = cli.outbound_buffer {
            self.relay.outbound_buffer = buffer;
        }
        if cli.no_error_notices {
            self.relay.error_notices = false;
        }
        if cli.notify_peer_on_disconnect {
            self.relay.notify_peer_on_disconnect = true;
        }
        if let Some(format) = cli.log_format {
            self.log_format = format;
        }
        self
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("Bind address: {}", self.bind_addr);
        info!("UI directory: {}", self.ui_dir.display());
        info!("Outbound buffer: {}", self.relay.outbound_buffer);
        info!(
            "Error notices: {}",
            if self.relay.error_notices { "enabled" } else { "disabled" }
        );
        info!(
            "Peer notification on disconnect: {}",
            if self.relay.notify_peer_on_disconnect {
                "enabled"
            } else {
                "disabled"
            }
        );
    }
}

fn parse_value<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.ui_dir, PathBuf::from("ui"));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.relay.outbound_buffer, 256);
        assert!(config.relay.error_notices);
        assert!(!config.relay.notify_peer_on_disconnect);
    }

    #[test]
    fn test_env_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PARLEY_BIND_ADDR", "127.0.0.1:9000"),
            ("PARLEY_UI_DIR", "/srv/parley"),
            ("PARLEY_OUTBOUND_BUFFER", "32"),
            ("PARLEY_ERROR_NOTICES", "off"),
            ("PARLEY_NOTIFY_PEER_ON_DISCONNECT", "Yes"),
            ("PARLEY_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.ui_dir, PathBuf::from("/srv/parley"));
        assert_eq!(config.relay.outbound_buffer, 32);
        assert!(!config.relay.error_notices);
        assert!(config.relay.notify_peer_on_disconnect);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_env_values() {
        assert!(ServerConfig::from_lookup(lookup(&[("PARLEY_BIND_ADDR", "nowhere")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("PARLEY_OUTBOUND_BUFFER", "0")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("PARLEY_ERROR_NOTICES", "maybe")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("PARLEY_LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_cli_overrides_env() {
        let cli = Cli::parse_from([
            "parley-server",
            "--bind",
            "127.0.0.1:7000",
            "--no-error-notices",
            "--notify-peer-on-disconnect",
            "--log-format",
            "json",
        ]);
        let config = ServerConfig::from_lookup(lookup(&[("PARLEY_BIND_ADDR", "127.0.0.1:9000")]))
            .unwrap()
            .with_cli(&cli);

        assert_eq!(config.bind_addr, "127.0.0.1:7000".parse().unwrap());
        assert!(!config.relay.error_notices);
        assert!(config.relay.notify_peer_on_disconnect);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.ui_dir, PathBuf::from("ui"));
    }

    #[test]
    fn test_cli_outbound_buffer_must_be_positive() {
        assert!(Cli::try_parse_from(["parley-server", "--outbound-buffer", "0"]).is_err());

        let cli = Cli::parse_from(["parley-server", "--outbound-buffer", "8"]);
        let config = ServerConfig::default().with_cli(&cli);
        assert_eq!(config.relay.outbound_buffer, 8);
    }
}
