//! Configuration: command-line options layered over a TOML file.
//!
//! The file holds a `[General]` table with the same four settings the command
//! line accepts:
//!
//! ```toml
//! [General]
//! osc_ip = "127.0.0.1"
//! osc_port = 9000
//! osc_path = "/avatar/parameters/HR"
//! device_name = "Polar H10"
//! ```
//!
//! Each command-line flag, when given, replaces the file value.

use clap::Parser;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file read when `--config` is not given. A missing file is fine.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// OSC address used when neither the file nor the command line set one.
pub const DEFAULT_OSC_PATH: &str = "/avatar/parameters/HR";

/// Command-line options.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, about, version)]
pub struct Options {
    /// Path to the TOML configuration file [default: config.toml]
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Destination IP address or hostname for OSC
    #[arg(long, alias = "osc_ip", value_name = "HOST")]
    pub osc_ip: Option<String>,

    /// Destination port number for OSC
    #[arg(long, alias = "osc_port", value_name = "PORT")]
    pub osc_port: Option<u16>,

    /// OSC address to send the heart rate to
    #[arg(long, alias = "osc_path", value_name = "PATH")]
    pub osc_path: Option<String>,

    /// Name (or part of it) of the Bluetooth device to connect to
    #[arg(long, alias = "device_name", value_name = "NAME")]
    pub device_name: Option<String>,

    /// Verbose output, log every notification and publish
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// `[General]` table of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralSection {
    pub osc_ip: Option<String>,
    pub osc_port: Option<u16>,
    pub osc_path: Option<String>,
    pub device_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    #[serde(rename = "General")]
    pub general: GeneralSection,
}

/// Errors raised while resolving configuration at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("No device name configured; set device_name in the config file or pass --device-name")]
    MissingDeviceName,
    #[error("OSC path '{0}' must start with '/'")]
    InvalidOscPath(String),
}

impl FileConfig {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }
}

/// Where to send OSC messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscTarget {
    pub host: String,
    pub port: u16,
}

/// Fully resolved settings, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `None` when no destination is configured; publishing is then skipped
    pub osc_target: Option<OscTarget>,
    pub osc_path: String,
    pub device_name: String,
}

impl Settings {
    /// Load the config file named by `options` (or the default one) and merge.
    pub fn resolve(options: &Options) -> Result<Self, ConfigError> {
        let file = match &options.config {
            Some(path) => FileConfig::load(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    FileConfig::load(path)?
                } else {
                    FileConfig::default()
                }
            }
        };
        Self::merge(options, file)
    }

    /// Merge command-line options over file values; the command line wins.
    pub fn merge(options: &Options, file: FileConfig) -> Result<Self, ConfigError> {
        let general = file.general;

        let osc_ip = options
            .osc_ip
            .clone()
            .or(general.osc_ip)
            .filter(|ip| !ip.trim().is_empty());
        let osc_port = options.osc_port.or(general.osc_port);
        let osc_target = match (osc_ip, osc_port) {
            (Some(host), Some(port)) => Some(OscTarget { host, port }),
            _ => None,
        };

        let osc_path = options
            .osc_path
            .clone()
            .or(general.osc_path)
            .unwrap_or_else(|| DEFAULT_OSC_PATH.to_string());
        if !osc_path.starts_with('/') {
            return Err(ConfigError::InvalidOscPath(osc_path));
        }

        let device_name = options
            .device_name
            .clone()
            .or(general.device_name)
            .ok_or(ConfigError::MissingDeviceName)?;

        Ok(Settings {
            osc_target,
            osc_path,
            device_name,
        })
    }
}
