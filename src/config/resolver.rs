//! Config Resolver
//!
//! Merges three layers into one immutable [`RuntimeConfig`], highest
//! precedence last:
//!
//! 1. YAML config file (`config.yaml` next to the binary, or `-f`/`-c`)
//! 2. Environment variables, one per scalar field
//! 3. Command-line verbosity, which competes with `LOGLEVEL` only
//!
//! Locations come exclusively from the file.
//!
//! # File Policy
//!
//! - Absent file: no settings; defaults and environment still apply.
//! - Present but empty (blank, comments only, `null`, `{}`): fatal.
//! - Syntax error: fatal, with line/column when the parser knows it.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::Level;

use crate::domain::ports::{Location, Units};
use crate::error::{Error, Result};

// =============================================================================
// Defaults
// =============================================================================

/// Config file name looked up next to the executable.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Seconds between full polling cycles.
pub const DEFAULT_INTERVAL_SECS: u64 = 600;

/// Scrape endpoint port.
pub const DEFAULT_LISTEN_PORT: u16 = 9126;

/// Provider HTTP timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Environment variable names, one per scalar field.
pub mod env_keys {
    pub const INTERVAL: &str = "INTERVAL";
    pub const LOGLEVEL: &str = "LOGLEVEL";
    pub const LISTEN_PORT: &str = "LISTEN_PORT";
    pub const LISTEN_ADDRESS: &str = "LISTEN_ADDRESS";
    pub const API_KEY: &str = "API_KEY";
    pub const UNITS: &str = "UNITS";
    pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";

    pub const ALL: [&str; 7] = [
        INTERVAL,
        LOGLEVEL,
        LISTEN_PORT,
        LISTEN_ADDRESS,
        API_KEY,
        UNITS,
        REQUEST_TIMEOUT,
    ];
}

// =============================================================================
// Log Level
// =============================================================================

/// Log levels accepted in `loglevel` / `LOGLEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// Level forced by `-v` repetitions; `None` means "use the configured level".
    pub fn from_verbosity(verbosity: u8) -> Option<Self> {
        match verbosity {
            0 => None,
            1 => Some(LogLevel::Warning),
            2 => Some(LogLevel::Info),
            _ => Some(LogLevel::Debug),
        }
    }

    /// Matching tracing level.
    pub fn as_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warning => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            _ => Err(Error::invalid(
                "loglevel",
                s,
                "expected one of ERROR, WARNING, INFO, DEBUG",
            )),
        }
    }
}

// =============================================================================
// File Layer
// =============================================================================

/// Settings as written in the YAML file.
///
/// Scalars are kept as raw YAML values so that `interval: 600` and
/// `interval: "600"` resolve the same way environment strings do.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub interval: Option<Value>,
    #[serde(default)]
    pub loglevel: Option<Value>,
    #[serde(default)]
    pub listen_port: Option<Value>,
    #[serde(default)]
    pub listen_address: Option<Value>,
    #[serde(default)]
    pub api_key: Option<Value>,
    #[serde(default)]
    pub units: Option<Value>,
    #[serde(default)]
    pub request_timeout: Option<Value>,
    #[serde(default)]
    pub locations: Option<Vec<Location>>,
}

impl FileConfig {
    /// Load the file at `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::ConfigNotReadable {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        Self::parse(&content, path).map(Some)
    }

    /// Parse YAML text; `origin` is only used for diagnostics.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        if !has_content(content) {
            return Err(Error::ConfigEmpty(origin.to_path_buf()));
        }

        let document: Value =
            serde_yaml::from_str(content).map_err(|e| syntax_error(origin, e))?;

        let is_empty = match &document {
            Value::Null => true,
            Value::Mapping(map) => map.is_empty(),
            _ => false,
        };
        if is_empty {
            return Err(Error::ConfigEmpty(origin.to_path_buf()));
        }

        serde_yaml::from_value(document).map_err(|e| syntax_error(origin, e))
    }
}

/// False for documents made only of blank lines, comments and markers.
fn has_content(content: &str) -> bool {
    content.lines().map(str::trim).any(|line| {
        !(line.is_empty() || line.starts_with('#') || line == "---" || line == "...")
    })
}

fn syntax_error(origin: &Path, e: serde_yaml::Error) -> Error {
    Error::ConfigSyntax {
        path: origin.to_path_buf(),
        position: e.location().map(|loc| (loc.line(), loc.column())),
        message: e.to_string(),
    }
}

/// Render a YAML scalar as the string an environment variable would carry.
fn scalar_to_string(field: &'static str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(Error::invalid(
            field,
            format!("{:?}", other),
            "expected a scalar value",
        )),
    }
}

// =============================================================================
// Environment Layer
// =============================================================================

/// Environment overrides for the scalar fields.
///
/// A variable that is set (even to an empty string) wins over the file.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    vars: HashMap<String, String>,
}

impl EnvOverrides {
    /// Capture the recognised variables from the process environment.
    pub fn from_env() -> Self {
        let vars = env_keys::ALL
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        Self { vars }
    }

    /// Build from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

// =============================================================================
// Command-Line Layer
// =============================================================================

/// The only values the command line contributes.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Explicit config file path
    pub config_file: Option<PathBuf>,

    /// Number of `-v` flags
    pub verbosity: u8,
}

/// `config.yaml` in the directory holding the running executable.
pub fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_CONFIG_FILE)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

// =============================================================================
// Runtime Config
// =============================================================================

/// Fully resolved, validated configuration. Never mutated after startup.
#[derive(Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Time between the start of one sleep and the next cycle
    pub interval: Duration,

    /// Effective log level after verbosity
    pub log_level: LogLevel,

    /// Scrape endpoint bind address
    pub listen_address: IpAddr,

    /// Scrape endpoint port
    pub listen_port: u16,

    /// Provider API key, never empty
    pub api_key: String,

    /// Published temperature unit
    pub units: Units,

    /// Provider HTTP timeout
    pub request_timeout: Duration,

    /// Locations in configured order, never empty
    pub locations: Vec<Location>,

    /// File the settings were read from, `None` if it was absent
    pub config_file: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Socket address for the scrape endpoint.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.listen_port)
    }
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("interval", &self.interval)
            .field("log_level", &self.log_level)
            .field("listen_address", &self.listen_address)
            .field("listen_port", &self.listen_port)
            .field("api_key", &"<redacted>")
            .field("units", &self.units)
            .field("request_timeout", &self.request_timeout)
            .field("locations", &self.locations)
            .field("config_file", &self.config_file)
            .finish()
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves a [`RuntimeConfig`] from file, environment and command line.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    cli: CliOverrides,
    env: EnvOverrides,
}

impl ConfigResolver {
    pub fn new(cli: CliOverrides, env: EnvOverrides) -> Self {
        Self { cli, env }
    }

    /// Path the file layer is read from.
    pub fn config_path(&self) -> PathBuf {
        self.cli
            .config_file
            .clone()
            .unwrap_or_else(default_config_path)
    }

    /// Load the file layer and resolve.
    pub fn resolve(&self) -> Result<RuntimeConfig> {
        let path = self.config_path();
        let file = FileConfig::load(&path)?;
        let source = file.as_ref().map(|_| path);
        self.resolve_with(file, source)
    }

    /// Resolve against an already loaded file layer.
    pub fn resolve_with(
        &self,
        file: Option<FileConfig>,
        source: Option<PathBuf>,
    ) -> Result<RuntimeConfig> {
        let file = file.unwrap_or_default();

        let interval_secs = self
            .layered("interval", env_keys::INTERVAL, &file.interval)?
            .map(|raw| parse_positive("interval", &raw))
            .transpose()?
            .unwrap_or(DEFAULT_INTERVAL_SECS);

        let configured_level = self
            .layered("loglevel", env_keys::LOGLEVEL, &file.loglevel)?
            .map(|raw| raw.parse::<LogLevel>())
            .transpose()?
            .unwrap_or_default();
        let log_level = LogLevel::from_verbosity(self.cli.verbosity).unwrap_or(configured_level);

        let listen_port = self
            .layered("listen_port", env_keys::LISTEN_PORT, &file.listen_port)?
            .map(|raw| parse_port(&raw))
            .transpose()?
            .unwrap_or(DEFAULT_LISTEN_PORT);

        let listen_address = self
            .layered(
                "listen_address",
                env_keys::LISTEN_ADDRESS,
                &file.listen_address,
            )?
            .map(|raw| {
                raw.trim()
                    .parse::<IpAddr>()
                    .map_err(|e| Error::invalid("listen_address", raw.as_str(), e.to_string()))
            })
            .transpose()?
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let units = self
            .layered("units", env_keys::UNITS, &file.units)?
            .map(|raw| raw.parse::<Units>())
            .transpose()?
            .unwrap_or_default();

        let request_timeout_secs = self
            .layered(
                "request_timeout",
                env_keys::REQUEST_TIMEOUT,
                &file.request_timeout,
            )?
            .map(|raw| parse_positive("request_timeout", &raw))
            .transpose()?
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let api_key = self
            .layered("api_key", env_keys::API_KEY, &file.api_key)?
            .map(|raw| raw.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(Error::MissingApiKey)?;

        let locations = file.locations.unwrap_or_default();
        if locations.is_empty() {
            return Err(Error::NoLocations);
        }

        Ok(RuntimeConfig {
            interval: Duration::from_secs(interval_secs),
            log_level,
            listen_address,
            listen_port,
            api_key,
            units,
            request_timeout: Duration::from_secs(request_timeout_secs),
            locations,
            config_file: source,
        })
    }

    /// Environment value if set, otherwise the file value.
    fn layered(
        &self,
        field: &'static str,
        env_key: &str,
        file_value: &Option<Value>,
    ) -> Result<Option<String>> {
        if let Some(value) = self.env.get(env_key) {
            return Ok(Some(value.to_string()));
        }
        match file_value {
            Some(value) => scalar_to_string(field, value),
            None => Ok(None),
        }
    }
}

fn parse_positive(field: &'static str, raw: &str) -> Result<u64> {
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::invalid(field, raw, "expected a positive integer"))?;
    if value == 0 {
        return Err(Error::invalid(field, raw, "must be greater than zero"));
    }
    Ok(value)
}

fn parse_port(raw: &str) -> Result<u16> {
    let port: u16 = raw
        .trim()
        .parse()
        .map_err(|_| Error::invalid("listen_port", raw, "expected a port in 1-65535"))?;
    if port == 0 {
        return Err(Error::invalid("listen_port", raw, "must be greater than zero"));
    }
    Ok(port)
}
