//! Configuration
//!
//! Layered runtime configuration: YAML file, then environment, then the
//! verbosity flag. See [`ConfigResolver`].

mod resolver;

pub use resolver::{
    default_config_path, env_keys, CliOverrides, ConfigResolver, EnvOverrides, FileConfig,
    LogLevel, RuntimeConfig, DEFAULT_CONFIG_FILE, DEFAULT_INTERVAL_SECS, DEFAULT_LISTEN_PORT,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
