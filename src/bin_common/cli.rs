//! Config path resolution for the binaries
//!
//! Precedence: `--config` argument, then the config's environment
//! variable, then the path shipped in `config/`.

use std::path::PathBuf;

/// Which config file a binary wants
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// `config/relay_config.yaml`, overridable by `RELAY_CONFIG_PATH`
    Relay,
    /// Exact path, no environment lookup
    Custom(String),
}

impl ConfigType {
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Relay => "config/relay_config.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    pub fn env_var_name(&self) -> &str {
        match self {
            ConfigType::Relay => "RELAY_CONFIG_PATH",
            ConfigType::Custom(_) => "CONFIG_PATH",
        }
    }
}

/// Path from the environment, falling back to the default
///
/// # Examples
/// ```
/// use vessel_tracker::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Relay);
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    if let ConfigType::Custom(path) = &config_type {
        return PathBuf::from(path);
    }
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// `--config <path>` (or `--config=<path>`) from the arguments, if present
pub fn config_path_from_args(args: &[String]) -> Option<PathBuf> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" || arg == "-c" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Process arguments without the program name
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Full precedence chain for one config type
pub fn resolve_config_path(args: &[String], config_type: ConfigType) -> PathBuf {
    config_path_from_args(args).unwrap_or_else(|| load_config_from_env(config_type))
}
