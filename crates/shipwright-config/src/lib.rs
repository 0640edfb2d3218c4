//! Builder configuration for shipwright.
//!
//! Describes the container registry, the Kubernetes target, the working
//! directory the builder runs in, and the set of buildable components. The
//! file format is TOML; every section has defaults so an empty file is valid.

pub mod config;

pub use config::{
    parse_config_file, parse_config_str, validate_component_name, BuildSection, BuilderConfig,
    ComponentDef, KubernetesSection, RegistrySection, ServerSection, CONFIG_ENV,
    DEFAULT_CONFIG_FILE,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid value for {var}: '{value}'")]
    EnvOverride { var: String, value: String },
}
