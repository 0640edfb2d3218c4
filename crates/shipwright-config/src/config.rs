use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "SHIPWRIGHT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "shipwright.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuilderConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub kubernetes: KubernetesSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentDef>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    #[serde(default = "default_registry_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            username: None,
            password: None,
        }
    }
}

impl RegistrySection {
    /// Credentials are only used when both halves are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KubernetesSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_service_account")]
    pub service_account: String,
    /// Directory holding one kustomization directory per cloud provider.
    #[serde(default = "default_manifests_dir")]
    pub manifests_dir: PathBuf,
    #[serde(default = "default_provider")]
    pub default_provider: String,
}

impl Default for KubernetesSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            service_account: default_service_account(),
            manifests_dir: default_manifests_dir(),
            default_provider: default_provider(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ComponentDef {
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(default)]
    pub build_args: Vec<String>,
    /// Pulled from a public registry, never built locally.
    #[serde(default)]
    pub external: bool,
}

impl Default for ComponentDef {
    fn default() -> Self {
        Self {
            repository: None,
            tag: default_tag(),
            dockerfile: default_dockerfile(),
            context: default_context(),
            build_args: Vec::new(),
            external: false,
        }
    }
}

impl ComponentDef {
    pub fn repository_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.repository.as_deref().unwrap_or(name)
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_registry_url() -> String {
    "localhost:5000".to_owned()
}

fn default_namespace() -> String {
    "singularity-system".to_owned()
}

fn default_service_account() -> String {
    "singularity-sa".to_owned()
}

fn default_manifests_dir() -> PathBuf {
    PathBuf::from("kubernetes/cloud-providers")
}

fn default_provider() -> String {
    "vultr".to_owned()
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_tag() -> String {
    "latest".to_owned()
}

fn default_dockerfile() -> String {
    "Dockerfile".to_owned()
}

fn default_context() -> String {
    ".".to_owned()
}

pub fn parse_config_str(input: &str) -> Result<BuilderConfig, ConfigError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<BuilderConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}

pub fn validate_component_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.len() > 128 {
        return Err(ConfigError::Invalid(format!(
            "component name '{name}' must be 1-128 characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
    {
        return Err(ConfigError::Invalid(format!(
            "component name '{name}' must match [a-zA-Z0-9._-]"
        )));
    }
    Ok(())
}

impl BuilderConfig {
    /// Load the builder configuration.
    ///
    /// An explicit path (argument or `SHIPWRIGHT_CONFIG`) must exist and parse.
    /// Without one, `shipwright.toml` in the working directory is used when
    /// present and the built-in defaults otherwise. Environment overrides are
    /// applied last, then the result is validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = if let Some(path) = explicit {
            info!("loading configuration from {}", path.display());
            parse_config_file(&path)?
        } else {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                info!("loading configuration from {}", path.display());
                parse_config_file(path)?
            } else {
                info!("no {DEFAULT_CONFIG_FILE} found, using default configuration");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        debug!(
            "configuration: {} components, registry {}",
            config.components.len(),
            config.registry.url
        );
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup. Split out from
    /// [`apply_env_overrides`](Self::apply_env_overrides) so tests do not have
    /// to mutate the process environment.
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("SHIPWRIGHT_REGISTRY_URL") {
            self.registry.url = url;
        }
        if let Some(user) = lookup("SHIPWRIGHT_REGISTRY_USERNAME") {
            self.registry.username = Some(user);
        }
        if let Some(pass) = lookup("SHIPWRIGHT_REGISTRY_PASSWORD") {
            self.registry.password = Some(pass);
        }
        if let Some(port) = lookup("SHIPWRIGHT_API_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::EnvOverride {
                var: "SHIPWRIGHT_API_PORT".to_owned(),
                value: port.clone(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".to_owned()));
        }
        if self.registry.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "registry.url must not be empty".to_owned(),
            ));
        }
        if self.kubernetes.default_provider.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "kubernetes.default_provider must not be empty".to_owned(),
            ));
        }
        for name in self.components.keys() {
            validate_component_name(name)?;
        }
        Ok(())
    }

    /// Fully qualified image name (without tag) for a configured component.
    pub fn image_name(&self, component: &str) -> Option<String> {
        let def = self.components.get(component)?;
        Some(format!(
            "{}/{}",
            self.registry.url.trim_end_matches('/'),
            def.repository_or(component)
        ))
    }

    /// Components that are built locally, in configuration order.
    pub fn buildable_components(&self) -> impl Iterator<Item = (&String, &ComponentDef)> {
        self.components.iter().filter(|(_, def)| !def.external)
    }
}
