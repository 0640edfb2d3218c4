use crate::commands::{
    apply_command, build_command, date_tag, inspect_command, list_command, login_command,
    namespace_command, push_command,
};
use crate::executor::BuildExecutor;
use crate::lock::WorkdirLock;
use crate::report::{ComponentState, ComponentStatus, ComponentStatusMap, ExecReport};
use crate::ExecutorError;
use serde_json::{json, Value};
use shipwright_config::BuilderConfig;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::{debug, error, info};

/// Executor driving the `docker` and `kubectl` command-line tools.
pub struct DockerExecutor {
    config: BuilderConfig,
    docker: String,
    kubectl: String,
}

impl DockerExecutor {
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            docker: "docker".to_owned(),
            kubectl: "kubectl".to_owned(),
        }
    }

    /// Substitute the programs invoked for `docker` and `kubectl`.
    #[must_use]
    pub fn with_programs(mut self, docker: &str, kubectl: &str) -> Self {
        self.docker = docker.to_owned();
        self.kubectl = kubectl.to_owned();
        self
    }

    fn workdir(&self) -> &Path {
        &self.config.build.workdir
    }

    fn program<'a>(&'a self, name: &'a str) -> &'a str {
        match name {
            "docker" => &self.docker,
            "kubectl" => &self.kubectl,
            other => other,
        }
    }

    fn run(&self, argv: &[String], stdin: Option<&str>) -> Result<Output, ExecutorError> {
        let Some((first, args)) = argv.split_first() else {
            return Err(ExecutorError::Fault("empty command".to_owned()));
        };
        let program = self.program(first);
        debug!("running: {program} {}", args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(self.workdir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = cmd.spawn().map_err(|source| ExecutorError::Spawn {
            program: program.to_owned(),
            source,
        })?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            if let Err(e) = pipe.write_all(input.as_bytes()) {
                drop(pipe);
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        }
        Ok(child.wait_with_output()?)
    }

    fn push_image(&self, image_ref: &str, login_failure: Option<&ExecReport>) -> Value {
        if let Some(failure) = login_failure {
            return failure.to_value();
        }
        info!("pushing image {image_ref}");
        match self.run(&push_command(image_ref), None) {
            Ok(out) if out.status.success() => {
                info!("pushed image {image_ref}");
                ExecReport::success().with("image", image_ref).to_value()
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                error!("failed to push image {image_ref}: {}", stderr.trim());
                ExecReport::process_failure(
                    out.status.code(),
                    &String::from_utf8_lossy(&out.stdout),
                    &stderr,
                )
                .to_value()
            }
            Err(e) => {
                error!("error pushing image {image_ref}: {e}");
                ExecReport::error(e.to_string()).to_value()
            }
        }
    }

    fn registry_login(&self) -> Result<(), ExecReport> {
        let Some((username, password)) = self.config.registry.credentials() else {
            return Ok(());
        };
        let argv = login_command(&self.config.registry.url, username);
        match self.run(&argv, Some(password)) {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => {
                error!(
                    "failed to login to registry: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                Err(ExecReport::error("Registry login failed"))
            }
            Err(e) => {
                error!("failed to login to registry: {e}");
                Err(ExecReport::error(format!("Registry login failed: {e}")))
            }
        }
    }

    fn kustomize_dir(&self, provider: &str) -> PathBuf {
        self.config.kubernetes.manifests_dir.join(provider)
    }
}

fn is_valid_provider(provider: &str) -> bool {
    !provider.is_empty()
        && provider != "."
        && provider != ".."
        && provider
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

fn parse_kubectl_json(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned()))
}

impl BuildExecutor for DockerExecutor {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn build_component(&self, component: &str) -> Result<ExecReport, ExecutorError> {
        let Some(def) = self.config.components.get(component) else {
            error!("component not found: {component}");
            return Ok(ExecReport::error(format!(
                "Component not found: {component}"
            )));
        };
        if def.external {
            info!("skipping build for external component: {component}");
            return Ok(ExecReport::skipped(format!(
                "{component} is an external component"
            ))
            .with("external", true));
        }

        let _lock = WorkdirLock::acquire(self.workdir())?;

        let image = self
            .config
            .image_name(component)
            .ok_or_else(|| ExecutorError::UnknownComponent(component.to_owned()))?;
        let versioned = date_tag(&def.tag, chrono::Utc::now());
        let versioned_ref = format!("{image}:{versioned}");
        let latest_ref = format!("{image}:{}", def.tag);

        info!("building image {versioned_ref}");
        let out = self.run(&build_command(&image, &versioned, def), None)?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            error!("failed to build {component}: {}", stderr.trim());
            return Ok(ExecReport::process_failure(
                out.status.code(),
                &String::from_utf8_lossy(&out.stdout),
                &stderr,
            ));
        }
        info!("built {component}");

        let login_failure = self.registry_login().err();
        let push_versioned = self.push_image(&versioned_ref, login_failure.as_ref());
        let push_latest = self.push_image(&latest_ref, login_failure.as_ref());

        Ok(ExecReport::success()
            .with("image", versioned_ref)
            .with("latest_image", latest_ref)
            .with("build_time", chrono::Utc::now().to_rfc3339())
            .with(
                "push_results",
                json!({ "versioned": push_versioned, "latest": push_latest }),
            ))
    }

    fn deploy_provider(&self, provider: &str) -> Result<ExecReport, ExecutorError> {
        info!("deploying to kubernetes on {provider}");
        if !is_valid_provider(provider) {
            return Ok(ExecReport::error(format!(
                "Invalid cloud provider: {provider}"
            )));
        }

        let _lock = WorkdirLock::acquire(self.workdir())?;

        let kustomize = self.kustomize_dir(provider);
        if !self.workdir().join(&kustomize).is_dir() {
            error!("kustomize path not found: {}", kustomize.display());
            return Ok(ExecReport::error(format!(
                "Kustomize path not found: {}",
                kustomize.display()
            )));
        }

        let out = self.run(&apply_command(&kustomize), None)?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            error!("failed to deploy to kubernetes: {}", stderr.trim());
            return Ok(ExecReport::process_failure(
                out.status.code(),
                &String::from_utf8_lossy(&out.stdout),
                &stderr,
            ));
        }

        info!("deployed to kubernetes on {provider}");
        Ok(ExecReport::success()
            .with("cloud_provider", provider)
            .with("deployment_time", chrono::Utc::now().to_rfc3339())
            .with(
                "kubectl_output",
                String::from_utf8_lossy(&out.stdout).into_owned(),
            ))
    }

    fn component_status(
        &self,
        component: Option<&str>,
    ) -> Result<ComponentStatusMap, ExecutorError> {
        let selected: Vec<&String> = match component {
            Some(name) => {
                let (key, _) = self
                    .config
                    .components
                    .get_key_value(name)
                    .ok_or_else(|| ExecutorError::UnknownComponent(name.to_owned()))?;
                vec![key]
            }
            None => self.config.components.keys().collect(),
        };

        let _lock = WorkdirLock::acquire(self.workdir())?;

        let mut status = ComponentStatusMap::new();
        for name in selected {
            let def = &self.config.components[name];
            if def.external {
                status.insert(name.clone(), ComponentStatus::external());
                continue;
            }
            let image = self
                .config
                .image_name(name)
                .ok_or_else(|| ExecutorError::UnknownComponent(name.clone()))?;
            let image_ref = format!("{image}:{}", def.tag);
            let out = self.run(&inspect_command(&image_ref), None)?;
            let state = if out.status.success() {
                ComponentState::Available
            } else {
                ComponentState::NotBuilt
            };
            status.insert(name.clone(), ComponentStatus::image(state, image_ref));
        }
        Ok(status)
    }

    fn cluster_status(&self, namespace: Option<&str>) -> Result<ExecReport, ExecutorError> {
        let namespace = namespace.unwrap_or(&self.config.kubernetes.namespace);

        let _lock = WorkdirLock::acquire(self.workdir())?;

        let ns = self.run(&namespace_command(namespace), None)?;
        if !ns.status.success() {
            error!("namespace not found: {namespace}");
            return Ok(ExecReport::error(format!("Namespace not found: {namespace}")));
        }

        let mut listings = Vec::with_capacity(2);
        for resource in ["deployments", "services"] {
            let out = self.run(&list_command(resource, namespace), None)?;
            if !out.status.success() {
                let stderr = String::from_utf8_lossy(&out.stderr);
                error!("failed to get {resource}: {}", stderr.trim());
                return Ok(ExecReport::error(format!("Failed to get {resource}"))
                    .with("returncode", out.status.code())
                    .with("stderr", stderr.into_owned()));
            }
            listings.push(parse_kubectl_json(&out.stdout));
        }
        let services = listings.pop().unwrap_or(Value::Null);
        let deployments = listings.pop().unwrap_or(Value::Null);

        Ok(ExecReport::success()
            .with("namespace", namespace)
            .with("deployments", deployments)
            .with("services", services))
    }
}
