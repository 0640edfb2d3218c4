use crate::report::{ComponentStatusMap, ExecReport};
use crate::ExecutorError;
use shipwright_config::BuilderConfig;

/// The collaborator that performs builds, deploys and status queries.
///
/// Every call is synchronous and may block for minutes. Implementations are
/// not required to tolerate concurrent calls; callers serialize access.
///
/// A reported failure (non-zero exit, missing kustomization) is an
/// `Ok(ExecReport)` whose status is not `Success`. `Err` is reserved for
/// faults where no report could be produced at all.
pub trait BuildExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Build a component image and push it to the registry.
    fn build_component(&self, component: &str) -> Result<ExecReport, ExecutorError>;

    /// Apply the cluster configuration for a cloud provider.
    fn deploy_provider(&self, provider: &str) -> Result<ExecReport, ExecutorError>;

    /// Image availability for one component, or for every configured one.
    fn component_status(&self, component: Option<&str>)
        -> Result<ComponentStatusMap, ExecutorError>;

    /// Deployments and services in a namespace (configured default when `None`).
    fn cluster_status(&self, namespace: Option<&str>) -> Result<ExecReport, ExecutorError>;
}

pub fn select_executor(
    name: &str,
    config: &BuilderConfig,
) -> Result<Box<dyn BuildExecutor>, ExecutorError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerExecutor::new(config.clone()))),
        "mock" => Ok(Box::new(crate::mock::MockExecutor::from_config(config))),
        other => Err(ExecutorError::Unavailable(other.to_owned())),
    }
}
