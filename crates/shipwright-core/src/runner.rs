use crate::concurrency::ExecutorGate;
use crate::operation::{Operation, OperationId, OperationParams, Phase};
use crate::registry::OperationRegistry;
use crate::CoreError;
use serde_json::json;
use shipwright_executor::{BuildExecutor, ComponentStatusMap, ExecReport};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Returned by [`OperationRunner::submit`]. The operation's worker stays
/// parked until this handle is dropped, so whoever accepted the request can
/// answer it before any executor call begins.
#[must_use = "the operation does not start until the launch is released"]
pub struct Launch {
    id: OperationId,
    _release: mpsc::Sender<()>,
}

impl Launch {
    pub fn id(&self) -> &OperationId {
        &self.id
    }

    /// Let the worker proceed. Equivalent to dropping the handle.
    pub fn release(self) {}
}

/// Drives operations through their lifecycle, one worker thread each.
pub struct OperationRunner {
    registry: Arc<OperationRegistry>,
    gate: Arc<ExecutorGate>,
    workers: Mutex<HashMap<OperationId, JoinHandle<()>>>,
}

impl OperationRunner {
    pub fn new(executor: Box<dyn BuildExecutor>) -> Self {
        Self {
            registry: Arc::new(OperationRegistry::new()),
            gate: Arc::new(ExecutorGate::new(executor)),
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn executor_name(&self) -> &str {
        self.gate.executor_name()
    }

    pub fn get(&self, id: &OperationId) -> Result<Operation, CoreError> {
        self.registry.get(id)
    }

    pub fn count(&self) -> usize {
        self.registry.count()
    }

    /// Record a new `pending` operation and start its worker.
    ///
    /// The worker blocks until the returned [`Launch`] is dropped.
    pub fn submit(&self, params: OperationParams) -> Result<Launch, CoreError> {
        self.reap_finished();

        let kind = params.kind();
        let id = self.registry.create(params.clone());
        info!(operation = %id, %kind, "operation accepted");

        let (release_tx, release_rx) = mpsc::channel::<()>();
        let worker = Worker {
            id: id.clone(),
            params,
            registry: Arc::clone(&self.registry),
            gate: Arc::clone(&self.gate),
        };
        let spawned = thread::Builder::new()
            .name(format!("op-{}", id.short()))
            .spawn(move || worker.run(&release_rx));

        match spawned {
            Ok(handle) => {
                self.workers().insert(id.clone(), handle);
                Ok(Launch {
                    id,
                    _release: release_tx,
                })
            }
            Err(e) => {
                error!(operation = %id, "failed to spawn worker: {e}");
                settle(
                    &self.registry,
                    &id,
                    &format!("failed to start operation worker: {e}"),
                );
                Err(CoreError::Spawn(e))
            }
        }
    }

    /// Component image status, through the executor gate.
    pub fn component_status(
        &self,
        component: Option<&str>,
    ) -> Result<ComponentStatusMap, CoreError> {
        Ok(self.gate.run(|ex| ex.component_status(component))?)
    }

    /// Cluster status, through the executor gate.
    pub fn cluster_status(&self, namespace: Option<&str>) -> Result<ExecReport, CoreError> {
        Ok(self.gate.run(|ex| ex.cluster_status(namespace))?)
    }

    /// Block until the operation's worker has finished and return the final
    /// record. Must not be called while still holding its [`Launch`].
    pub fn wait(&self, id: &OperationId) -> Result<Operation, CoreError> {
        let handle = self.workers().remove(id);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.registry.get(id)
    }

    /// Block until every tracked worker has finished.
    pub fn join_all(&self) {
        let handles: Vec<_> = self.workers().drain().collect();
        if !handles.is_empty() {
            info!("waiting for {} operation worker(s)", handles.len());
        }
        for (id, handle) in handles {
            if handle.join().is_err() {
                warn!(operation = %id, "worker thread terminated abnormally");
            }
        }
    }

    /// Number of workers that have not finished yet.
    pub fn active_workers(&self) -> usize {
        self.reap_finished();
        self.workers().len()
    }

    fn reap_finished(&self) {
        let mut workers = self.workers();
        let done: Vec<OperationId> = workers
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        for id in done {
            if let Some(handle) = workers.remove(&id) {
                let _ = handle.join();
            }
        }
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<OperationId, JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Worker {
    id: OperationId,
    params: OperationParams,
    registry: Arc<OperationRegistry>,
    gate: Arc<ExecutorGate>,
}

impl Worker {
    fn run(self, release: &mpsc::Receiver<()>) {
        // Nothing is ever sent; this returns once the Launch is dropped.
        let _ = release.recv();

        let _guard = TerminalGuard {
            registry: &self.registry,
            id: &self.id,
        };
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| self.drive())) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(format!(
                "operation worker panicked: {}",
                panic_message(&*payload)
            )),
        };
        if let Some(message) = failure {
            error!(operation = %self.id, "{message}");
            settle(&self.registry, &self.id, &message);
        }
    }

    fn drive(&self) -> Result<(), CoreError> {
        self.registry.update(&self.id, Operation::start)?;
        info!(operation = %self.id, kind = %self.params.kind(), "operation running");

        match &self.params {
            OperationParams::Build { component } => {
                self.progress(Some(component), Phase::Building)?;
                let report = self.gate.run(|ex| ex.build_component(component))?;
                self.finish(&report)
            }
            OperationParams::Deploy { cloud_provider } => {
                self.progress(None, Phase::Deploying)?;
                let report = self.gate.run(|ex| ex.deploy_provider(cloud_provider))?;
                self.finish(&report)
            }
            OperationParams::BuildAndDeploy {
                components,
                cloud_provider,
            } => self.build_and_deploy(components, cloud_provider),
        }
    }

    /// Sequential builds in request order, aborting on the first failure,
    /// then a single deploy.
    fn build_and_deploy(&self, components: &[String], provider: &str) -> Result<(), CoreError> {
        if components.is_empty() {
            warn!(operation = %self.id, "no components requested, deploying only");
        }

        for component in components {
            self.progress(Some(component), Phase::Building)?;
            debug!(operation = %self.id, %component, "building");

            let report = self
                .gate
                .run(|ex| ex.build_component(component))
                .unwrap_or_else(|e| ExecReport::error(e.to_string()));
            let succeeded = report.is_success();
            let reason = report.failure_message();
            let value = report.to_value();
            self.registry.update(&self.id, |op| {
                op.record_build(component, value);
                Ok(())
            })?;

            if !succeeded {
                let error = format!("failed to build component {component}: {reason}");
                warn!(operation = %self.id, "{error}");
                return self.registry.update(&self.id, |op| op.fail(error, None));
            }
        }

        self.progress(None, Phase::Deploying)?;
        debug!(operation = %self.id, provider, "deploying");
        let report = self
            .gate
            .run(|ex| ex.deploy_provider(provider))
            .unwrap_or_else(|e| ExecReport::error(e.to_string()));
        let succeeded = report.is_success();
        let reason = report.failure_message();
        let value = report.to_value();

        self.registry.update(&self.id, |op| {
            op.deploy_result = Some(value);
            if succeeded {
                op.complete(json!({
                    "components_built": components,
                    "cloud_provider": provider,
                }))
            } else {
                op.fail(format!("failed to deploy to {provider}: {reason}"), None)
            }
        })?;

        if succeeded {
            info!(operation = %self.id, "operation completed");
        } else {
            warn!(operation = %self.id, "deploy to {provider} failed: {reason}");
        }
        Ok(())
    }

    fn progress(&self, component: Option<&str>, phase: Phase) -> Result<(), CoreError> {
        self.registry.update(&self.id, |op| {
            op.set_progress(component, phase);
            Ok(())
        })
    }

    fn finish(&self, report: &ExecReport) -> Result<(), CoreError> {
        let value = report.to_value();
        if report.is_success() {
            self.registry.update(&self.id, |op| op.complete(value))?;
            info!(operation = %self.id, "operation completed");
        } else {
            let message = report.failure_message();
            warn!(operation = %self.id, "operation failed: {message}");
            self.registry
                .update(&self.id, |op| op.fail(message, Some(value)))?;
        }
        Ok(())
    }
}

/// Fails the operation if the worker leaves it non-terminal, whatever the
/// exit path.
struct TerminalGuard<'a> {
    registry: &'a OperationRegistry,
    id: &'a OperationId,
}

impl Drop for TerminalGuard<'_> {
    fn drop(&mut self) {
        settle(
            self.registry,
            self.id,
            "operation worker exited without a result",
        );
    }
}

fn settle(registry: &OperationRegistry, id: &OperationId, message: &str) {
    match registry.update(id, |op| op.settle(message)) {
        Ok(true) => warn!(operation = %id, "operation marked failed: {message}"),
        Ok(false) => {}
        Err(e) => error!(operation = %id, "could not mark operation failed: {e}"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
