use crate::executor::BuildExecutor;
use crate::report::{ComponentState, ComponentStatus, ComponentStatusMap, ExecReport};
use crate::ExecutorError;
use shipwright_config::BuilderConfig;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Build,
    Deploy,
    ComponentStatus,
    ClusterStatus,
}

/// One executor call as observed by the mock: what, and when it ran.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub kind: CallKind,
    pub target: String,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Debug, Default)]
struct JournalInner {
    records: Mutex<Vec<CallRecord>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Shared log of calls made against a [`MockExecutor`].
///
/// Cloning shares the underlying log, so a test can keep a handle after the
/// executor itself has been moved behind a lock.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    inner: Arc<JournalInner>,
}

impl CallJournal {
    fn begin(&self, kind: CallKind, target: &str) -> CallScope<'_> {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        CallScope {
            journal: self,
            kind,
            target: target.to_owned(),
            started: Instant::now(),
        }
    }

    pub fn records(&self) -> Vec<CallRecord> {
        self.inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Targets of calls of one kind, in the order the calls started.
    pub fn targets(&self, kind: CallKind) -> Vec<String> {
        let mut records: Vec<_> = self
            .records()
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect();
        records.sort_by_key(|r| r.started);
        records.into_iter().map(|r| r.target).collect()
    }

    /// Highest number of calls that were ever executing at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }

    /// True if any two recorded call intervals intersect.
    pub fn has_overlap(&self) -> bool {
        let mut records = self.records();
        records.sort_by_key(|r| r.started);
        records
            .windows(2)
            .any(|pair| pair[1].started < pair[0].finished)
    }
}

/// Records the call on drop, so calls that panic are journaled too.
struct CallScope<'a> {
    journal: &'a CallJournal,
    kind: CallKind,
    target: String,
    started: Instant,
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        let record = CallRecord {
            kind: self.kind,
            target: std::mem::take(&mut self.target),
            started: self.started,
            finished: Instant::now(),
        };
        self.journal
            .inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        self.journal.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory executor with scripted outcomes.
#[derive(Default)]
pub struct MockExecutor {
    known: Option<BTreeMap<String, bool>>,
    failing_builds: HashSet<String>,
    faulty_builds: HashSet<String>,
    panicking_builds: HashSet<String>,
    failing_deploys: HashSet<String>,
    faulty_deploys: HashSet<String>,
    faulty_status: bool,
    panicking_status: bool,
    delay: Duration,
    built: Mutex<BTreeSet<String>>,
    deployed: Mutex<Vec<String>>,
    journal: CallJournal,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the mock to the components of a configuration; unknown names
    /// fail and external components are skipped, like the real executor.
    pub fn from_config(config: &BuilderConfig) -> Self {
        let known = config
            .components
            .iter()
            .map(|(name, def)| (name.clone(), def.external))
            .collect();
        Self {
            known: Some(known),
            ..Self::default()
        }
    }

    /// Builds of this component report `error`.
    #[must_use]
    pub fn fail_build(mut self, component: &str) -> Self {
        self.failing_builds.insert(component.to_owned());
        self
    }

    /// Builds of this component return `Err` instead of a report.
    #[must_use]
    pub fn fault_build(mut self, component: &str) -> Self {
        self.faulty_builds.insert(component.to_owned());
        self
    }

    /// Builds of this component panic.
    #[must_use]
    pub fn panic_build(mut self, component: &str) -> Self {
        self.panicking_builds.insert(component.to_owned());
        self
    }

    #[must_use]
    pub fn fail_deploy(mut self, provider: &str) -> Self {
        self.failing_deploys.insert(provider.to_owned());
        self
    }

    #[must_use]
    pub fn fault_deploy(mut self, provider: &str) -> Self {
        self.faulty_deploys.insert(provider.to_owned());
        self
    }

    /// Component and cluster status reads return `Err`.
    #[must_use]
    pub fn fault_status(mut self) -> Self {
        self.faulty_status = true;
        self
    }

    /// Component and cluster status reads panic.
    #[must_use]
    pub fn panic_status(mut self) -> Self {
        self.panicking_status = true;
        self
    }

    /// Every call sleeps this long while "running".
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn journal(&self) -> CallJournal {
        self.journal.clone()
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }

    fn scripted_status(&self, what: &str) -> Result<(), ExecutorError> {
        if self.panicking_status {
            panic!("mock executor: injected panic reading {what}");
        }
        if self.faulty_status {
            return Err(ExecutorError::Fault(format!(
                "mock executor: injected fault reading {what}"
            )));
        }
        Ok(())
    }

    fn built(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.built.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn mock_image(component: &str) -> String {
    format!("mock.registry/{component}:latest")
}

impl BuildExecutor for MockExecutor {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn build_component(&self, component: &str) -> Result<ExecReport, ExecutorError> {
        let _call = self.journal.begin(CallKind::Build, component);
        self.pause();

        if self.panicking_builds.contains(component) {
            panic!("mock executor: injected panic building {component}");
        }
        if self.faulty_builds.contains(component) {
            return Err(ExecutorError::Fault(format!(
                "mock executor: injected fault building {component}"
            )));
        }
        match self.known.as_ref().map(|k| k.get(component)) {
            Some(None) => {
                return Ok(ExecReport::error(format!(
                    "Component not found: {component}"
                )));
            }
            Some(Some(true)) => {
                return Ok(ExecReport::skipped(format!(
                    "{component} is an external component"
                ))
                .with("external", true));
            }
            _ => {}
        }
        if self.failing_builds.contains(component) {
            return Ok(ExecReport::process_failure(
                Some(1),
                "",
                &format!("mock build of {component} failed"),
            ));
        }

        self.built().insert(component.to_owned());
        let image = mock_image(component);
        Ok(ExecReport::success()
            .with("image", image.clone())
            .with("latest_image", image)
            .with("build_time", chrono::Utc::now().to_rfc3339()))
    }

    fn deploy_provider(&self, provider: &str) -> Result<ExecReport, ExecutorError> {
        let _call = self.journal.begin(CallKind::Deploy, provider);
        self.pause();

        if self.faulty_deploys.contains(provider) {
            return Err(ExecutorError::Fault(format!(
                "mock executor: injected fault deploying to {provider}"
            )));
        }
        if self.failing_deploys.contains(provider) {
            return Ok(ExecReport::process_failure(
                Some(1),
                "",
                &format!("mock deploy to {provider} failed"),
            ));
        }

        self.deployed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(provider.to_owned());
        Ok(ExecReport::success()
            .with("cloud_provider", provider)
            .with("deployment_time", chrono::Utc::now().to_rfc3339()))
    }

    fn component_status(
        &self,
        component: Option<&str>,
    ) -> Result<ComponentStatusMap, ExecutorError> {
        let _call = self
            .journal
            .begin(CallKind::ComponentStatus, component.unwrap_or("*"));
        self.pause();
        self.scripted_status("component status")?;

        let built = self.built();
        let state_of = |name: &str, external: bool| {
            if external {
                ComponentStatus::external()
            } else if built.contains(name) {
                ComponentStatus::image(ComponentState::Available, mock_image(name))
            } else {
                ComponentStatus::image(ComponentState::NotBuilt, mock_image(name))
            }
        };

        let mut status = ComponentStatusMap::new();
        match (component, &self.known) {
            (Some(name), Some(known)) => {
                let external = *known
                    .get(name)
                    .ok_or_else(|| ExecutorError::UnknownComponent(name.to_owned()))?;
                status.insert(name.to_owned(), state_of(name, external));
            }
            (Some(name), None) => {
                status.insert(name.to_owned(), state_of(name, false));
            }
            (None, Some(known)) => {
                for (name, external) in known {
                    status.insert(name.clone(), state_of(name, *external));
                }
            }
            (None, None) => {
                for name in built.iter() {
                    status.insert(name.clone(), state_of(name, false));
                }
            }
        }
        Ok(status)
    }

    fn cluster_status(&self, namespace: Option<&str>) -> Result<ExecReport, ExecutorError> {
        let namespace = namespace.unwrap_or("default");
        let _call = self.journal.begin(CallKind::ClusterStatus, namespace);
        self.pause();
        self.scripted_status("cluster status")?;

        let deployed = self
            .deployed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(ExecReport::success()
            .with("namespace", namespace)
            .with("deployments", deployed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ExecStatus;
    use shipwright_config::parse_config_str;

    #[test]
    fn mock_builds_succeed_by_default() {
        let mock = MockExecutor::new();
        let report = mock.build_component("api").unwrap();
        assert!(report.is_success());
        let status = mock.component_status(Some("api")).unwrap();
        assert_eq!(status["api"].status, ComponentState::Available);
    }

    #[test]
    fn scripted_failures() {
        let mock = MockExecutor::new()
            .fail_build("web")
            .fault_build("db")
            .fail_deploy("aws");
        assert_eq!(
            mock.build_component("web").unwrap().status,
            ExecStatus::Error
        );
        assert!(mock.build_component("db").is_err());
        assert!(!mock.deploy_provider("aws").unwrap().is_success());
        assert!(mock.deploy_provider("gcp").unwrap().is_success());
    }

    #[test]
    fn config_restricts_components() {
        let config = parse_config_str(
            "[components.api]\n[components.pg]\nexternal = true\n",
        )
        .unwrap();
        let mock = MockExecutor::from_config(&config);
        assert_eq!(
            mock.build_component("ghost").unwrap().status,
            ExecStatus::Error
        );
        assert_eq!(
            mock.build_component("pg").unwrap().status,
            ExecStatus::Skipped
        );
        assert!(mock.build_component("api").unwrap().is_success());

        let status = mock.component_status(None).unwrap();
        assert_eq!(status["api"].status, ComponentState::Available);
        assert_eq!(status["pg"].status, ComponentState::External);
        assert!(matches!(
            mock.component_status(Some("ghost")),
            Err(ExecutorError::UnknownComponent(_))
        ));
    }

    #[test]
    fn journal_records_calls_in_order() {
        let mock = MockExecutor::new();
        let journal = mock.journal();
        mock.build_component("a").unwrap();
        mock.build_component("b").unwrap();
        mock.deploy_provider("vultr").unwrap();
        assert_eq!(journal.len(), 3);
        assert_eq!(journal.targets(CallKind::Build), vec!["a", "b"]);
        assert_eq!(journal.targets(CallKind::Deploy), vec!["vultr"]);
        assert!(!journal.has_overlap());
        assert_eq!(journal.peak_in_flight(), 1);
    }

    #[test]
    fn journal_detects_concurrent_calls() {
        let mock = Arc::new(MockExecutor::new().with_delay(Duration::from_millis(50)));
        let journal = mock.journal();
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let m = Arc::clone(&mock);
                let b = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    b.wait();
                    m.build_component(&format!("c{i}")).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(journal.has_overlap());
        assert_eq!(journal.peak_in_flight(), 2);
    }

    #[test]
    fn panicking_call_is_still_journaled() {
        let mock = MockExecutor::new().panic_build("boom");
        let journal = mock.journal();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            mock.build_component("boom")
        }));
        assert!(result.is_err());
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.peak_in_flight(), 1);
    }

    #[test]
    fn scripted_status_faults() {
        let mock = MockExecutor::new().fault_status();
        assert!(matches!(
            mock.component_status(None),
            Err(ExecutorError::Fault(_))
        ));
        assert!(matches!(
            mock.cluster_status(None),
            Err(ExecutorError::Fault(_))
        ));
        assert!(mock.build_component("api").unwrap().is_success());

        let mock = MockExecutor::new().panic_status();
        let journal = mock.journal();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            mock.cluster_status(Some("apps"))
        }));
        assert!(result.is_err());
        assert_eq!(journal.targets(CallKind::ClusterStatus), vec!["apps"]);
    }

    #[test]
    fn cluster_status_lists_deploys() {
        let mock = MockExecutor::new();
        mock.deploy_provider("vultr").unwrap();
        let report = mock.cluster_status(Some("apps")).unwrap();
        assert!(report.is_success());
        assert_eq!(report.to_value()["deployments"][0], "vultr");
        assert_eq!(report.to_value()["namespace"], "apps");
    }
}
