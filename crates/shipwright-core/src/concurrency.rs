use shipwright_executor::BuildExecutor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Exclusive access to the build executor.
///
/// The executor is owned by the gate and can only be reached while holding
/// its mutex, so every build, deploy and status call in the process is
/// serialized. The guard is released on every exit path, unwinding included.
pub struct ExecutorGate {
    name: String,
    executor: Mutex<Box<dyn BuildExecutor>>,
}

impl ExecutorGate {
    pub fn new(executor: Box<dyn BuildExecutor>) -> Self {
        Self {
            name: executor.name().to_owned(),
            executor: Mutex::new(executor),
        }
    }

    /// Run `f` with the executor while holding the gate.
    pub fn run<T>(&self, f: impl FnOnce(&dyn BuildExecutor) -> T) -> T {
        let guard = self.lock();
        f(&**guard)
    }

    /// Poisoning from a panicked executor call is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn BuildExecutor>> {
        self.executor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn executor_name(&self) -> &str {
        &self.name
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nshutdown requested, waiting for running operations...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
