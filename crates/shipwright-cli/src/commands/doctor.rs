use super::{EXIT_FAILURE, EXIT_SUCCESS};
use shipwright_config::BuilderConfig;
use shipwright_executor::{check_prereqs, format_missing, WorkdirLock};

pub fn run(config: &BuilderConfig, executor: &str, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    if executor == "docker" {
        check_tools(&mut checks, &mut all_pass);
    } else {
        checks.push(Check::info(
            "tools",
            &format!("Executor '{executor}' needs no external tools"),
        ));
    }
    check_config(config, &mut checks);
    check_workdir(config, &mut checks, &mut all_pass);

    print_results(&checks, all_pass, json_output)
}

fn check_tools(checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = check_prereqs();
    if missing.is_empty() {
        checks.push(Check::pass("tools", "docker and kubectl available"));
    } else {
        *all_pass = false;
        checks.push(Check::fail("tools", &format_missing(&missing)));
    }
}

fn check_config(config: &BuilderConfig, checks: &mut Vec<Check>) {
    let local = config.buildable_components().count();
    let external = config.components.len() - local;
    if config.components.is_empty() {
        checks.push(Check::warn(
            "components",
            "No components configured; `shipwright build` needs explicit names",
        ));
    } else {
        checks.push(Check::pass(
            "components",
            &format!("{local} buildable component(s), {external} external"),
        ));
    }

    if config.registry.credentials().is_some() {
        checks.push(Check::info(
            "registry",
            &format!("Registry {} (authenticated)", config.registry.url),
        ));
    } else {
        checks.push(Check::info(
            "registry",
            &format!("Registry {} (no credentials, login skipped)", config.registry.url),
        ));
    }
}

fn check_workdir(config: &BuilderConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let workdir = config.build.workdir.as_path();
    if !workdir.is_dir() {
        *all_pass = false;
        checks.push(Check::fail(
            "workdir",
            &format!("Working directory {} does not exist", workdir.display()),
        ));
        return;
    }
    checks.push(Check::pass(
        "workdir",
        &format!("Working directory {}", workdir.display()),
    ));

    let manifests = workdir.join(&config.kubernetes.manifests_dir);
    let provider_dir = manifests.join(&config.kubernetes.default_provider);
    if provider_dir.is_dir() {
        checks.push(Check::pass(
            "manifests",
            &format!("Kustomization for {} found", config.kubernetes.default_provider),
        ));
    } else {
        checks.push(Check::warn(
            "manifests",
            &format!(
                "No kustomization for default provider at {}",
                provider_dir.display()
            ),
        ));
    }

    match WorkdirLock::try_acquire(workdir) {
        Ok(Some(_)) => checks.push(Check::pass("workdir_lock", "Working directory lock is free")),
        Ok(None) => checks.push(Check::warn(
            "workdir_lock",
            "Working directory lock is held by another process",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "workdir_lock",
                &format!("Cannot check working directory lock: {e}"),
            ));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Shipwright Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
