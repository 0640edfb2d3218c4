use super::{json_pretty, spin_fail, spin_ok, spin_skip, spinner, EXIT_FAILURE, EXIT_SUCCESS};
use serde_json::{json, Map, Value};
use shipwright_config::BuilderConfig;
use shipwright_core::shutdown_requested;
use shipwright_executor::{BuildExecutor, ExecStatus};
use tracing::warn;

pub fn run(
    executor: &dyn BuildExecutor,
    config: &BuilderConfig,
    components: &[String],
    json: bool,
) -> Result<u8, String> {
    let targets: Vec<String> = if components.is_empty() {
        config
            .buildable_components()
            .map(|(name, _)| name.clone())
            .collect()
    } else {
        components.to_vec()
    };
    if targets.is_empty() {
        return Err("no components to build: none given and none configured".to_owned());
    }

    let mut results = Map::new();
    let mut failed = Vec::new();

    for name in &targets {
        if shutdown_requested() {
            warn!("shutdown requested, not building remaining components");
            break;
        }
        let pb = if json {
            None
        } else {
            Some(spinner(&format!("building {name}...")))
        };

        let report = match executor.build_component(name) {
            Ok(r) => r,
            Err(e) => {
                if let Some(ref pb) = pb {
                    spin_fail(pb, &format!("{name}: {e}"));
                }
                return Err(format!("executor error while building {name}: {e}"));
            }
        };

        if let Some(ref pb) = pb {
            match report.status {
                ExecStatus::Success => {
                    let image = report
                        .detail("image")
                        .and_then(Value::as_str)
                        .unwrap_or(name.as_str());
                    spin_ok(pb, &format!("{name} built ({image})"));
                }
                ExecStatus::Skipped => {
                    spin_skip(pb, &format!("{name} skipped: {}", report.failure_message()));
                }
                ExecStatus::Error => {
                    spin_fail(pb, &format!("{name} failed: {}", report.failure_message()));
                }
            }
        }
        if report.status == ExecStatus::Error {
            failed.push(name.clone());
        }
        results.insert(name.clone(), report.to_value());
    }

    if json {
        let payload = json!({
            "results": results,
            "failed": failed,
        });
        println!("{}", json_pretty(&payload)?);
    } else if failed.is_empty() {
        println!("{} component(s) processed", results.len());
    } else {
        println!(
            "{} of {} component(s) failed: {}",
            failed.len(),
            targets.len(),
            failed.join(", ")
        );
    }

    Ok(if failed.is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_config::parse_config_str;
    use shipwright_executor::{CallKind, MockExecutor};

    const CONFIG: &str = r#"
[components.api]
[components.web]
[components.postgres]
external = true
"#;

    #[test]
    fn builds_every_local_component_by_default() {
        let config = parse_config_str(CONFIG).unwrap();
        let mock = MockExecutor::from_config(&config);
        let journal = mock.journal();
        let code = run(&mock, &config, &[], true).unwrap();
        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(journal.targets(CallKind::Build), vec!["api", "web"]);
    }

    #[test]
    fn explicit_components_in_given_order() {
        let config = parse_config_str(CONFIG).unwrap();
        let mock = MockExecutor::from_config(&config);
        let journal = mock.journal();
        let names = vec!["web".to_owned(), "postgres".to_owned(), "api".to_owned()];
        assert_eq!(run(&mock, &config, &names, true).unwrap(), EXIT_SUCCESS);
        assert_eq!(journal.targets(CallKind::Build), vec!["web", "postgres", "api"]);
    }

    #[test]
    fn failing_build_exits_non_zero_but_continues() {
        let config = parse_config_str(CONFIG).unwrap();
        let mock = MockExecutor::from_config(&config).fail_build("api");
        let journal = mock.journal();
        assert_eq!(run(&mock, &config, &[], true).unwrap(), EXIT_FAILURE);
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn executor_fault_is_an_error() {
        let config = parse_config_str(CONFIG).unwrap();
        let mock = MockExecutor::from_config(&config).fault_build("api");
        let err = run(&mock, &config, &[], true).unwrap_err();
        assert!(err.starts_with("executor"));
    }

    #[test]
    fn nothing_to_build() {
        let config = BuilderConfig::default();
        let mock = MockExecutor::new();
        assert!(run(&mock, &config, &[], true).is_err());
    }
}
