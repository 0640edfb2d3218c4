use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_FAILURE, EXIT_SUCCESS};
use serde_json::Value;
use shipwright_executor::BuildExecutor;

pub fn run(executor: &dyn BuildExecutor, provider: &str, json: bool) -> Result<u8, String> {
    let pb = if json {
        None
    } else {
        Some(spinner(&format!("deploying to {provider}...")))
    };

    let report = match executor.deploy_provider(provider) {
        Ok(r) => r,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "deploy failed");
            }
            return Err(format!("executor error while deploying to {provider}: {e}"));
        }
    };

    if let Some(ref pb) = pb {
        if report.is_success() {
            spin_ok(pb, &format!("deployed to {provider}"));
        } else {
            spin_fail(
                pb,
                &format!("deploy to {provider} failed: {}", report.failure_message()),
            );
        }
    }

    if json {
        println!("{}", json_pretty(&report)?);
    } else if let Some(output) = report.detail("kubectl_output").and_then(Value::as_str) {
        let output = output.trim();
        if !output.is_empty() {
            println!("{output}");
        }
    }

    Ok(if report.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_executor::{CallKind, MockExecutor};

    #[test]
    fn deploy_success() {
        let mock = MockExecutor::new();
        let journal = mock.journal();
        assert_eq!(run(&mock, "vultr", true).unwrap(), EXIT_SUCCESS);
        assert_eq!(journal.targets(CallKind::Deploy), vec!["vultr"]);
    }

    #[test]
    fn deploy_reported_failure() {
        let mock = MockExecutor::new().fail_deploy("aws");
        assert_eq!(run(&mock, "aws", true).unwrap(), EXIT_FAILURE);
    }

    #[test]
    fn deploy_fault() {
        let mock = MockExecutor::new().fault_deploy("gcp");
        assert!(run(&mock, "gcp", true).unwrap_err().starts_with("executor"));
    }
}
