use super::{colorize_state, json_pretty, resource_names, EXIT_FAILURE, EXIT_SUCCESS};
use serde_json::{json, Value};
use shipwright_executor::BuildExecutor;

pub fn run(
    executor: &dyn BuildExecutor,
    namespace: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let components = executor
        .component_status(None)
        .map_err(|e| format!("executor error while reading component status: {e}"))?;
    let cluster = executor
        .cluster_status(namespace)
        .map_err(|e| format!("executor error while reading cluster status: {e}"))?;

    if json {
        let payload = json!({
            "components": components,
            "cluster": cluster,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("COMPONENT            STATUS       IMAGE");
        for (name, status) in &components {
            let state = status.status.to_string();
            // pad before coloring, escape codes would break the alignment
            let padded = format!("{state:<12}");
            println!(
                "{name:<20} {} {}",
                padded.replace(&state, &colorize_state(&state)),
                status
                    .image
                    .as_deref()
                    .or(status.message.as_deref())
                    .unwrap_or("-")
            );
        }
        if components.is_empty() {
            println!("(no components configured)");
        }

        println!();
        let ns = cluster
            .detail("namespace")
            .and_then(Value::as_str)
            .unwrap_or("?");
        if cluster.is_success() {
            println!("cluster: namespace {ns}");
            for resource in ["deployments", "services"] {
                if let Some(listing) = cluster.detail(resource) {
                    let names = resource_names(listing);
                    let names = if names.is_empty() {
                        "-".to_owned()
                    } else {
                        names.join(", ")
                    };
                    println!("  {resource}: {names}");
                }
            }
        } else {
            println!(
                "cluster: {} ({})",
                colorize_state("error"),
                cluster.failure_message()
            );
        }
    }

    Ok(if cluster.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_config::parse_config_str;
    use shipwright_executor::MockExecutor;

    #[test]
    fn status_with_configured_components() {
        let config =
            parse_config_str("[components.api]\n[components.db]\nexternal = true\n").unwrap();
        let mock = MockExecutor::from_config(&config);
        assert_eq!(run(&mock, Some("apps"), false).unwrap(), EXIT_SUCCESS);
        assert_eq!(run(&mock, None, true).unwrap(), EXIT_SUCCESS);
    }
}
