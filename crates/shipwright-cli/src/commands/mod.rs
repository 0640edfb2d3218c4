pub mod build;
pub mod completions;
pub mod deploy;
pub mod doctor;
pub mod man_pages;
pub mod status;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_EXECUTOR_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_skip(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("- {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "available" | "success" => Style::new().green().apply_to(state).to_string(),
        "not_built" | "skipped" => Style::new().yellow().apply_to(state).to_string(),
        "external" => Style::new().dim().apply_to(state).to_string(),
        "error" => Style::new().red().bold().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

/// Names of the resources in a cluster listing: either a plain array of
/// names or a `kubectl -o json` list (`items[].metadata.name`).
pub fn resource_names(listing: &Value) -> Vec<String> {
    if let Some(items) = listing.as_array() {
        return items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect();
    }
    listing
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.pointer("/metadata/name").and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_pretty_serializes_object() {
        let val = json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn colorize_known_states() {
        for state in ["available", "not_built", "external", "error", "success"] {
            assert!(colorize_state(state).contains(state));
        }
    }

    #[test]
    fn colorize_state_unknown() {
        assert_eq!(colorize_state("unknown"), "unknown");
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_CONFIG_ERROR);
        assert_ne!(EXIT_CONFIG_ERROR, EXIT_EXECUTOR_ERROR);
    }

    #[test]
    fn resource_names_from_kubectl_list() {
        let listing = json!({
            "kind": "List",
            "items": [
                {"metadata": {"name": "api"}},
                {"metadata": {"name": "web"}},
                {"spec": {}}
            ]
        });
        assert_eq!(resource_names(&listing), vec!["api", "web"]);
    }

    #[test]
    fn resource_names_from_plain_array() {
        assert_eq!(resource_names(&json!(["vultr"])), vec!["vultr"]);
        assert!(resource_names(&json!("raw kubectl text")).is_empty());
    }

    #[test]
    fn spinners_finish() {
        spin_ok(&spinner("a"), "done");
        spin_skip(&spinner("b"), "skipped");
        spin_fail(&spinner("c"), "failed");
    }
}
