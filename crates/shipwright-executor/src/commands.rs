//! Argument vectors for the external tools. Kept free of side effects so the
//! exact command lines can be checked without docker or kubectl installed.

use chrono::{DateTime, Utc};
use shipwright_config::ComponentDef;
use std::path::Path;

/// Versioned tag: `{tag}-YYYYmmdd-HHMMSS`.
pub fn date_tag(tag: &str, now: DateTime<Utc>) -> String {
    format!("{tag}-{}", now.format("%Y%m%d-%H%M%S"))
}

pub fn build_command(image: &str, versioned_tag: &str, def: &ComponentDef) -> Vec<String> {
    let mut cmd = vec![
        "docker".to_owned(),
        "build".to_owned(),
        "-t".to_owned(),
        format!("{image}:{versioned_tag}"),
        "-t".to_owned(),
        format!("{image}:{}", def.tag),
    ];
    for arg in &def.build_args {
        cmd.push("--build-arg".to_owned());
        cmd.push(arg.clone());
    }
    cmd.push("-f".to_owned());
    cmd.push(def.dockerfile.clone());
    cmd.push(def.context.clone());
    cmd
}

/// The password is fed on stdin, never on the command line.
pub fn login_command(registry_url: &str, username: &str) -> Vec<String> {
    vec![
        "docker".to_owned(),
        "login".to_owned(),
        registry_url.to_owned(),
        "-u".to_owned(),
        username.to_owned(),
        "--password-stdin".to_owned(),
    ]
}

pub fn push_command(image_ref: &str) -> Vec<String> {
    vec!["docker".to_owned(), "push".to_owned(), image_ref.to_owned()]
}

pub fn inspect_command(image_ref: &str) -> Vec<String> {
    vec![
        "docker".to_owned(),
        "image".to_owned(),
        "inspect".to_owned(),
        image_ref.to_owned(),
    ]
}

pub fn apply_command(kustomize_dir: &Path) -> Vec<String> {
    vec![
        "kubectl".to_owned(),
        "apply".to_owned(),
        "-k".to_owned(),
        kustomize_dir.display().to_string(),
    ]
}

pub fn namespace_command(namespace: &str) -> Vec<String> {
    vec![
        "kubectl".to_owned(),
        "get".to_owned(),
        "namespace".to_owned(),
        namespace.to_owned(),
    ]
}

pub fn list_command(resource: &str, namespace: &str) -> Vec<String> {
    vec![
        "kubectl".to_owned(),
        "get".to_owned(),
        resource.to_owned(),
        "-n".to_owned(),
        namespace.to_owned(),
        "-o".to_owned(),
        "json".to_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_tag_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(date_tag("latest", now), "latest-20240309-070501");
    }

    #[test]
    fn build_command_includes_both_tags_and_args() {
        let def = ComponentDef {
            dockerfile: "docker/api.Dockerfile".to_owned(),
            context: "services/api".to_owned(),
            build_args: vec!["A=1".to_owned(), "B=2".to_owned()],
            ..ComponentDef::default()
        };
        let cmd = build_command("reg:5000/api", "latest-20240101-000000", &def);
        assert_eq!(
            cmd,
            vec![
                "docker",
                "build",
                "-t",
                "reg:5000/api:latest-20240101-000000",
                "-t",
                "reg:5000/api:latest",
                "--build-arg",
                "A=1",
                "--build-arg",
                "B=2",
                "-f",
                "docker/api.Dockerfile",
                "services/api",
            ]
        );
    }

    #[test]
    fn build_command_without_args() {
        let cmd = build_command("r/x", "v", &ComponentDef::default());
        assert!(!cmd.contains(&"--build-arg".to_owned()));
        assert_eq!(cmd.last().map(String::as_str), Some("."));
    }

    #[test]
    fn login_never_carries_password() {
        let cmd = login_command("reg:5000", "ci");
        assert!(cmd.contains(&"--password-stdin".to_owned()));
        assert!(!cmd.contains(&"-p".to_owned()));
    }

    #[test]
    fn kubectl_commands() {
        assert_eq!(
            apply_command(Path::new("k8s/vultr")),
            vec!["kubectl", "apply", "-k", "k8s/vultr"]
        );
        assert_eq!(
            namespace_command("apps"),
            vec!["kubectl", "get", "namespace", "apps"]
        );
        assert_eq!(
            list_command("services", "apps"),
            vec!["kubectl", "get", "services", "-n", "apps", "-o", "json"]
        );
    }

    #[test]
    fn push_and_inspect() {
        assert_eq!(push_command("r/x:1"), vec!["docker", "push", "r/x:1"]);
        assert_eq!(
            inspect_command("r/x:1"),
            vec!["docker", "image", "inspect", "r/x:1"]
        );
    }
}
