use std::fmt;
use std::process::Command;

/// A missing external tool, with how to get it.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn docker_daemon_reachable() -> bool {
    Command::new("docker")
        .args(["info", "--format", "{{.ServerVersion}}"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check the tools the docker executor shells out to.
/// An empty list means everything is in place.
pub fn check_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists("docker") {
        missing.push(MissingPrereq {
            name: "docker",
            purpose: "building and pushing component images",
            install_hint: "https://docs.docker.com/engine/install/",
        });
    } else if !docker_daemon_reachable() {
        missing.push(MissingPrereq {
            name: "docker daemon",
            purpose: "building and pushing component images",
            install_hint: "start the daemon (systemctl start docker) and check socket permissions",
        });
    }

    if !command_exists("kubectl") {
        missing.push(MissingPrereq {
            name: "kubectl",
            purpose: "applying cluster configuration and querying deployments",
            install_hint: "https://kubernetes.io/docs/tasks/tools/",
        });
    }

    missing
}

pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nThe docker executor needs these tools on PATH.");
    msg
}
