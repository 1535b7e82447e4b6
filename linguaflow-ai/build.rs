//! Embeds the commit and build time logged at startup

use std::process::Command;

fn main() {
    let commit = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|describe| describe.trim().to_string())
        .filter(|describe| !describe.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    println!("cargo:rustc-env=LINGUAFLOW_COMMIT={}", commit);
    println!("cargo:rustc-env=LINGUAFLOW_BUILT_AT={}", built_at);
}
