// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=TETHERCAM_VERSION");

    // Packagers can pin the version string
    let version = std::env::var("TETHERCAM_VERSION").unwrap_or_else(|_| describe_head());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version from `git describe`, e.g. "0.1.0", "0.1.0-5-gabcdef1" or "0.1.0-dirty".
///
/// Falls back to the crate version when the source is not a git checkout.
fn describe_head() -> String {
    let fallback = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".to_string());

    let output = match Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty", "--match", "v*"])
        .output()
    {
        Ok(output) if output.status.success() => output,
        _ => return fallback,
    };

    let described = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if described.is_empty() {
        return fallback;
    }

    described
        .strip_prefix('v')
        .map(str::to_string)
        .unwrap_or(described)
}
