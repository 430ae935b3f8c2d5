//! Build metadata shown by `docrecon --version`.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs/heads");
    println!("cargo:rerun-if-env-changed=DOCRECON_BUILD_COMMIT");

    // Packagers building from a tarball have no .git; let them pass the commit.
    let commit = env::var("DOCRECON_BUILD_COMMIT")
        .ok()
        .filter(|c| !c.trim().is_empty())
        .or_else(short_head)
        .unwrap_or_else(|| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=DOCRECON_COMMIT={}", commit.trim());
    println!("cargo:rustc-env=DOCRECON_PROFILE={profile}");
    println!("cargo:rustc-env=DOCRECON_TARGET={target}");
}

fn short_head() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
}
