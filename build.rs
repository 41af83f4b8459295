use std::process::Command;

fn git(args: &[&str]) -> Option<std::process::Output> {
    Command::new("git").args(args).output().ok()
}

/// Short commit hash, suffixed `-dirty` for uncommitted changes
fn build_version() -> String {
    let Some(head) = git(&["rev-parse", "--short", "HEAD"]).filter(|o| o.status.success()) else {
        return "unknown".to_string();
    };
    let hash = String::from_utf8_lossy(&head.stdout).trim().to_string();
    let dirty = git(&["diff", "--quiet"]).is_some_and(|o| !o.status.success());
    if dirty { format!("{hash}-dirty") } else { hash }
}

fn main() {
    // Reported by GET /health and the startup log line
    println!("cargo:rustc-env=GIT_HASH={}", build_version());
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
