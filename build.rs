use std::process::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The server side of the contract is only used by the integration tests'
    // in-process mock.
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["proto/wirechat.proto"], &["proto"])?;

    // Try git first, fall back to GIT_SHA env var (set during Docker builds)
    let git_sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .or_else(|| std::env::var("GIT_SHA").ok())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_SHA={git_sha}");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    println!("cargo:rerun-if-changed=proto/wirechat.proto");

    Ok(())
}
