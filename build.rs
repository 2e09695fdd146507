use std::env;
use std::process::Command;

fn main() {
    let version = Command::new("git")
        .args(["describe", "--tags"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|version| !version.is_empty())
        .or_else(|| env::var("BUILD_VERSION").ok())
        .unwrap_or_else(|| env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| ">unknown<".to_string()));
    println!("cargo:rustc-env=BUILD_VERSION={}", version);

    println!(
        "cargo:rustc-env=PROJ_WEB_DIR={}/web",
        env::var("CARGO_MANIFEST_DIR").unwrap(),
    );
    println!("cargo:rerun-if-changed=web");

    generate_build_info();
}

// uses the 'built' crate to generate a built.rs file with a bunch of build information. We then
// include this file in the app module.
fn generate_build_info() {
    built::write_built_file().expect("Failed to acquire build-time information");
}
