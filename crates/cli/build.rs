//! Captures build metadata `AppInfo` surfaces at runtime: the commit the
//! binary was built from and the build timestamp, neither of which are
//! available via `env!(CARGO_PKG_VERSION)` alone.

fn main() {
    let commit = std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=WHATSIGNAL_GIT_COMMIT={commit}");

    let build_time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string());
    println!("cargo:rustc-env=WHATSIGNAL_BUILD_TIME={build_time}");

    println!("cargo:rerun-if-changed=.git/HEAD");
}
