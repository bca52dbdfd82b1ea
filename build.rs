//! Build script: embeds the git hash and pre-flight-checks GPU toolkits.
//!
//! The toolkit checks run before whisper-rs-sys compiles, so a missing
//! toolkit fails with an actionable message instead of a wall of cmake
//! errors.

use std::process::Command;

fn main() {
    // Embed git short hash for version string
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if cfg!(feature = "cuda") {
        require_tool(
            "nvcc",
            &["--version"],
            "CUDA toolkit not found.\n\
             Install: https://developer.nvidia.com/cuda-downloads\n\
             Or build without CUDA: cargo build --release",
        );
    }
    if cfg!(feature = "vulkan") {
        require_tool(
            "vulkaninfo",
            &["--summary"],
            "Vulkan SDK not found.\n\
             Install: https://vulkan.lunarg.com/\n\
             Or build without Vulkan: cargo build --release",
        );
    }
    if cfg!(feature = "hipblas") {
        require_tool(
            "rocminfo",
            &[],
            "ROCm not found.\n\
             Install: https://rocm.docs.amd.com/\n\
             Or build without HipBLAS: cargo build --release",
        );
    }
    if cfg!(feature = "openblas") {
        check_openblas();
    }
}

/// Panic with `hint` unless `tool` runs successfully.
fn require_tool(tool: &str, args: &[&str], hint: &str) {
    let found = Command::new(tool)
        .args(args)
        .output()
        .is_ok_and(|out| out.status.success());
    if !found {
        panic!("\n\n`{}` not found — {}\n", tool, hint);
    }
    println!("cargo::warning={} detected", tool);
}

fn check_openblas() {
    let pkg_config_ok = Command::new("pkg-config")
        .args(["--exists", "openblas"])
        .status()
        .is_ok_and(|s| s.success());

    // pkg-config may be absent even when the library is installed
    let lib_exists = std::path::Path::new("/usr/lib/x86_64-linux-gnu/libopenblas.so").exists()
        || std::path::Path::new("/usr/lib/libopenblas.so").exists()
        || std::path::Path::new("/usr/lib64/libopenblas.so").exists();

    if !pkg_config_ok && !lib_exists {
        panic!(
            "\n\nOpenBLAS not found.\n\
             Install: sudo apt install libopenblas-dev\n\
             Or build without OpenBLAS: cargo build --release\n"
        );
    }
    println!("cargo::warning=OpenBLAS detected");
}
