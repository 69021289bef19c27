//! Shared make invocation for the toolchain and kernel builds.
//!
//! Both builds run the same way (`MAKEOBJDIRPREFIX` pointed at a shared
//! object directory, `-C <kernel_dir>`, `-j <ncpu>`) and differ only in
//! their targets. The toolchain build must complete before the kernel build
//! so the kernel picks up the freshly built tools from the object directory.

use std::path::Path;
use std::time::Duration;

use crate::config::KERNEL_CONF_NAME;
use crate::error::{Error, Result};
use crate::process::{Cmd, CommandRunner};

/// Environment variable make uses to relocate build products.
pub const OBJDIR_ENV: &str = "MAKEOBJDIRPREFIX";

/// Number of build jobs: one per available processor, with a warned
/// fallback when the host count cannot be determined.
pub fn build_jobs() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            eprintln!("  [WARN] Could not detect CPU count ({}), using 4 jobs", e);
            4
        }
    }
}

/// Construct the make invocation shared by the toolchain and kernel builds.
pub fn make_cmd(kernel_dir: &Path, obj_dir: &Path, timeout: Duration, targets: &[&str]) -> Cmd {
    Cmd::new("make")
        .env(OBJDIR_ENV, obj_dir.display().to_string())
        .arg("-C")
        .arg_path(kernel_dir)
        .arg("-j")
        .arg(build_jobs().to_string())
        .args(targets.iter().copied())
        .current_dir(kernel_dir)
        .timeout(timeout)
}

/// Run make against the kernel source tree.
pub fn run_make(
    runner: &dyn CommandRunner,
    kernel_dir: &Path,
    obj_dir: &Path,
    timeout: Duration,
    targets: &[&str],
) -> Result<()> {
    let out = runner.run(&make_cmd(kernel_dir, obj_dir, timeout, targets))?;
    if !out.success {
        return Err(Error::Build {
            targets: targets.join(" "),
            output: out.output,
        });
    }
    Ok(())
}

/// Build the kernel toolchain into the shared object directory.
pub fn build_toolchain(
    runner: &dyn CommandRunner,
    kernel_dir: &Path,
    obj_dir: &Path,
    timeout: Duration,
) -> Result<()> {
    run_make(runner, kernel_dir, obj_dir, timeout, &["kernel-toolchain"])
}

/// Build the kernel using the generated SYZKALLER configuration.
pub fn build_kernel(
    runner: &dyn CommandRunner,
    kernel_dir: &Path,
    obj_dir: &Path,
    timeout: Duration,
) -> Result<()> {
    let kernconf = format!("KERNCONF={}", KERNEL_CONF_NAME);
    run_make(runner, kernel_dir, obj_dir, timeout, &["buildkernel", &kernconf])
}
