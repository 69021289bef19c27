//! The build pipeline: config, toolchain, kernel, artifacts, image splice.
//!
//! Strictly sequential: no phase starts before the previous one returned
//! successfully, and the first failure aborts the rest. Shared host
//! resources (object directory, attached device, mount point) are not
//! locked here; callers must not run two builds against the same kernel
//! source tree at once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::artifact;
use crate::config;
use crate::error::Result;
use crate::install::ImageInstaller;
use crate::make;
use crate::process::CommandRunner;

/// Everything a single build needs. Constructed by the caller (or loaded
/// from a TOML request file) and consumed once per build.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildRequest {
    /// Target architecture, e.g. "amd64". Selects the config path inside
    /// the kernel source tree.
    pub target_arch: String,
    /// VM type the image will run under. Carried for the fuzzing harness;
    /// the build itself does not branch on it.
    #[serde(default)]
    pub vm_type: String,
    /// Kernel source tree (a FreeBSD src checkout).
    pub kernel_dir: PathBuf,
    /// Output directory receiving obj/, image and key.
    pub output_dir: PathBuf,
    /// Compiler identifier, carried for the harness.
    #[serde(default)]
    pub compiler: String,
    /// Userspace build area holding the prebuilt image and key artifacts.
    pub userspace_dir: PathBuf,
    /// Kernel command-line file, carried for the harness.
    #[serde(default)]
    pub cmdline_file: Option<PathBuf>,
    /// Sysctl file, carried for the harness.
    #[serde(default)]
    pub sysctl_file: Option<PathBuf>,
    /// Kernel configuration override, written verbatim. `None` selects the
    /// built-in coverage-instrumented default.
    #[serde(default, deserialize_with = "opt_string_as_bytes")]
    pub kernel_config: Option<Vec<u8>>,
}

fn opt_string_as_bytes<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(String::into_bytes))
}

/// Hard limits on external commands. Explicit configuration values, not
/// hidden module state.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Toolchain and kernel builds; a full world build takes hours.
    pub build: Duration,
    /// Image-splice steps (attach, mount, installkernel, unmount, detach).
    pub install: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            build: Duration::from_secs(3 * 60 * 60),
            install: Duration::from_secs(10 * 60),
        }
    }
}

/// Sequences the pipeline phases over a [`CommandRunner`].
pub struct Builder<'a> {
    runner: &'a dyn CommandRunner,
    timeouts: Timeouts,
}

impl<'a> Builder<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Builder::with_timeouts(runner, Timeouts::default())
    }

    pub fn with_timeouts(runner: &'a dyn CommandRunner, timeouts: Timeouts) -> Self {
        Builder { runner, timeouts }
    }

    /// Run the full pipeline. The first failing phase aborts the rest and
    /// its error identifies the phase; host-level side effects of completed
    /// phases (files written, obj/ contents) persist.
    pub fn build(&self, req: &BuildRequest) -> Result<()> {
        println!("=== Building {} kernel image ===", req.target_arch);

        println!("  Writing kernel config...");
        config::write_kernel_config(&req.kernel_dir, &req.target_arch, req.kernel_config.as_deref())?;

        let obj_dir = req.output_dir.join("obj");
        println!("  Building kernel toolchain...");
        make::build_toolchain(self.runner, &req.kernel_dir, &obj_dir, self.timeouts.build)?;

        println!("  Building kernel...");
        make::build_kernel(self.runner, &req.kernel_dir, &obj_dir, self.timeouts.build)?;

        println!("  Copying image and key...");
        artifact::copy_artifacts(&req.userspace_dir, &req.output_dir)?;

        println!("  Installing kernel into image...");
        ImageInstaller::new(self.runner, self.timeouts.install)
            .install(&req.kernel_dir, &req.output_dir)?;

        println!("=== Build complete: {} ===", req.output_dir.display());
        Ok(())
    }

    /// Builds are always full rebuilds, so there is nothing to clean.
    pub fn clean(&self, _kernel_dir: &Path, _target_arch: &str) -> Result<()> {
        Ok(())
    }
}
