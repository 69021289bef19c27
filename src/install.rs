//! Splicing the freshly built kernel into the disk image.
//!
//! The copied image is exposed as a memory-backed block device via
//! `mdconfig`, its data partition (p3) is mounted at a temporary mount
//! point, and `make installkernel` is pointed at that tree through DESTDIR.
//! Teardown (unmount, detach) is owned by a scoped [`MountSession`] guard,
//! so a failure mid-splice does not leave the device attached or the
//! filesystem mounted.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::artifact::IMAGE;
use crate::config::KERNEL_CONF_NAME;
use crate::error::{Error, Result};
use crate::make::OBJDIR_ENV;
use crate::process::{Cmd, CmdOutput, CommandRunner};

/// Installs the built kernel into the data partition of
/// `<output_dir>/image`.
pub struct ImageInstaller<'a> {
    runner: &'a dyn CommandRunner,
    timeout: Duration,
}

impl<'a> ImageInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner, timeout: Duration) -> Self {
        ImageInstaller { runner, timeout }
    }

    /// Attach, mount, install, unmount, detach, in that order.
    ///
    /// The object directory is pinned to `<output_dir>/obj` so installkernel
    /// picks up the artifacts of the preceding build.
    pub fn install(&self, kernel_dir: &Path, output_dir: &Path) -> Result<()> {
        let mut session = MountSession::attach(self.runner, output_dir, self.timeout)?;
        session.mount()?;
        session.install_kernel(kernel_dir)?;
        session.finish()
    }
}

/// An attached memory disk and, once mounted, its data partition.
///
/// `Drop` unmounts and detaches best-effort so every exit path releases the
/// host resources; the success path goes through [`MountSession::finish`],
/// which surfaces teardown errors instead of swallowing them.
struct MountSession<'a> {
    runner: &'a dyn CommandRunner,
    output_dir: PathBuf,
    timeout: Duration,
    /// Device id assigned by mdconfig, e.g. "md0".
    device: String,
    mount_point: TempDir,
    mounted: bool,
    attached: bool,
}

impl<'a> MountSession<'a> {
    /// Attach `<output_dir>/image` as a memory-backed block device and
    /// capture the assigned device id.
    fn attach(
        runner: &'a dyn CommandRunner,
        output_dir: &Path,
        timeout: Duration,
    ) -> Result<Self> {
        let out = runner.run(
            &Cmd::new("sudo")
                .args(["mdconfig", "-a", "-t", "vnode", IMAGE])
                .current_dir(output_dir)
                .timeout(timeout),
        )?;
        if !out.success {
            return Err(step_failed("mdconfig -a", out));
        }

        // mdconfig prints the assigned device, e.g. "md0".
        let device = out.output.trim().to_string();
        let unit_ok = device
            .strip_prefix("md")
            .is_some_and(|u| !u.is_empty() && u.bytes().all(|b| b.is_ascii_digit()));
        if !unit_ok {
            return Err(Error::Install {
                step: "mdconfig -a".to_string(),
                output: format!("unexpected device id {device:?}"),
            });
        }

        let mount_point = TempDir::new()?;
        Ok(MountSession {
            runner,
            output_dir: output_dir.to_path_buf(),
            timeout,
            device,
            mount_point,
            mounted: false,
            attached: true,
        })
    }

    /// Mount the device's third partition, the data partition of the image.
    fn mount(&mut self) -> Result<()> {
        let partition = format!("/dev/{}p3", self.device);
        let out = self.run(
            Cmd::new("sudo")
                .arg("mount")
                .arg(partition)
                .arg_path(self.mount_point.path()),
        )?;
        if !out.success {
            return Err(step_failed("mount", out));
        }
        self.mounted = true;
        Ok(())
    }

    /// Run `make installkernel` with DESTDIR pointed at the mounted tree.
    ///
    /// The environment override is passed as a leading `VAR=value` argument
    /// to sudo so it survives sudo's environment reset.
    fn install_kernel(&self, kernel_dir: &Path) -> Result<()> {
        let obj_dir = self.output_dir.join("obj");
        let out = self.run(
            Cmd::new("sudo")
                .arg(format!("{}={}", OBJDIR_ENV, obj_dir.display()))
                .args(["make", "-C"])
                .arg_path(kernel_dir)
                .arg("installkernel")
                .arg(format!("KERNCONF={}", KERNEL_CONF_NAME))
                .arg(format!("DESTDIR={}", self.mount_point.path().display())),
        )?;
        if !out.success {
            return Err(step_failed("installkernel", out));
        }
        Ok(())
    }

    /// Explicit teardown for the success path.
    fn finish(mut self) -> Result<()> {
        if self.mounted {
            let out = self.run(Cmd::new("sudo").arg("umount").arg_path(self.mount_point.path()))?;
            if !out.success {
                return Err(step_failed("umount", out));
            }
            self.mounted = false;
        }
        if self.attached {
            let out = self.run(self.detach_cmd())?;
            if !out.success {
                return Err(step_failed("mdconfig -d", out));
            }
            self.attached = false;
        }
        Ok(())
    }

    fn detach_cmd(&self) -> Cmd {
        let unit = self.device.trim_start_matches("md").to_string();
        Cmd::new("sudo").args(["mdconfig", "-d", "-u"]).arg(unit)
    }

    fn run(&self, cmd: Cmd) -> io::Result<CmdOutput> {
        self.runner
            .run(&cmd.current_dir(&self.output_dir).timeout(self.timeout))
    }
}

impl Drop for MountSession<'_> {
    fn drop(&mut self) {
        if self.mounted {
            match self.run(Cmd::new("sudo").arg("umount").arg_path(self.mount_point.path())) {
                Ok(out) if out.success => self.mounted = false,
                _ => eprintln!(
                    "  [WARN] failed to unmount {}",
                    self.mount_point.path().display()
                ),
            }
        }
        if self.attached {
            match self.run(self.detach_cmd()) {
                Ok(out) if out.success => self.attached = false,
                _ => eprintln!("  [WARN] failed to detach {}", self.device),
            }
        }
    }
}

fn step_failed(step: &str, out: CmdOutput) -> Error {
    Error::Install {
        step: step.to_string(),
        output: out.output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::RecordingRunner;
    use tempfile::TempDir;

    fn install(runner: &RecordingRunner) -> Result<()> {
        let kernel_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        ImageInstaller::new(runner, Duration::from_secs(600))
            .install(kernel_dir.path(), output_dir.path())
    }

    #[test]
    fn test_success_runs_steps_in_order() {
        let runner = RecordingRunner::new();
        runner.push_success("md1\n");

        install(&runner).unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 5);

        assert_eq!(calls[0].program, "sudo");
        assert_eq!(calls[0].args[..5], ["mdconfig", "-a", "-t", "vnode", "image"]);

        assert_eq!(calls[1].args[0], "mount");
        assert_eq!(calls[1].args[1], "/dev/md1p3");

        assert!(calls[2].args[0].starts_with("MAKEOBJDIRPREFIX="));
        assert!(calls[2].args[0].ends_with("/obj"));
        assert!(calls[2].args.contains(&"installkernel".to_string()));
        assert!(calls[2].args.contains(&"KERNCONF=SYZKALLER".to_string()));
        assert!(calls[2].args.iter().any(|a| a.starts_with("DESTDIR=")));

        assert_eq!(calls[3].args[0], "umount");
        assert_eq!(calls[4].args[..4], ["mdconfig", "-d", "-u", "1"]);
    }

    #[test]
    fn test_failed_install_still_tears_down() {
        let runner = RecordingRunner::new();
        runner.push_success("md0\n"); // attach
        runner.push_success(""); // mount
        runner.push_failure("installkernel: No target"); // install

        let err = install(&runner).unwrap_err();

        match err {
            Error::Install { step, output } => {
                assert_eq!(step, "installkernel");
                assert!(output.contains("No target"));
            }
            other => panic!("expected Install, got {other:?}"),
        }

        // Drop still ran umount and detach after the failure.
        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[3].args[0], "umount");
        assert_eq!(calls[4].args[..3], ["mdconfig", "-d", "-u"]);
    }

    #[test]
    fn test_failed_mount_detaches_without_umount() {
        let runner = RecordingRunner::new();
        runner.push_success("md2\n"); // attach
        runner.push_failure("mount: /dev/md2p3: Invalid fstype"); // mount

        install(&runner).unwrap_err();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].args[..4], ["mdconfig", "-d", "-u", "2"]);
    }

    #[test]
    fn test_unparsable_device_id_is_install_error() {
        let runner = RecordingRunner::new();
        runner.push_success("mdconfig: nonsense\n");

        let err = install(&runner).unwrap_err();

        match err {
            Error::Install { step, .. } => assert_eq!(step, "mdconfig -a"),
            other => panic!("expected Install, got {other:?}"),
        }
        assert_eq!(runner.call_count(), 1);
    }

    #[test]
    fn test_attach_timeout_carries_output() {
        let runner = RecordingRunner::new();
        runner.push_timeout("partial mdconfig output");

        let err = install(&runner).unwrap_err();

        match err {
            Error::Install { output, .. } => assert!(output.contains("partial mdconfig output")),
            other => panic!("expected Install, got {other:?}"),
        }
    }
}
