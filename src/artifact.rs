//! Artifact staging from the userspace build area.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Prebuilt bootable disk image produced by the userspace build.
pub const IMAGE: &str = "image";

/// SSH key used by the fuzzing harness to reach the VM.
pub const KEY: &str = "key";

/// Files copied from the userspace build area into the output directory.
pub const ARTIFACTS: &[&str] = &[IMAGE, KEY];

/// Copy the fixed artifact set into the output directory.
///
/// Aborts on the first failing copy; remaining artifacts are not attempted.
/// Destinations are byte-for-byte copies of their sources.
pub fn copy_artifacts(userspace_dir: &Path, output_dir: &Path) -> Result<()> {
    for name in ARTIFACTS {
        let src = userspace_dir.join(name);
        let dst = output_dir.join(name);
        fs::copy(&src, &dst).map_err(|source| Error::Copy {
            src: src.clone(),
            dst: dst.clone(),
            source,
        })?;
    }
    Ok(())
}
