//! Kernel configuration generation.
//!
//! The configuration is written into the kernel source tree at
//! `<kernel_dir>/sys/<target_arch>/conf/SYZKALLER`. Callers may supply their
//! own bytes; otherwise the built-in default is used, which extends GENERIC
//! with the coverage options the fuzzer needs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Fixed name of the kernel configuration inside the source tree.
pub const KERNEL_CONF_NAME: &str = "SYZKALLER";

/// Default kernel configuration: GENERIC plus coverage instrumentation.
/// Written verbatim, leading newline and tab layout included.
pub const DEFAULT_KERNEL_CONFIG: &str =
    "\ninclude \"./GENERIC\"\n\nident\t\tSYZKALLER\noptions \tCOVERAGE\noptions \tKCOV\n";

/// Path of the configuration file for the given source tree and architecture.
pub fn kernel_config_path(kernel_dir: &Path, target_arch: &str) -> PathBuf {
    kernel_dir
        .join("sys")
        .join(target_arch)
        .join("conf")
        .join(KERNEL_CONF_NAME)
}

/// Write the kernel configuration into the source tree.
///
/// `config` bytes are written exactly as supplied; `None` selects
/// [`DEFAULT_KERNEL_CONFIG`]. A pre-existing file is overwritten with no
/// backup. The `sys/<arch>/conf` layout is owned by the kernel source tree,
/// so missing parents are an error rather than something to create.
pub fn write_kernel_config(
    kernel_dir: &Path,
    target_arch: &str,
    config: Option<&[u8]>,
) -> Result<PathBuf> {
    let path = kernel_config_path(kernel_dir, target_arch);
    let bytes = config.unwrap_or(DEFAULT_KERNEL_CONFIG.as_bytes());
    fs::write(&path, bytes).map_err(|source| Error::ConfigWrite {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
