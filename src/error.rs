//! Error taxonomy for the build-and-install pipeline.
//!
//! Each pipeline phase has its own variant so a caller can tell which phase
//! failed from the error value alone. Build and install failures carry the
//! combined output captured from the external command.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the kernel build-and-install pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// The kernel configuration file could not be persisted.
    #[error("failed to write kernel config to {}: {source}", .path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A make invocation (toolchain or kernel) exited non-zero or timed out.
    #[error("make {targets} failed:\n{output}")]
    Build { targets: String, output: String },

    /// An artifact copy failed. Remaining artifacts are not attempted.
    #[error("failed to copy {} -> {}: {source}", .src.display(), .dst.display())]
    Copy {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An image-splice step exited non-zero or timed out.
    #[error("error installing kernel into image ({step}):\n{output}")]
    Install { step: String, output: String },

    /// Incidental filesystem or process-spawn failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;
