//! Builds coverage-instrumented FreeBSD kernel images for VM-based fuzzing.
//!
//! The crate packages a freshly built kernel, a prebuilt bootable disk image
//! and its access key into a self-contained output directory ready for a
//! fuzzing harness:
//!
//! 1. Write the SYZKALLER kernel configuration (GENERIC + COVERAGE + KCOV)
//!    into the kernel source tree.
//! 2. Build the kernel toolchain, then the kernel, sharing one object
//!    directory under the output directory.
//! 3. Copy the `image` and `key` artifacts from the userspace build area.
//! 4. Splice the new kernel into the image's data partition: attach as a
//!    memory disk, mount p3, `make installkernel`, unmount, detach.
//!
//! All external work goes through the [`CommandRunner`] capability so the
//! sequencing can be tested without make or privileged OS utilities.
//!
//! # Example
//!
//! ```rust,ignore
//! use fuzz_image_builder::{Builder, BuildRequest, HostRunner};
//!
//! let request: BuildRequest = toml::from_str(&raw)?;
//! let runner = HostRunner;
//! Builder::new(&runner).build(&request)?;
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod install;
pub mod make;
pub mod pipeline;
pub mod preflight;
pub mod process;

pub use error::{Error, Result};
pub use pipeline::{BuildRequest, Builder, Timeouts};
pub use process::{Cmd, CmdOutput, CommandRunner, HostRunner};
