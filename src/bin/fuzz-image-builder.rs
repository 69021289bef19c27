use std::path::Path;

use anyhow::{bail, Context, Result};
use fuzz_image_builder::{preflight, BuildRequest, Builder, HostRunner};

fn usage() -> &'static str {
    "Usage:\n  fuzz-image-builder build <request.toml>\n  fuzz-image-builder clean <kernel_dir> <target_arch>"
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, request] if cmd == "build" => build(Path::new(request)),
        [cmd, kernel_dir, target_arch] if cmd == "clean" => {
            clean(Path::new(kernel_dir), target_arch)
        }
        _ => bail!(usage()),
    }
}

fn build(request_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading build request '{}'", request_path.display()))?;
    let request: BuildRequest = toml::from_str(&raw)
        .with_context(|| format!("parsing build request '{}'", request_path.display()))?;

    preflight::check_host_tools()?;

    std::fs::create_dir_all(&request.output_dir).with_context(|| {
        format!(
            "creating output directory '{}'",
            request.output_dir.display()
        )
    })?;

    let runner = HostRunner;
    Builder::new(&runner)
        .build(&request)
        .with_context(|| format!("building {} kernel image", request.target_arch))
}

fn clean(kernel_dir: &Path, target_arch: &str) -> Result<()> {
    let runner = HostRunner;
    Builder::new(&runner).clean(kernel_dir, target_arch)?;
    println!("Nothing to clean: builds are always full rebuilds.");
    Ok(())
}
