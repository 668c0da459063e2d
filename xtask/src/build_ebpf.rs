use std::{path::PathBuf, process::Command};

use anyhow::{bail, Context};
use clap::Parser;

#[derive(Debug, Parser)]
pub struct Options {
    /// Build the release profile
    #[clap(long)]
    pub release: bool,
}

/// Arguments passed to cargo for building the classifier
fn cargo_args(opts: &Options) -> Vec<&'static str> {
    let mut args = vec![
        "+nightly",
        "build",
        "--target=bpfel-unknown-none",
        "-Z",
        "build-std=core",
    ];
    if opts.release {
        args.push("--release");
    }
    args
}

pub fn build_ebpf(opts: Options) -> Result<(), anyhow::Error> {
    let dir = PathBuf::from("pktsize-ebpf");
    let status = Command::new("cargo")
        .current_dir(&dir)
        .env_remove("RUSTUP_TOOLCHAIN")
        .args(cargo_args(&opts))
        .status()
        .context("failed to run cargo")?;
    if !status.success() {
        bail!("failed to build the eBPF program: {}", status);
    }
    Ok(())
}
