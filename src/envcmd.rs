//! Environment passthrough: `satsang env up` / `satsang env down`.
//!
//! Thin wrapper over `docker compose` for deployments that run supporting
//! services (a reverse proxy, a remote embedding service) next to the
//! pipeline. The pipeline itself needs nothing beyond its SQLite file.

use anyhow::{bail, Result};
use std::process::Command;

pub fn run_env(up: bool) -> Result<()> {
    let args: &[&str] = if up {
        &["compose", "up", "-d"]
    } else {
        &["compose", "down"]
    };

    println!("+ docker {}", args.join(" "));
    let status = Command::new("docker").args(args).status()?;
    if !status.success() {
        bail!("docker compose exited with status {}", status);
    }
    Ok(())
}
