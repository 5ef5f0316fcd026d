//! Version command handler

use anyhow::{Context, Result};
use colored::*;
use grrbuild_core::domain::version::VersionInfo;
use std::path::Path;

pub fn handle_version(source_dir: &Path, json: bool) -> Result<()> {
    let version = VersionInfo::load(source_dir)
        .with_context(|| format!("Cannot read version of {}", source_dir.display()))?;

    if json {
        let out = serde_json::to_string_pretty(&version).context("Failed to serialize version")?;
        println!("{}", out);
    } else {
        println!("{}", version.package_version().bold());
    }
    Ok(())
}
