//! Contract command handler

use anyhow::{Context, Result};
use clap::ValueEnum;
use grrbuild_core::domain::contract::RuntimeContract;

/// Output formats of `grrbuild contract`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContractFormat {
    /// The contract as serialized by grrbuild
    Json,
    /// Dockerfile directives
    Dockerfile,
    /// OCI image `config` object
    Oci,
}

pub fn handle_contract(format: ContractFormat) -> Result<()> {
    println!("{}", render(&RuntimeContract::grr_server(), format)?);
    Ok(())
}

fn render(contract: &RuntimeContract, format: ContractFormat) -> Result<String> {
    let text = match format {
        ContractFormat::Json => {
            serde_json::to_string_pretty(contract).context("Failed to serialize contract")?
        }
        ContractFormat::Dockerfile => contract.to_dockerfile().trim_end().to_string(),
        ContractFormat::Oci => serde_json::to_string_pretty(&contract.to_image_config())
            .context("Failed to serialize image config")?,
    };
    Ok(text)
}
