//! Runtime contract emitter

use async_trait::async_trait;
use grrbuild_core::domain::context::{BuildContext, ContextState};
use grrbuild_core::domain::contract::RuntimeContract;
use grrbuild_core::domain::stage::{StageKind, Step};
use grrbuild_core::{BuildError, Result};

use super::{Artifacts, Stage, StageIo};

/// Attaches the fixed GRR server runtime contract to the build output
#[derive(Debug, Default)]
pub struct RuntimeContractEmitter;

impl RuntimeContractEmitter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for RuntimeContractEmitter {
    fn kind(&self) -> StageKind {
        StageKind::Contract
    }

    // Sealing is a backend operation, not a command
    fn plan(&self, _ctx: &BuildContext, _artifacts: &Artifacts) -> Vec<Step> {
        Vec::new()
    }

    async fn run(
        &self,
        ctx: &mut BuildContext,
        io: &StageIo<'_>,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        ctx.expect(ContextState::Installed)?;

        let contract = RuntimeContract::grr_server();
        for directive in contract.directives() {
            io.info(StageKind::Contract, directive);
        }

        let image = io.backend.seal(ctx, &contract).map_err(|e| match e.stage() {
            Some(_) => e,
            None => BuildError::for_stage(StageKind::Contract, e.to_string(), None),
        })?;
        io.info(StageKind::Contract, format!("Sealed {}", image));

        artifacts.contract = Some(contract);
        artifacts.image = Some(image);
        ctx.advance(ContextState::Sealed)
    }
}
