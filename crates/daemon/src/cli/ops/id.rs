use clap::Args;

use common::peer::PeerId;
use peerdrive_daemon::state::{AppState, StateError};

/// Print this node's id, the value peers pass to `--peer`
#[derive(Args, Debug, Clone)]
pub struct Id;

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Id {
    type Error = IdError;
    type Output = PeerId;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.root.clone())?;
        Ok(PeerId::from(state.load_key()?.public()))
    }
}
