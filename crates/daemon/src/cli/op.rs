use std::path::PathBuf;

/// Shared inputs of every command
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Sync root the command operates on
    pub root: PathBuf,
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: std::fmt::Display;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}
