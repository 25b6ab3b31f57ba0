// =============================================================================
// Support / Resistance Levels: collaborator seam
// =============================================================================
//
// Levels are recomputed after a partial refresh, concurrently with the
// per-pair work. The calculator itself lives outside this service; the
// shipped implementation records the request only.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait LevelCalculator: Send + Sync {
    async fn recalculate(&self, symbols: &[String]) -> Result<()>;
}

/// Level calculator that only logs which symbols were requested.
#[derive(Debug, Default)]
pub struct LoggingLevelCalculator;

#[async_trait]
impl LevelCalculator for LoggingLevelCalculator {
    async fn recalculate(&self, symbols: &[String]) -> Result<()> {
        info!(symbols = ?symbols, "levels recalculation requested");
        Ok(())
    }
}
