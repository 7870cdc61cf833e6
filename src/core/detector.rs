//! Signal detector capability

use async_trait::async_trait;
use crate::error::DetectorError;
use crate::types::{Claim, SubsystemId, TurnContext};

/// A pluggable detector that may bid to lead a turn.
///
/// Detectors are stateless with respect to the turn: everything they need
/// is in the utterance and the context. Returning `Ok(None)` means "no bid".
#[async_trait]
pub trait SignalDetector: Send + Sync {
    /// Subsystem this detector speaks for
    fn id(&self) -> SubsystemId;

    /// Evaluate an utterance
    async fn detect(&self, utterance: &str, ctx: &TurnContext) -> Result<Option<Claim>, DetectorError>;

    /// Catastrophic detectors run first and short-circuit collection
    fn is_catastrophic(&self) -> bool {
        self.id().is_catastrophic()
    }
}
