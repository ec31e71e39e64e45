use tracing::debug;

use super::{PricingStrategy, StrategyInput, StrategyKind, StrategyOutput};
use crate::error::PricingError;
use crate::models::{Diagnostics, FeatureSnapshot, PricingState};

/// Price drifts up from the current price in proportion to occupancy
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearStrategy;

impl LinearStrategy {
    /// price_{t+1} = price_t + α × occupancy / capacity
    pub fn raw_price(state: &PricingState, features: &FeatureSnapshot, alpha: f64) -> f64 {
        state.current_price + alpha * features.occupancy_ratio()
    }
}

impl PricingStrategy for LinearStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Linear
    }

    fn compute(&self, input: &StrategyInput<'_>) -> Result<StrategyOutput, PricingError> {
        let alpha = input.config.linear.alpha;
        let ratio = input.features.occupancy_ratio();
        let raw_price = Self::raw_price(input.state, input.features, alpha);

        let mut diagnostics = Diagnostics::new();
        diagnostics.record("occupancy_ratio", ratio);
        diagnostics.record("occupancy_drift", alpha * ratio);

        debug!(
            "Linear price: {:.4} (current: {:.4}, ratio: {:.4}, alpha: {})",
            raw_price, input.state.current_price, ratio, alpha
        );
        Ok(StrategyOutput::new(raw_price, diagnostics))
    }
}
