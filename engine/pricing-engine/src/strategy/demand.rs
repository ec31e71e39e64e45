use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PricingStrategy, StrategyInput, StrategyKind, StrategyOutput};
use crate::config::DemandWeights;
use crate::error::{ConfigurationError, PricingError};
use crate::models::{ComputationWarning, Diagnostics, FeatureSnapshot};

/// Aggregates five weighted signals into a demand score and prices off the base
#[derive(Debug, Clone, Copy, Default)]
pub struct DemandStrategy;

/// Each weighted term of the raw demand score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandBreakdown {
    /// α × occupancy ratio
    pub occupancy: f64,
    /// β × queue length
    pub queue: f64,
    /// −γ × traffic level
    pub traffic: f64,
    /// δ when the day is special, else 0
    pub special_day: f64,
    /// ε × vehicle type weight
    pub vehicle_type: f64,
}

impl DemandBreakdown {
    pub fn from_features(features: &FeatureSnapshot, weights: &DemandWeights) -> Self {
        Self {
            occupancy: weights.occupancy_alpha * features.occupancy_ratio(),
            queue: weights.queue_beta * features.queue_length as f64,
            traffic: -weights.traffic_gamma * features.traffic_level,
            special_day: if features.is_special_day { weights.special_day_delta } else { 0.0 },
            vehicle_type: weights.vehicle_epsilon * features.vehicle_type_weight,
        }
    }

    /// Raw demand D
    pub fn total(&self) -> f64 {
        self.occupancy + self.queue + self.traffic + self.special_day + self.vehicle_type
    }

    fn record(&self, diagnostics: &mut Diagnostics) {
        diagnostics.record("occupancy", self.occupancy);
        diagnostics.record("queue", self.queue);
        diagnostics.record("traffic", self.traffic);
        diagnostics.record("special_day", self.special_day);
        diagnostics.record("vehicle_type", self.vehicle_type);
    }
}

/// Map raw demand onto [0, 1] using the fixed reference range
pub fn normalize_demand(raw: f64, min: f64, max: f64) -> Result<f64, ConfigurationError> {
    if !(max > min) {
        return Err(ConfigurationError::DegenerateDemandRange { min, max });
    }
    Ok(((raw - min) / (max - min)).clamp(0.0, 1.0))
}

impl DemandStrategy {
    /// Raw price for the given base: base × (1 + λ × N)
    pub fn price_from_base(
        base_price: f64,
        features: &FeatureSnapshot,
        weights: &DemandWeights,
    ) -> Result<StrategyOutput, PricingError> {
        let breakdown = DemandBreakdown::from_features(features, weights);
        let raw_demand = breakdown.total();
        let normalized = normalize_demand(raw_demand, weights.demand_min, weights.demand_max)?;
        let multiplier = 1.0 + weights.lambda * normalized;
        let raw_price = base_price * multiplier;

        let mut diagnostics = Diagnostics::new();
        breakdown.record(&mut diagnostics);
        diagnostics.record("demand_raw", raw_demand);
        diagnostics.record("demand_normalized", normalized);
        diagnostics.record("demand_multiplier", multiplier);
        if raw_demand < weights.demand_min || raw_demand > weights.demand_max {
            diagnostics.warn(ComputationWarning::DemandSaturated { raw: raw_demand, normalized });
        }

        debug!(
            "Demand price: {:.4} (base: {:.4}, D: {:.4}, N: {:.4}, lambda: {})",
            raw_price, base_price, raw_demand, normalized, weights.lambda
        );
        Ok(StrategyOutput::new(raw_price, diagnostics))
    }
}

impl PricingStrategy for DemandStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Demand
    }

    fn compute(&self, input: &StrategyInput<'_>) -> Result<StrategyOutput, PricingError> {
        Self::price_from_base(input.state.base_price, input.features, &input.config.demand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn example_features() -> FeatureSnapshot {
        FeatureSnapshot::new(80, 100, Utc::now())
            .with_queue(5)
            .with_traffic(0.6)
            .with_special_day(true)
            .with_vehicle_weight(1.2)
    }

    #[test]
    fn test_worked_example() {
        let weights = DemandWeights::default();
        let out = DemandStrategy::price_from_base(10.0, &example_features(), &weights).unwrap();

        let d = out.diagnostics.contribution("demand_raw").unwrap();
        let n = out.diagnostics.contribution("demand_normalized").unwrap();
        assert!((d - 1.86).abs() < 1e-9, "D = {d}");
        assert!((n - 0.372).abs() < 1e-9, "N = {n}");
        assert!((out.raw_price - 13.72).abs() < 1e-9, "price = {}", out.raw_price);
        assert!(out.diagnostics.warnings.is_empty());
    }

    #[test]
    fn test_breakdown_terms() {
        let breakdown =
            DemandBreakdown::from_features(&example_features(), &DemandWeights::default());
        assert!((breakdown.occupancy - 0.32).abs() < 1e-12);
        assert!((breakdown.queue - 1.5).abs() < 1e-12);
        assert!((breakdown.traffic + 0.12).abs() < 1e-12);
        assert!((breakdown.special_day - 0.1).abs() < 1e-12);
        assert!((breakdown.vehicle_type - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_traffic_is_subtracted() {
        let weights = DemandWeights::default();
        let calm = FeatureSnapshot::new(50, 100, Utc::now());
        let jammed = calm.clone().with_traffic(1.0);
        let a = DemandStrategy::price_from_base(10.0, &calm, &weights).unwrap();
        let b = DemandStrategy::price_from_base(10.0, &jammed, &weights).unwrap();
        assert!(b.raw_price < a.raw_price);

        let inverted = DemandWeights { traffic_gamma: -0.2, ..weights };
        let c = DemandStrategy::price_from_base(10.0, &jammed, &inverted).unwrap();
        assert!(c.raw_price > a.raw_price);
    }

    #[test]
    fn test_long_queue_saturates() {
        let features = FeatureSnapshot::new(100, 100, Utc::now()).with_queue(1_000);
        let weights = DemandWeights::default();
        let out = DemandStrategy::price_from_base(10.0, &features, &weights).unwrap();
        assert_eq!(out.diagnostics.contribution("demand_normalized"), Some(1.0));
        assert!((out.raw_price - 20.0).abs() < 1e-12);
        assert!(out
            .diagnostics
            .has_warning(|w| matches!(w, ComputationWarning::DemandSaturated { .. })));
    }

    #[test]
    fn test_negative_demand_floors_at_zero() {
        let features = FeatureSnapshot::new(0, 100, Utc::now()).with_traffic(1.0);
        let weights = DemandWeights { vehicle_epsilon: 0.0, ..DemandWeights::default() };
        let out = DemandStrategy::price_from_base(10.0, &features, &weights).unwrap();
        assert_eq!(out.diagnostics.contribution("demand_normalized"), Some(0.0));
        assert_eq!(out.raw_price, 10.0);
    }

    #[test]
    fn test_degenerate_range_fails_fast() {
        assert!(matches!(
            normalize_demand(1.0, 3.0, 3.0),
            Err(ConfigurationError::DegenerateDemandRange { .. })
        ));

        let weights = DemandWeights { demand_min: 1.0, demand_max: 1.0, ..Default::default() };
        let err = DemandStrategy::price_from_base(10.0, &example_features(), &weights).unwrap_err();
        assert!(matches!(
            err,
            PricingError::Configuration(ConfigurationError::DegenerateDemandRange { .. })
        ));
    }

    #[test]
    fn test_normalize_clamp_idempotent() {
        for raw in [-10.0, -0.1, 0.0, 1.3, 4.99, 5.0, 17.0] {
            let once = normalize_demand(raw, 0.0, 5.0).unwrap();
            let twice = once.clamp(0.0, 1.0);
            assert_eq!(once, twice);
            assert!((0.0..=1.0).contains(&once));
        }
    }
}
