use std::cmp::Ordering;

use tracing::debug;

use super::{DemandStrategy, PricingStrategy, StrategyInput, StrategyKind, StrategyOutput};
use crate::config::{CandidateSource, CompetitiveConfig};
use crate::error::{PricingError, ValidationError};
use crate::geo::{haversine_km, validate_point};
use crate::models::{ComputationWarning, CompetitorQuote, Diagnostics, GeoPoint, LotId};

/// Blends a candidate price with nearby competitors and suggests rerouting
/// drivers away from a saturated lot
#[derive(Debug, Clone, Copy, Default)]
pub struct CompetitiveStrategy;

/// Result of the competitor blend
#[derive(Debug, Clone, PartialEq)]
pub struct CompetitiveAdjustment {
    pub raw_price: f64,
    pub reroute_suggestion: Option<LotId>,
    pub competitors_in_range: usize,
    pub diagnostics: Diagnostics,
}

struct InRange<'a> {
    quote: &'a CompetitorQuote,
    distance_km: f64,
}

impl CompetitiveStrategy {
    /// Adjust `base_price` toward the distance-weighted average of competitors
    /// within the proximity radius of `location`.
    ///
    /// All coordinates and prices are validated before any distance is computed.
    pub fn adjust(
        base_price: f64,
        location: Option<&GeoPoint>,
        quotes: &[CompetitorQuote],
        occupancy_ratio: f64,
        config: &CompetitiveConfig,
    ) -> Result<CompetitiveAdjustment, ValidationError> {
        let location = location.ok_or(ValidationError::MissingLocation)?;
        validate_point(location)?;
        for quote in quotes {
            quote.validate()?;
        }

        let in_range: Vec<InRange<'_>> = quotes
            .iter()
            .map(|quote| InRange { quote, distance_km: haversine_km(location, &quote.location) })
            .filter(|c| c.distance_km <= config.proximity_radius_km)
            .collect();

        let mut diagnostics = Diagnostics::new();
        diagnostics.record("competitors_in_range", in_range.len() as f64);

        if in_range.is_empty() {
            diagnostics.warn(ComputationWarning::NoCompetitorsInRange);
            debug!("No competitors within {} km, keeping {:.4}", config.proximity_radius_km, base_price);
            return Ok(CompetitiveAdjustment {
                raw_price: base_price,
                reroute_suggestion: None,
                competitors_in_range: 0,
                diagnostics,
            });
        }

        let inverse: Vec<f64> =
            in_range.iter().map(|c| 1.0 / (c.distance_km + config.distance_epsilon_km)).collect();
        let total: f64 = inverse.iter().sum();
        let weighted_avg: f64 =
            in_range.iter().zip(&inverse).map(|(c, w)| c.quote.price * (w / total)).sum();

        let share = config.competitor_weight;
        let raw_price = base_price * (1.0 - share) + weighted_avg * share;

        // Lowest price wins; ties go to the lexicographically smallest id
        let cheapest = in_range
            .iter()
            .min_by(|a, b| {
                a.quote
                    .price
                    .total_cmp(&b.quote.price)
                    .then_with(|| a.quote.competitor_id.cmp(&b.quote.competitor_id))
            })
            .map(|c| c.quote);
        let nearest_km = in_range
            .iter()
            .map(|c| c.distance_km)
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        diagnostics.record("competitor_weighted_avg", weighted_avg);
        diagnostics.record("competitor_blend", weighted_avg * share);
        diagnostics.record("candidate_share", base_price * (1.0 - share));
        if let Some(nearest_km) = nearest_km {
            diagnostics.record("nearest_competitor_km", nearest_km);
        }

        let mut reroute_suggestion = None;
        if let Some(cheapest) = cheapest {
            diagnostics.record("cheapest_competitor_price", cheapest.price);
            let saturated = occupancy_ratio >= config.reroute_occupancy_threshold;
            let cheaper = cheapest.price < raw_price * config.reroute_savings_threshold;
            if saturated && cheaper {
                reroute_suggestion = Some(cheapest.competitor_id.clone());
            }
        }

        debug!(
            "Competitive price: {:.4} (candidate: {:.4}, avg: {:.4}, in range: {}, reroute: {:?})",
            raw_price,
            base_price,
            weighted_avg,
            in_range.len(),
            reroute_suggestion
        );

        Ok(CompetitiveAdjustment {
            raw_price,
            reroute_suggestion,
            competitors_in_range: in_range.len(),
            diagnostics,
        })
    }
}

impl PricingStrategy for CompetitiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Competitive
    }

    fn compute(&self, input: &StrategyInput<'_>) -> Result<StrategyOutput, PricingError> {
        let config = &input.config.competitive;
        let mut diagnostics = Diagnostics::new();

        let candidate = match config.candidate {
            CandidateSource::BasePrice => input.state.base_price,
            CandidateSource::Demand => {
                let demand = DemandStrategy::price_from_base(
                    input.state.base_price,
                    input.features,
                    &input.config.demand,
                )?;
                diagnostics.merge(demand.diagnostics);
                demand.raw_price
            }
        };
        diagnostics.record("candidate_price", candidate);

        let adjustment = Self::adjust(
            candidate,
            input.features.location.as_ref(),
            input.competitors,
            input.features.occupancy_ratio(),
            config,
        )?;
        diagnostics.merge(adjustment.diagnostics);

        Ok(StrategyOutput {
            raw_price: adjustment.raw_price,
            reroute_suggestion: adjustment.reroute_suggestion,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    // ~0.0009 degrees of latitude is ~100 m
    const HERE: GeoPoint = GeoPoint { lat: 48.8566, lon: 2.3522 };

    fn quote(id: &str, price: f64, dlat: f64) -> CompetitorQuote {
        CompetitorQuote::new(id, price, GeoPoint::new(HERE.lat + dlat, HERE.lon), Utc::now())
    }

    fn config() -> CompetitiveConfig {
        CompetitiveConfig::default()
    }

    #[test]
    fn test_no_competitors_keeps_base_exactly() {
        let adj = CompetitiveStrategy::adjust(10.37, Some(&HERE), &[], 0.99, &config()).unwrap();
        assert_eq!(adj.raw_price, 10.37);
        assert!(adj.reroute_suggestion.is_none());
        assert_eq!(adj.competitors_in_range, 0);
        assert_eq!(adj.diagnostics.warnings, vec![ComputationWarning::NoCompetitorsInRange]);
    }

    #[test]
    fn test_far_competitors_filtered() {
        // ~11 km away
        let quotes = vec![quote("far", 2.0, 0.1)];
        let adj = CompetitiveStrategy::adjust(10.0, Some(&HERE), &quotes, 0.5, &config()).unwrap();
        assert_eq!(adj.raw_price, 10.0);
        assert_eq!(adj.competitors_in_range, 0);
    }

    #[test]
    fn test_single_competitor_blend() {
        let quotes = vec![quote("a", 8.0, 0.001)];
        let adj = CompetitiveStrategy::adjust(10.0, Some(&HERE), &quotes, 0.5, &config()).unwrap();
        // 10 × 0.7 + 8 × 0.3
        assert!((adj.raw_price - 9.4).abs() < 1e-9);
        assert_eq!(adj.competitors_in_range, 1);
    }

    #[test]
    fn test_closer_competitor_dominates() {
        let quotes = vec![quote("near", 6.0, 0.0005), quote("far", 12.0, 0.008)];
        let adj = CompetitiveStrategy::adjust(10.0, Some(&HERE), &quotes, 0.5, &config()).unwrap();
        let avg = adj.diagnostics.contribution("competitor_weighted_avg").unwrap();
        assert!(avg > 6.0 && avg < 9.0, "avg = {avg}");
    }

    #[test]
    fn test_colocated_competitor_does_not_divide_by_zero() {
        let quotes = vec![quote("same", 7.0, 0.0), quote("other", 9.0, 0.002)];
        let adj = CompetitiveStrategy::adjust(10.0, Some(&HERE), &quotes, 0.5, &config()).unwrap();
        assert!(adj.raw_price.is_finite());
        let avg = adj.diagnostics.contribution("competitor_weighted_avg").unwrap();
        assert!((avg - 7.0).abs() < 0.01);
    }

    #[test]
    fn test_reroute_fires_when_saturated_and_cheaper() {
        let cfg = CompetitiveConfig { competitor_weight: 0.0, ..config() };
        let quotes = vec![quote("lot-b", 8.0, 0.001)];
        let adj = CompetitiveStrategy::adjust(10.0, Some(&HERE), &quotes, 0.96, &cfg).unwrap();
        assert_eq!(adj.raw_price, 10.0);
        assert_eq!(adj.reroute_suggestion.as_deref(), Some("lot-b"));
    }

    #[test]
    fn test_reroute_requires_both_conditions() {
        let cfg = CompetitiveConfig { competitor_weight: 0.0, ..config() };

        let quotes = vec![quote("lot-b", 8.0, 0.001)];
        let not_full = CompetitiveStrategy::adjust(10.0, Some(&HERE), &quotes, 0.94, &cfg).unwrap();
        assert!(not_full.reroute_suggestion.is_none());

        let quotes = vec![quote("lot-b", 9.0, 0.001)];
        let not_cheap = CompetitiveStrategy::adjust(10.0, Some(&HERE), &quotes, 0.99, &cfg).unwrap();
        assert!(not_cheap.reroute_suggestion.is_none());
    }

    #[test]
    fn test_reroute_tie_break_lowest_id() {
        let cfg = CompetitiveConfig { competitor_weight: 0.0, ..config() };
        let quotes = vec![
            quote("lot-c", 7.0, 0.001),
            quote("lot-a", 7.0, 0.002),
            quote("lot-b", 7.5, 0.0005),
        ];
        let adj = CompetitiveStrategy::adjust(10.0, Some(&HERE), &quotes, 1.0, &cfg).unwrap();
        assert_eq!(adj.reroute_suggestion.as_deref(), Some("lot-a"));
    }

    #[test]
    fn test_missing_location_rejected() {
        let err = CompetitiveStrategy::adjust(10.0, None, &[], 0.5, &config()).unwrap_err();
        assert_eq!(err, ValidationError::MissingLocation);
    }

    #[test]
    fn test_malformed_coordinates_rejected() {
        let bad_lot = GeoPoint::new(95.0, 0.0);
        let err = CompetitiveStrategy::adjust(10.0, Some(&bad_lot), &[], 0.5, &config()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCoordinates { .. }));

        let quotes = vec![CompetitorQuote::new("x", 8.0, GeoPoint::new(0.0, 200.0), Utc::now())];
        let err =
            CompetitiveStrategy::adjust(10.0, Some(&HERE), &quotes, 0.5, &config()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCoordinates { .. }));
    }
}
