//! Shared post-processing applied after every strategy

use tracing::{debug, warn};

use crate::config::PriceBounds;
use crate::error::ValidationError;
use crate::models::{ComputationWarning, Diagnostics, PricingState};

/// Clamped price and the multiplier it represents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampedPrice {
    pub price: f64,
    pub applied_multiplier: f64,
}

/// Enforces multiplier bounds, per-step smoothing and the absolute floor.
///
/// Order: multiplier band, then step limit relative to the current price,
/// then the floor. The floor always wins.
#[derive(Debug, Clone, Copy)]
pub struct BoundsClamp<'a> {
    bounds: &'a PriceBounds,
}

impl<'a> BoundsClamp<'a> {
    pub fn new(bounds: &'a PriceBounds) -> Self {
        Self { bounds }
    }

    pub fn apply(
        &self,
        raw_price: f64,
        state: &PricingState,
        diagnostics: &mut Diagnostics,
    ) -> Result<ClampedPrice, ValidationError> {
        if !raw_price.is_finite() {
            return Err(ValidationError::NonFinitePrice(raw_price));
        }
        let bounds = self.bounds;
        let base = state.base_price;

        let requested = raw_price / base;
        let multiplier = requested.clamp(bounds.min_multiplier, bounds.max_multiplier);
        if multiplier != requested {
            diagnostics.warn(ComputationWarning::MultiplierClamped { requested, applied: multiplier });
        }
        let mut price = multiplier * base;

        if let Some(max_step) = bounds.max_step_delta {
            let limit = max_step * state.current_price;
            let step = price - state.current_price;
            let limited = step.clamp(-limit, limit);
            if limited != step {
                diagnostics.warn(ComputationWarning::StepLimited { requested: step, applied: limited });
                price = state.current_price + limited;
            }
        }

        if price < bounds.price_floor {
            diagnostics.warn(ComputationWarning::FloorApplied { floor: bounds.price_floor });
            price = bounds.price_floor;

            let band_max = bounds.max_multiplier * base;
            if price > band_max {
                warn!("Price floor {} exceeds band maximum {:.4}", bounds.price_floor, band_max);
                diagnostics.warn(ComputationWarning::FloorExceedsBand {
                    floor: bounds.price_floor,
                    band_max,
                });
            }
        }

        let applied_multiplier = price / base;
        diagnostics.record("raw_multiplier", requested);
        diagnostics.record("applied_multiplier", applied_multiplier);

        debug!(
            "Clamped price {:.4} -> {:.4} (multiplier {:.4} -> {:.4})",
            raw_price, price, requested, applied_multiplier
        );
        Ok(ClampedPrice { price, applied_multiplier })
    }
}
