//! Pricing orchestrator
//!
//! Validates a snapshot, runs the selected strategy, applies [`BoundsClamp`]
//! and commits the clamped price to the lot's [`PricingState`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::bounds::BoundsClamp;
use crate::config::EngineConfig;
use crate::error::{ConfigurationError, PricingError, ValidationError};
use crate::models::{CompetitorQuote, FeatureSnapshot, PriceResult, PricingState};
use crate::strategy::{StrategyInput, StrategyKind};

/// Phases of one pricing call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingPhase {
    Idle,
    Validating,
    Computing,
    Clamping,
    Committed,
    Rejected,
}

impl PricingPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PricingPhase::Committed | PricingPhase::Rejected)
    }

    /// Legal transitions of the pricing state machine
    pub fn can_transition_to(self, next: PricingPhase) -> bool {
        use PricingPhase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Computing)
                | (Validating, Rejected)
                | (Computing, Clamping)
                | (Computing, Rejected)
                | (Clamping, Committed)
                | (Clamping, Rejected)
        )
    }
}

impl fmt::Display for PricingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One pricing call's inputs
#[derive(Debug, Clone, Copy)]
pub struct PricingRequest<'a> {
    pub features: &'a FeatureSnapshot,
    pub competitors: &'a [CompetitorQuote],
    /// Overrides the configured default strategy
    pub strategy: Option<StrategyKind>,
}

impl<'a> PricingRequest<'a> {
    pub fn new(features: &'a FeatureSnapshot) -> Self {
        Self { features, competitors: &[], strategy: None }
    }

    pub fn with_competitors(mut self, competitors: &'a [CompetitorQuote]) -> Self {
        self.competitors = competitors;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

struct PhaseTracker {
    phase: PricingPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self { phase: PricingPhase::Idle }
    }

    fn advance(&mut self, next: PricingPhase) {
        debug_assert!(self.phase.can_transition_to(next), "{} -> {}", self.phase, next);
        debug!("Pricing phase {} -> {}", self.phase, next);
        self.phase = next;
    }
}

/// Run the full pipeline against one configuration without committing
fn run_pipeline(
    config: &EngineConfig,
    state: &PricingState,
    request: &PricingRequest<'_>,
    tracker: &mut PhaseTracker,
) -> Result<PriceResult, PricingError> {
    let strategy = request.strategy.unwrap_or(config.default_strategy);

    tracker.advance(PricingPhase::Validating);
    validate_request(state, request, strategy)?;

    tracker.advance(PricingPhase::Computing);
    let input = StrategyInput {
        state,
        features: request.features,
        competitors: request.competitors,
        config,
    };
    let output = strategy.compute(&input)?;

    tracker.advance(PricingPhase::Clamping);
    let mut diagnostics = output.diagnostics;
    let clamped = BoundsClamp::new(&config.bounds).apply(output.raw_price, state, &mut diagnostics)?;

    Ok(PriceResult {
        price: clamped.price,
        raw_price: output.raw_price,
        applied_multiplier: clamped.applied_multiplier,
        strategy_used: strategy,
        reroute_suggestion: output.reroute_suggestion,
        diagnostics,
        computed_at: request.features.timestamp,
    })
}

fn validate_request(
    state: &PricingState,
    request: &PricingRequest<'_>,
    strategy: StrategyKind,
) -> Result<(), ValidationError> {
    state.validate()?;
    request.features.validate()?;

    if let Some(last_update) = state.last_update {
        if request.features.timestamp < last_update {
            return Err(ValidationError::StaleSnapshot {
                snapshot: request.features.timestamp,
                last_update,
            });
        }
    }

    if strategy == StrategyKind::Competitive {
        if request.features.location.is_none() {
            return Err(ValidationError::MissingLocation);
        }
        for quote in request.competitors {
            quote.validate()?;
        }
    }
    Ok(())
}

/// Quote and commit a price against an explicit configuration.
///
/// The only place a [`PricingState`] is mutated. On error the state is untouched.
pub fn evaluate_with_config(
    config: &EngineConfig,
    state: &mut PricingState,
    request: &PricingRequest<'_>,
) -> Result<PriceResult, PricingError> {
    let mut tracker = PhaseTracker::new();
    match run_pipeline(config, state, request, &mut tracker) {
        Ok(result) => {
            tracker.advance(PricingPhase::Committed);
            let previous = state.current_price;
            state.current_price = result.price;
            state.last_update = Some(request.features.timestamp);
            info!(
                "Committed {} price {:.4} (previous: {:.4}, raw: {:.4}, multiplier: {:.4})",
                result.strategy_used, result.price, previous, result.raw_price, result.applied_multiplier
            );
            Ok(result)
        }
        Err(e) => {
            let failed_in = tracker.phase;
            tracker.advance(PricingPhase::Rejected);
            warn!("Pricing rejected during {}: {}", failed_in, e);
            Err(e)
        }
    }
}

/// Orchestrates pricing calls over a hot-reloadable configuration
pub struct PricingEngine {
    config: RwLock<Arc<EngineConfig>>,
}

impl PricingEngine {
    /// Create an engine, rejecting degenerate configuration up front
    pub fn new(config: EngineConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        info!("Creating pricing engine (default strategy: {})", config.default_strategy);
        Ok(Self { config: RwLock::new(Arc::new(config)) })
    }

    /// Configuration snapshot used by the next call
    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.read().clone()
    }

    /// Validate and swap in new configuration. On error the old one stays active.
    pub fn reload_config(&self, config: EngineConfig) -> Result<(), ConfigurationError> {
        if let Err(e) = config.validate() {
            warn!("Rejected configuration reload: {}", e);
            return Err(e);
        }
        *self.config.write() = Arc::new(config);
        info!("Configuration reloaded");
        Ok(())
    }

    /// Compute a price without committing it
    pub fn quote(
        &self,
        state: &PricingState,
        request: &PricingRequest<'_>,
    ) -> Result<PriceResult, PricingError> {
        let config = self.config();
        let mut tracker = PhaseTracker::new();
        run_pipeline(&config, state, request, &mut tracker)
    }

    /// Compute a price and commit it to `state`
    pub fn evaluate(
        &self,
        state: &mut PricingState,
        request: &PricingRequest<'_>,
    ) -> Result<PriceResult, PricingError> {
        let config = self.config();
        evaluate_with_config(&config, state, request)
    }
}
