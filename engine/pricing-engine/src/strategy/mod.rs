//! Pricing strategies
//!
//! Each strategy turns a validated snapshot into a raw (unclamped) price plus
//! diagnostics. The set is closed: [`StrategyKind`] names every variant and
//! dispatches to it explicitly.

mod competitive;
mod demand;
mod linear;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use competitive::{CompetitiveAdjustment, CompetitiveStrategy};
pub use demand::{normalize_demand, DemandBreakdown, DemandStrategy};
pub use linear::LinearStrategy;

use crate::config::EngineConfig;
use crate::error::PricingError;
use crate::models::{CompetitorQuote, Diagnostics, FeatureSnapshot, LotId, PricingState};

/// Everything a strategy may read for one evaluation
#[derive(Debug, Clone, Copy)]
pub struct StrategyInput<'a> {
    pub state: &'a PricingState,
    pub features: &'a FeatureSnapshot,
    pub competitors: &'a [CompetitorQuote],
    pub config: &'a EngineConfig,
}

/// Raw strategy output, before bounds and smoothing
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    pub raw_price: f64,
    pub reroute_suggestion: Option<LotId>,
    pub diagnostics: Diagnostics,
}

impl StrategyOutput {
    pub fn new(raw_price: f64, diagnostics: Diagnostics) -> Self {
        Self { raw_price, reroute_suggestion: None, diagnostics }
    }
}

/// Common capability of every pricing strategy
pub trait PricingStrategy {
    fn kind(&self) -> StrategyKind;

    /// Compute a raw price. Must be pure.
    fn compute(&self, input: &StrategyInput<'_>) -> Result<StrategyOutput, PricingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Linear,
    Demand,
    Competitive,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] =
        [StrategyKind::Linear, StrategyKind::Demand, StrategyKind::Competitive];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Linear => "linear",
            StrategyKind::Demand => "demand",
            StrategyKind::Competitive => "competitive",
        }
    }

    /// Run the strategy this kind names
    pub fn compute(self, input: &StrategyInput<'_>) -> Result<StrategyOutput, PricingError> {
        match self {
            StrategyKind::Linear => LinearStrategy.compute(input),
            StrategyKind::Demand => DemandStrategy.compute(input),
            StrategyKind::Competitive => CompetitiveStrategy.compute(input),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategy(pub String);

impl fmt::Display for UnknownStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown strategy {:?} (expected linear, demand or competitive)", self.0)
    }
}

impl std::error::Error for UnknownStrategy {}

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}
