//! # Pricing Engine
//!
//! Computes a per-lot parking price at discrete time steps from occupancy,
//! queue, traffic, calendar, vehicle-mix and competitor-price signals.
//!
//! A call runs one of three strategies (linear drift, weighted demand score,
//! competitor blending) and then a shared bounds and smoothing stage. The engine
//! performs no I/O: it is a deterministic function of the lot's current state,
//! a feature snapshot and the active configuration.

pub mod bounds;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod lots;
pub mod models;
pub mod strategy;




pub use bounds::{BoundsClamp, ClampedPrice};
pub use config::{
    CandidateSource, CompetitiveConfig, DemandWeights, EngineConfig, LinearParameters, PriceBounds,
};
pub use engine::{evaluate_with_config, PricingEngine, PricingPhase, PricingRequest};
pub use error::{ConfigurationError, PricingError, PricingResult, ValidationError};
pub use lots::{LotEntry, LotRegistry};
pub use models::*;
pub use strategy::{
    CompetitiveStrategy, DemandStrategy, LinearStrategy, PricingStrategy, StrategyInput,
    StrategyKind, StrategyOutput,
};

/// Current version of the pricing engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
