//! Error types for the pricing engine

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::LotId;

/// Top-level error returned by the orchestrator and the lot registry
#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Lot {lot_id} is not registered")]
    LotNotRegistered { lot_id: LotId },

    #[error("Lot {lot_id} is already registered")]
    LotAlreadyRegistered { lot_id: LotId },
}

/// A request was rejected because an input broke one of its invariants.
/// The pricing state is never touched when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Occupancy {occupancy} exceeds capacity {capacity}")]
    OccupancyExceedsCapacity { occupancy: u32, capacity: u32 },

    #[error("Capacity must be greater than zero")]
    ZeroCapacity,

    #[error("Traffic level {0} is outside [0, 1]")]
    TrafficOutOfRange(f64),

    #[error("Vehicle type weight {0} must be a positive finite number")]
    InvalidVehicleWeight(f64),

    #[error("Invalid coordinates ({lat}, {lon})")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Lot location is required for competitive pricing")]
    MissingLocation,

    #[error("Competitor {competitor_id} has invalid price {price}")]
    InvalidCompetitorPrice { competitor_id: String, price: f64 },

    #[error("{field} must be a positive finite price, got {value}")]
    NonPositivePrice { field: &'static str, value: f64 },

    #[error("Snapshot at {snapshot} is older than last update at {last_update}")]
    StaleSnapshot { snapshot: DateTime<Utc>, last_update: DateTime<Utc> },

    #[error("Strategy produced a non-finite price {0}")]
    NonFinitePrice(f64),
}

/// Degenerate or unreadable configuration. Fatal at startup or reload.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Demand range is degenerate: min {min} must be below max {max}")]
    DegenerateDemandRange { min: f64, max: f64 },

    #[error("Invalid multiplier bounds: min {min}, max {max}")]
    InvalidMultiplierBounds { min: f64, max: f64 },

    #[error("Max step delta must be a non-negative finite fraction, got {0}")]
    InvalidStepDelta(f64),

    #[error("Price floor must be positive, got {0}")]
    InvalidPriceFloor(f64),

    #[error("Parameter {name} must be finite, got {value}")]
    NonFiniteParameter { name: &'static str, value: f64 },

    #[error("Competitor weight must be within [0, 1], got {0}")]
    InvalidCompetitorWeight(f64),

    #[error("Proximity radius must be non-negative, got {0}")]
    InvalidProximityRadius(f64),

    #[error("Distance epsilon must be positive, got {0}")]
    InvalidDistanceEpsilon(f64),

    #[error("Unknown configuration parameter: {0}")]
    UnknownParameter(String),

    #[error("Invalid value {value:?} for environment variable {name}")]
    InvalidEnvValue { name: String, value: String },

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result alias used across the crate
pub type PricingResult<T> = Result<T, PricingError>;
