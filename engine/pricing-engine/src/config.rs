use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigurationError;
use crate::strategy::StrategyKind;

/// Prefix for environment variable overrides, e.g. `PRICING_QUEUE_BETA`
pub const ENV_PREFIX: &str = "PRICING_";

/// Every name accepted by [`EngineConfig::set_parameter`]
pub const PARAMETER_NAMES: [&str; 18] = [
    "linear_alpha",
    "occupancy_alpha",
    "queue_beta",
    "traffic_gamma",
    "special_day_delta",
    "vehicle_epsilon",
    "demand_lambda",
    "demand_min",
    "demand_max",
    "min_price_multiplier",
    "max_price_multiplier",
    "max_step_delta",
    "price_floor",
    "proximity_radius_km",
    "competitor_weight",
    "reroute_occupancy_threshold",
    "reroute_savings_threshold",
    "distance_epsilon_km",
];

/// Configuration for the pricing engine.
///
/// Immutable for the lifetime of one computation. The engine holds it behind an
/// `Arc` so a reload swaps the whole structure between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Strategy used when a request does not name one
    pub default_strategy: StrategyKind,

    /// Occupancy drift parameters
    pub linear: LinearParameters,

    /// Demand score weights and normalization range
    pub demand: DemandWeights,

    /// Multiplier bounds and smoothing
    pub bounds: PriceBounds,

    /// Competitor blending and rerouting
    pub competitive: CompetitiveConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearParameters {
    /// Price added per unit of occupancy ratio (e.g., 5.0 = $5 when full)
    pub alpha: f64,
}

/// Weights of the five demand signals.
///
/// `traffic_gamma` is always subtracted, so a positive value means congestion
/// lowers demand. Any weight may be negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandWeights {
    pub occupancy_alpha: f64,
    pub queue_beta: f64,
    pub traffic_gamma: f64,
    pub special_day_delta: f64,
    pub vehicle_epsilon: f64,

    /// Sensitivity of price to normalized demand
    pub lambda: f64,

    /// Raw demand mapped to 0
    pub demand_min: f64,

    /// Raw demand mapped to 1
    pub demand_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceBounds {
    /// Lowest allowed price / base price (e.g., 0.5)
    pub min_multiplier: f64,

    /// Highest allowed price / base price (e.g., 2.0)
    pub max_multiplier: f64,

    /// Largest change per call as a fraction of current price
    pub max_step_delta: Option<f64>,

    /// Absolute minimum price. Applied last, so it wins even when it lies
    /// above `max_multiplier × base`; that case is reported as a warning.
    pub price_floor: f64,
}

/// Which price the competitive strategy blends against competitors.
///
/// `BasePrice` is the default, so a lot with no competitors in range prices
/// at its base. `Demand` blends against the demand strategy's raw price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// The lot's base price
    BasePrice,
    /// The demand strategy's raw price
    Demand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitiveConfig {
    /// Competitors farther than this are ignored
    pub proximity_radius_km: f64,

    /// Share of the blended price taken from competitors, in [0, 1]
    pub competitor_weight: f64,

    /// Occupancy ratio at which rerouting is considered (e.g., 0.95)
    pub reroute_occupancy_threshold: f64,

    /// Competitor must be cheaper than price times this (e.g., 0.9)
    pub reroute_savings_threshold: f64,

    /// Added to distances before inverting them
    pub distance_epsilon_km: f64,

    /// Price blended with competitors, defaults to the base price
    pub candidate: CandidateSource,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_strategy: StrategyKind::Demand,
            linear: LinearParameters::default(),
            demand: DemandWeights::default(),
            bounds: PriceBounds::default(),
            competitive: CompetitiveConfig::default(),
        }
    }
}

impl Default for LinearParameters {
    fn default() -> Self {
        Self { alpha: 5.0 }
    }
}

impl Default for DemandWeights {
    fn default() -> Self {
        Self {
            occupancy_alpha: 0.4,
            queue_beta: 0.3,
            traffic_gamma: 0.2,
            special_day_delta: 0.1,
            vehicle_epsilon: 0.05,
            lambda: 1.0,
            demand_min: 0.0,
            demand_max: 5.0,
        }
    }
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self { min_multiplier: 0.5, max_multiplier: 2.0, max_step_delta: None, price_floor: 0.01 }
    }
}

impl Default for CompetitiveConfig {
    fn default() -> Self {
        Self {
            proximity_radius_km: 1.0,
            competitor_weight: 0.3,
            reroute_occupancy_threshold: 0.95,
            reroute_savings_threshold: 0.9,
            distance_epsilon_km: 0.001,
            candidate: CandidateSource::BasePrice,
        }
    }
}

impl EngineConfig {
    /// Reject degenerate weights and bounds
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let finite = [
            ("linear_alpha", self.linear.alpha),
            ("occupancy_alpha", self.demand.occupancy_alpha),
            ("queue_beta", self.demand.queue_beta),
            ("traffic_gamma", self.demand.traffic_gamma),
            ("special_day_delta", self.demand.special_day_delta),
            ("vehicle_epsilon", self.demand.vehicle_epsilon),
            ("demand_lambda", self.demand.lambda),
            ("demand_min", self.demand.demand_min),
            ("demand_max", self.demand.demand_max),
            ("reroute_occupancy_threshold", self.competitive.reroute_occupancy_threshold),
            ("reroute_savings_threshold", self.competitive.reroute_savings_threshold),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ConfigurationError::NonFiniteParameter { name, value });
            }
        }

        if self.demand.demand_max <= self.demand.demand_min {
            return Err(ConfigurationError::DegenerateDemandRange {
                min: self.demand.demand_min,
                max: self.demand.demand_max,
            });
        }

        let bounds = &self.bounds;
        let bounds_ok = bounds.min_multiplier.is_finite()
            && bounds.max_multiplier.is_finite()
            && bounds.min_multiplier > 0.0
            && bounds.min_multiplier <= bounds.max_multiplier;
        if !bounds_ok {
            return Err(ConfigurationError::InvalidMultiplierBounds {
                min: bounds.min_multiplier,
                max: bounds.max_multiplier,
            });
        }
        if let Some(delta) = bounds.max_step_delta {
            if !delta.is_finite() || delta < 0.0 {
                return Err(ConfigurationError::InvalidStepDelta(delta));
            }
        }
        if !bounds.price_floor.is_finite() || bounds.price_floor <= 0.0 {
            return Err(ConfigurationError::InvalidPriceFloor(bounds.price_floor));
        }

        let competitive = &self.competitive;
        if !(0.0..=1.0).contains(&competitive.competitor_weight) {
            return Err(ConfigurationError::InvalidCompetitorWeight(competitive.competitor_weight));
        }
        if !competitive.proximity_radius_km.is_finite() || competitive.proximity_radius_km < 0.0 {
            return Err(ConfigurationError::InvalidProximityRadius(
                competitive.proximity_radius_km,
            ));
        }
        if !competitive.distance_epsilon_km.is_finite() || competitive.distance_epsilon_km <= 0.0 {
            return Err(ConfigurationError::InvalidDistanceEpsilon(
                competitive.distance_epsilon_km,
            ));
        }

        Ok(())
    }

    /// Set one named parameter, e.g. `("queue_beta", 0.3)`
    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), ConfigurationError> {
        match name {
            "linear_alpha" => self.linear.alpha = value,
            "occupancy_alpha" => self.demand.occupancy_alpha = value,
            "queue_beta" => self.demand.queue_beta = value,
            "traffic_gamma" => self.demand.traffic_gamma = value,
            "special_day_delta" => self.demand.special_day_delta = value,
            "vehicle_epsilon" => self.demand.vehicle_epsilon = value,
            "demand_lambda" => self.demand.lambda = value,
            "demand_min" => self.demand.demand_min = value,
            "demand_max" => self.demand.demand_max = value,
            "min_price_multiplier" => self.bounds.min_multiplier = value,
            "max_price_multiplier" => self.bounds.max_multiplier = value,
            "max_step_delta" => self.bounds.max_step_delta = Some(value),
            "price_floor" => self.bounds.price_floor = value,
            "proximity_radius_km" => self.competitive.proximity_radius_km = value,
            "competitor_weight" => self.competitive.competitor_weight = value,
            "reroute_occupancy_threshold" => {
                self.competitive.reroute_occupancy_threshold = value
            }
            "reroute_savings_threshold" => self.competitive.reroute_savings_threshold = value,
            "distance_epsilon_km" => self.competitive.distance_epsilon_km = value,
            other => return Err(ConfigurationError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }

    /// Apply a mapping of named parameters on top of this configuration and
    /// validate the result. Keys not present keep their current values.
    pub fn with_parameters(
        mut self,
        parameters: &HashMap<String, f64>,
    ) -> Result<Self, ConfigurationError> {
        for (name, value) in parameters {
            self.set_parameter(name, *value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Build from a mapping of named parameters over the defaults
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Result<Self, ConfigurationError> {
        Self::default().with_parameters(parameters)
    }

    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::default().with_env_overrides(std::env::vars())
    }

    /// Apply `PRICING_*` variables from `vars`. `PRICING_DEFAULT_STRATEGY`
    /// selects the strategy and other suffixes name a parameter. Variables
    /// whose suffix is not a parameter name are logged and skipped.
    pub fn with_env_overrides<I>(mut self, vars: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, raw) in vars {
            let Some(suffix) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let name = suffix.to_ascii_lowercase();
            let invalid = || ConfigurationError::InvalidEnvValue {
                name: key.clone(),
                value: raw.clone(),
            };

            if name == "default_strategy" {
                self.default_strategy = raw.parse().map_err(|_| invalid())?;
                continue;
            }
            if !PARAMETER_NAMES.contains(&name.as_str()) {
                warn!("Ignoring {}: not a pricing parameter", key);
                continue;
            }
            let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
            self.set_parameter(&name, value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigurationError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
