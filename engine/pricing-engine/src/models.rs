use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geo;
use crate::strategy::StrategyKind;

/// Parking lot identifier. Competitor ids share the same namespace so a
/// reroute suggestion can name the lot to send drivers to.
pub type LotId = String;

/// A point on the earth's surface in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Vehicle classes with their canonical demand weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Bike,
    Truck,
}

impl VehicleType {
    /// Demand weight relative to a car
    pub fn weight(self) -> f64 {
        match self {
            VehicleType::Car => 1.0,
            VehicleType::Bike => 0.5,
            VehicleType::Truck => 1.5,
        }
    }
}

/// Inputs for one pricing evaluation of one lot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    /// Occupied spaces
    pub occupancy: u32,

    /// Total spaces, must be non-zero
    pub capacity: u32,

    /// Vehicles waiting to enter
    pub queue_length: u32,

    /// Nearby traffic congestion in [0, 1]
    pub traffic_level: f64,

    /// Holiday or event day
    #[serde(default)]
    pub is_special_day: bool,

    /// Vehicle-mix weight (1.0 = car)
    pub vehicle_type_weight: f64,

    /// Lot coordinates, required by the competitive strategy
    #[serde(default)]
    pub location: Option<GeoPoint>,

    pub timestamp: DateTime<Utc>,
}

impl FeatureSnapshot {
    /// Create a snapshot for a car-dominated lot with no queue, traffic or location
    pub fn new(occupancy: u32, capacity: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            occupancy,
            capacity,
            queue_length: 0,
            traffic_level: 0.0,
            is_special_day: false,
            vehicle_type_weight: VehicleType::Car.weight(),
            location: None,
            timestamp,
        }
    }

    pub fn with_queue(mut self, queue_length: u32) -> Self {
        self.queue_length = queue_length;
        self
    }

    pub fn with_traffic(mut self, traffic_level: f64) -> Self {
        self.traffic_level = traffic_level;
        self
    }

    pub fn with_special_day(mut self, is_special_day: bool) -> Self {
        self.is_special_day = is_special_day;
        self
    }

    pub fn with_vehicle_weight(mut self, weight: f64) -> Self {
        self.vehicle_type_weight = weight;
        self
    }

    pub fn with_vehicle_type(self, vehicle: VehicleType) -> Self {
        self.with_vehicle_weight(vehicle.weight())
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    /// Occupied spaces divided by capacity. Only meaningful after `validate`.
    pub fn occupancy_ratio(&self) -> f64 {
        self.occupancy as f64 / self.capacity as f64
    }

    /// Check every field invariant. Nothing is clamped here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.capacity == 0 {
            return Err(ValidationError::ZeroCapacity);
        }
        if self.occupancy > self.capacity {
            return Err(ValidationError::OccupancyExceedsCapacity {
                occupancy: self.occupancy,
                capacity: self.capacity,
            });
        }
        if !(0.0..=1.0).contains(&self.traffic_level) {
            return Err(ValidationError::TrafficOutOfRange(self.traffic_level));
        }
        if !self.vehicle_type_weight.is_finite() || self.vehicle_type_weight <= 0.0 {
            return Err(ValidationError::InvalidVehicleWeight(self.vehicle_type_weight));
        }
        if let Some(location) = &self.location {
            geo::validate_point(location)?;
        }
        Ok(())
    }
}

/// Mutable pricing state owned per lot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingState {
    pub current_price: f64,
    pub base_price: f64,
    pub last_update: Option<DateTime<Utc>>,
}

impl PricingState {
    /// New state starting at the base price
    pub fn new(base_price: f64) -> Result<Self, ValidationError> {
        Self::with_current_price(base_price, base_price)
    }

    pub fn with_current_price(base_price: f64, current_price: f64) -> Result<Self, ValidationError> {
        let state = Self { current_price, base_price, last_update: None };
        state.validate()?;
        Ok(state)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_price("base_price", self.base_price)?;
        check_price("current_price", self.current_price)?;
        Ok(())
    }
}

fn check_price(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::NonPositivePrice { field, value });
    }
    Ok(())
}

/// A competitor's posted price, supplied fresh on every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorQuote {
    pub competitor_id: LotId,
    pub price: f64,
    pub location: GeoPoint,
    pub observed_at: DateTime<Utc>,
}

impl CompetitorQuote {
    pub fn new(
        competitor_id: impl Into<LotId>,
        price: f64,
        location: GeoPoint,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self { competitor_id: competitor_id.into(), price, location, observed_at }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ValidationError::InvalidCompetitorPrice {
                competitor_id: self.competitor_id.clone(),
                price: self.price,
            });
        }
        geo::validate_point(&self.location)
    }
}

/// Non-fatal conditions surfaced alongside a price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComputationWarning {
    NoCompetitorsInRange,
    DemandSaturated { raw: f64, normalized: f64 },
    MultiplierClamped { requested: f64, applied: f64 },
    StepLimited { requested: f64, applied: f64 },
    FloorApplied { floor: f64 },
    /// The floor lifted the price above `max_multiplier × base`
    FloorExceedsBand { floor: f64, band_max: f64 },
}

impl fmt::Display for ComputationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputationWarning::NoCompetitorsInRange => write!(f, "no competitors in range"),
            ComputationWarning::DemandSaturated { raw, normalized } => {
                write!(f, "demand {raw:.4} outside reference range, capped at {normalized}")
            }
            ComputationWarning::MultiplierClamped { requested, applied } => {
                write!(f, "multiplier {requested:.4} clamped to {applied:.4}")
            }
            ComputationWarning::StepLimited { requested, applied } => {
                write!(f, "price step {requested:.4} limited to {applied:.4}")
            }
            ComputationWarning::FloorApplied { floor } => write!(f, "price floor {floor} applied"),
            ComputationWarning::FloorExceedsBand { floor, band_max } => {
                write!(f, "price floor {floor} exceeds band maximum {band_max:.4}")
            }
        }
    }
}

/// Per-signal contributions and warnings for one evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub contributions: BTreeMap<String, f64>,
    pub warnings: Vec<ComputationWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, signal: impl Into<String>, value: f64) {
        self.contributions.insert(signal.into(), value);
    }

    pub fn warn(&mut self, warning: ComputationWarning) {
        self.warnings.push(warning);
    }

    pub fn contribution(&self, signal: &str) -> Option<f64> {
        self.contributions.get(signal).copied()
    }

    pub fn has_warning(&self, predicate: impl Fn(&ComputationWarning) -> bool) -> bool {
        self.warnings.iter().any(predicate)
    }

    /// Fold another stage's diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.contributions.extend(other.contributions);
        self.warnings.extend(other.warnings);
    }
}

/// Outcome of one pricing call. Immutable and never stored by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResult {
    /// Final bounded and smoothed price
    pub price: f64,

    /// Strategy output before clamping
    pub raw_price: f64,

    /// Final price divided by base price
    pub applied_multiplier: f64,

    pub strategy_used: StrategyKind,

    /// Cheaper nearby lot to send drivers to, if any
    pub reroute_suggestion: Option<LotId>,

    pub diagnostics: Diagnostics,

    /// Timestamp of the snapshot this price was computed from
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_valid_snapshot() {
        let snapshot = FeatureSnapshot::new(80, 100, ts())
            .with_queue(5)
            .with_traffic(0.6)
            .with_vehicle_type(VehicleType::Truck)
            .with_location(GeoPoint::new(40.7, -74.0));
        assert!(snapshot.validate().is_ok());
        assert_eq!(snapshot.vehicle_type_weight, 1.5);
        assert!((snapshot.occupancy_ratio() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_occupancy_over_capacity_rejected() {
        let snapshot = FeatureSnapshot::new(101, 100, ts());
        assert_eq!(
            snapshot.validate(),
            Err(ValidationError::OccupancyExceedsCapacity { occupancy: 101, capacity: 100 })
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let snapshot = FeatureSnapshot::new(0, 0, ts());
        assert_eq!(snapshot.validate(), Err(ValidationError::ZeroCapacity));
    }

    #[test]
    fn test_traffic_and_weight_ranges() {
        let snapshot = FeatureSnapshot::new(10, 100, ts()).with_traffic(1.2);
        assert!(matches!(snapshot.validate(), Err(ValidationError::TrafficOutOfRange(_))));

        let snapshot = FeatureSnapshot::new(10, 100, ts()).with_traffic(f64::NAN);
        assert!(matches!(snapshot.validate(), Err(ValidationError::TrafficOutOfRange(_))));

        let snapshot = FeatureSnapshot::new(10, 100, ts()).with_vehicle_weight(0.0);
        assert!(matches!(snapshot.validate(), Err(ValidationError::InvalidVehicleWeight(_))));
    }

    #[test]
    fn test_bad_location_rejected() {
        let snapshot = FeatureSnapshot::new(10, 100, ts()).with_location(GeoPoint::new(91.0, 0.0));
        assert!(matches!(snapshot.validate(), Err(ValidationError::InvalidCoordinates { .. })));
    }

    #[test]
    fn test_pricing_state_requires_positive_prices() {
        assert!(PricingState::new(10.0).is_ok());
        assert!(PricingState::new(0.0).is_err());
        assert!(PricingState::with_current_price(10.0, -1.0).is_err());
        assert!(PricingState::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_competitor_quote_validation() {
        let quote = CompetitorQuote::new("lot-b", 0.0, GeoPoint::new(0.0, 0.0), ts());
        assert!(matches!(quote.validate(), Err(ValidationError::InvalidCompetitorPrice { .. })));

        let quote = CompetitorQuote::new("lot-b", 8.0, GeoPoint::new(0.0, 181.0), ts());
        assert!(matches!(quote.validate(), Err(ValidationError::InvalidCoordinates { .. })));
    }

    #[test]
    fn test_snapshot_deserializes_with_defaults() {
        let json = r#"{
            "occupancy": 40,
            "capacity": 50,
            "queue_length": 2,
            "traffic_level": 0.3,
            "vehicle_type_weight": 1.0,
            "timestamp": "2026-03-01T09:00:00Z"
        }"#;
        let snapshot: FeatureSnapshot = serde_json::from_str(json).unwrap();
        assert!(!snapshot.is_special_day);
        assert!(snapshot.location.is_none());
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_warning_display() {
        assert_eq!(ComputationWarning::NoCompetitorsInRange.to_string(), "no competitors in range");
    }
}
