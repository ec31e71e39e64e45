//! Per-lot state ownership
//!
//! Each lot's [`PricingState`] lives behind its own mutex. A pricing call holds
//! that mutex from read to commit, so concurrent requests for one lot are
//! serialized while different lots price in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::config::EngineConfig;
use crate::engine::{evaluate_with_config, PricingEngine, PricingRequest};
use crate::error::{PricingError, PricingResult};
use crate::models::{LotId, PriceResult, PricingState};

/// Registry entry for a lot
#[derive(Debug)]
pub struct LotEntry {
    pub state: PricingState,
    /// Replaces the engine-wide configuration for this lot only
    pub overrides: Option<Arc<EngineConfig>>,
    /// Successful commits since registration
    pub commits: u64,
    /// Set under the entry lock when the lot leaves the registry
    pub removed: bool,
}

/// Registry of lots priced through one engine
pub struct LotRegistry {
    engine: Arc<PricingEngine>,
    lots: RwLock<HashMap<LotId, Arc<Mutex<LotEntry>>>>,
}

impl LotRegistry {
    pub fn new(engine: Arc<PricingEngine>) -> Self {
        Self { engine, lots: RwLock::new(HashMap::new()) }
    }

    pub fn engine(&self) -> &Arc<PricingEngine> {
        &self.engine
    }

    /// Register a lot with its initial state
    pub fn register_lot(&self, lot_id: impl Into<LotId>, state: PricingState) -> PricingResult<()> {
        let lot_id = lot_id.into();
        state.validate()?;

        let mut lots = self.lots.write();
        if lots.contains_key(&lot_id) {
            return Err(PricingError::LotAlreadyRegistered { lot_id });
        }
        info!("Registered lot {} at base price {:.2}", lot_id, state.base_price);
        let entry = LotEntry { state, overrides: None, commits: 0, removed: false };
        lots.insert(lot_id, Arc::new(Mutex::new(entry)));
        Ok(())
    }

    /// Remove a lot, returning its final state
    pub fn remove_lot(&self, lot_id: &str) -> PricingResult<PricingState> {
        let entry = self
            .lots
            .write()
            .remove(lot_id)
            .ok_or_else(|| PricingError::LotNotRegistered { lot_id: lot_id.to_string() })?;
        let mut entry = entry.lock();
        entry.removed = true;
        info!("Removed lot {}", lot_id);
        Ok(entry.state.clone())
    }

    /// Install a per-lot configuration after validating it
    pub fn set_lot_config(&self, lot_id: &str, config: EngineConfig) -> PricingResult<()> {
        config.validate()?;
        let entry = self.entry(lot_id)?;
        entry.lock().overrides = Some(Arc::new(config));
        info!("Installed configuration override for lot {}", lot_id);
        Ok(())
    }

    /// Return a lot to the engine-wide configuration
    pub fn clear_lot_config(&self, lot_id: &str) -> PricingResult<()> {
        let entry = self.entry(lot_id)?;
        entry.lock().overrides = None;
        Ok(())
    }

    /// Price a lot and commit the result under the lot's lock
    pub fn price_lot(&self, lot_id: &str, request: &PricingRequest<'_>) -> PricingResult<PriceResult> {
        let entry = self.entry(lot_id)?;
        self.price_entry(lot_id, &entry, request)
    }

    fn price_entry(
        &self,
        lot_id: &str,
        entry: &Mutex<LotEntry>,
        request: &PricingRequest<'_>,
    ) -> PricingResult<PriceResult> {
        let mut guard = entry.lock();
        // remove_lot may have won the race between lookup and lock
        if guard.removed {
            return Err(PricingError::LotNotRegistered { lot_id: lot_id.to_string() });
        }
        let config = match &guard.overrides {
            Some(config) => config.clone(),
            None => self.engine.config(),
        };
        let result = evaluate_with_config(&config, &mut guard.state, request)?;
        guard.commits += 1;
        Ok(result)
    }

    /// Current state of a lot
    pub fn lot_state(&self, lot_id: &str) -> PricingResult<PricingState> {
        Ok(self.entry(lot_id)?.lock().state.clone())
    }

    /// Number of commits applied to a lot
    pub fn lot_commits(&self, lot_id: &str) -> PricingResult<u64> {
        Ok(self.entry(lot_id)?.lock().commits)
    }

    /// Registered lot ids in sorted order
    pub fn lot_ids(&self) -> Vec<LotId> {
        let mut ids: Vec<LotId> = self.lots.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.read().is_empty()
    }

    fn entry(&self, lot_id: &str) -> PricingResult<Arc<Mutex<LotEntry>>> {
        self.lots
            .read()
            .get(lot_id)
            .cloned()
            .ok_or_else(|| PricingError::LotNotRegistered { lot_id: lot_id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureSnapshot;
    use crate::strategy::StrategyKind;
    use chrono::Utc;

    fn registry() -> LotRegistry {
        LotRegistry::new(Arc::new(PricingEngine::new(EngineConfig::default()).unwrap()))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = registry();
        assert!(registry.is_empty());
        registry.register_lot("lot-b", PricingState::new(8.0).unwrap()).unwrap();
        registry.register_lot("lot-a", PricingState::new(10.0).unwrap()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lot_ids(), vec!["lot-a".to_string(), "lot-b".to_string()]);
        assert_eq!(registry.lot_state("lot-a").unwrap().base_price, 10.0);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = registry();
        registry.register_lot("lot-a", PricingState::new(10.0).unwrap()).unwrap();
        let err = registry.register_lot("lot-a", PricingState::new(12.0).unwrap()).unwrap_err();
        assert!(matches!(err, PricingError::LotAlreadyRegistered { .. }));
        assert_eq!(registry.lot_state("lot-a").unwrap().base_price, 10.0);
    }

    #[test]
    fn test_unknown_lot() {
        let registry = registry();
        let features = FeatureSnapshot::new(10, 100, Utc::now());
        let err = registry.price_lot("ghost", &PricingRequest::new(&features)).unwrap_err();
        assert!(matches!(err, PricingError::LotNotRegistered { .. }));
        assert!(registry.remove_lot("ghost").is_err());
    }

    #[test]
    fn test_price_lot_commits() {
        let registry = registry();
        registry.register_lot("lot-a", PricingState::new(10.0).unwrap()).unwrap();
        let features = FeatureSnapshot::new(50, 100, Utc::now());
        let request = PricingRequest::new(&features).with_strategy(StrategyKind::Linear);

        let result = registry.price_lot("lot-a", &request).unwrap();
        assert!((result.price - 12.5).abs() < 1e-9);
        assert_eq!(registry.lot_state("lot-a").unwrap().current_price, result.price);
        assert_eq!(registry.lot_commits("lot-a").unwrap(), 1);
    }

    #[test]
    fn test_per_lot_override() {
        let registry = registry();
        registry.register_lot("lot-a", PricingState::new(10.0).unwrap()).unwrap();
        registry.register_lot("lot-b", PricingState::new(10.0).unwrap()).unwrap();

        let mut capped = EngineConfig::default();
        capped.bounds.max_multiplier = 1.1;
        registry.set_lot_config("lot-b", capped).unwrap();

        let features = FeatureSnapshot::new(100, 100, Utc::now()).with_queue(20);
        let request = PricingRequest::new(&features);
        let a = registry.price_lot("lot-a", &request).unwrap();
        let b = registry.price_lot("lot-b", &request).unwrap();
        assert!((a.price - 20.0).abs() < 1e-9);
        assert!((b.price - 11.0).abs() < 1e-9);

        registry.clear_lot_config("lot-b").unwrap();
        let features = FeatureSnapshot { timestamp: Utc::now(), ..features };
        let b = registry.price_lot("lot-b", &PricingRequest::new(&features)).unwrap();
        assert!((b.price - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let registry = registry();
        registry.register_lot("lot-a", PricingState::new(10.0).unwrap()).unwrap();
        let mut broken = EngineConfig::default();
        broken.bounds.price_floor = -1.0;
        assert!(matches!(
            registry.set_lot_config("lot-a", broken),
            Err(PricingError::Configuration(_))
        ));
    }

    #[test]
    fn test_remove_lot_returns_state() {
        let registry = registry();
        registry.register_lot("lot-a", PricingState::new(10.0).unwrap()).unwrap();
        let state = registry.remove_lot("lot-a").unwrap();
        assert_eq!(state.current_price, 10.0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_pricing_a_lot_removed_after_lookup_is_rejected() {
        let registry = registry();
        registry.register_lot("lot-a", PricingState::new(10.0).unwrap()).unwrap();
        let stale = registry.entry("lot-a").unwrap();
        registry.remove_lot("lot-a").unwrap();

        let features = FeatureSnapshot::new(50, 100, Utc::now());
        let request = PricingRequest::new(&features).with_strategy(StrategyKind::Linear);
        let err = registry.price_entry("lot-a", &stale, &request).unwrap_err();
        assert!(matches!(err, PricingError::LotNotRegistered { .. }));

        let orphan = stale.lock();
        assert_eq!(orphan.state.current_price, 10.0);
        assert_eq!(orphan.commits, 0);
    }
}
