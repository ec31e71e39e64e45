//! Replay a recorded sequence of snapshots through a lot registry

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use pricing_engine::{
    CompetitorQuote, FeatureSnapshot, LotRegistry, PriceResult, PricingRequest, PricingState,
    StrategyKind,
};
use serde::Deserialize;
use tracing::{info, warn};

/// Replay file contents
#[derive(Debug, Deserialize)]
pub struct ReplayInput {
    pub lots: Vec<LotSpec>,
    pub events: Vec<ReplayEvent>,
}

#[derive(Debug, Deserialize)]
pub struct LotSpec {
    pub lot_id: String,
    pub base_price: f64,
    #[serde(default)]
    pub current_price: Option<f64>,
    /// Named parameters overriding the engine configuration for this lot
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
pub struct ReplayEvent {
    pub lot_id: String,
    pub snapshot: FeatureSnapshot,
    #[serde(default)]
    pub competitors: Vec<CompetitorQuote>,
    #[serde(default)]
    pub strategy: Option<StrategyKind>,
}

/// Per-lot summary after a replay
#[derive(Debug)]
pub struct LotOutcome {
    pub lot_id: String,
    pub committed: usize,
    pub rejected: usize,
    pub final_state: PricingState,
    pub last_result: Option<PriceResult>,
}

/// Register every lot, then price each lot's events in order on its own task
pub async fn run_replay(registry: Arc<LotRegistry>, input: ReplayInput) -> Result<Vec<LotOutcome>> {
    for lot in &input.lots {
        let state = PricingState::with_current_price(
            lot.base_price,
            lot.current_price.unwrap_or(lot.base_price),
        )
        .with_context(|| format!("Invalid initial state for lot {}", lot.lot_id))?;
        registry.register_lot(lot.lot_id.clone(), state)?;

        if !lot.parameters.is_empty() {
            let config = registry
                .engine()
                .config()
                .as_ref()
                .clone()
                .with_parameters(&lot.parameters)
                .with_context(|| format!("Invalid parameters for lot {}", lot.lot_id))?;
            registry.set_lot_config(&lot.lot_id, config)?;
        }
    }

    let mut per_lot: BTreeMap<String, Vec<ReplayEvent>> = BTreeMap::new();
    for event in input.events {
        if registry.lot_state(&event.lot_id).is_err() {
            bail!("Event references unknown lot {}", event.lot_id);
        }
        per_lot.entry(event.lot_id.clone()).or_default().push(event);
    }
    info!("Replaying {} lots", per_lot.len());

    let mut tasks = Vec::new();
    for (lot_id, events) in per_lot {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let mut committed = 0;
            let mut rejected = 0;
            let mut last_result = None;
            for event in &events {
                let mut request =
                    PricingRequest::new(&event.snapshot).with_competitors(&event.competitors);
                request.strategy = event.strategy;
                match registry.price_lot(&lot_id, &request) {
                    Ok(result) => {
                        committed += 1;
                        last_result = Some(result);
                    }
                    Err(e) => {
                        rejected += 1;
                        warn!("Lot {} rejected snapshot at {}: {}", lot_id, event.snapshot.timestamp, e);
                    }
                }
            }
            (lot_id, committed, rejected, last_result)
        }));
    }

    let mut outcomes = Vec::new();
    for task in tasks {
        let (lot_id, committed, rejected, last_result) = task.await.context("Replay task panicked")?;
        let final_state = registry.lot_state(&lot_id)?;
        outcomes.push(LotOutcome { lot_id, committed, rejected, final_state, last_result });
    }

    // Lots with no events still report their state
    for lot_id in registry.lot_ids() {
        if !outcomes.iter().any(|o| o.lot_id == lot_id) {
            let final_state = registry.lot_state(&lot_id)?;
            outcomes.push(LotOutcome { lot_id, committed: 0, rejected: 0, final_state, last_result: None });
        }
    }
    outcomes.sort_by(|a, b| a.lot_id.cmp(&b.lot_id));
    Ok(outcomes)
}
