//! Validator (C0): the thin wiring layer that assembles C1-C9 from a loaded
//! config and a hub client, then drives the subscribe -> gate -> escalate
//! loop for the life of the process.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tracing::{info, warn};

use scene_sentinel_config::{TimingConfig, ToleranceConfig, ValidatorConfig};

use crate::error::{IdentityError, InventoryError};
use crate::escalation::EscalationEngine;
use crate::gating::{GateDecision, GatingLayer};
use crate::hub_client::HubClient;
use crate::identity::IdentityMap;
use crate::inventory::Inventory;
use crate::scheduler::{Scheduler, TokioScheduler};

#[derive(Debug, Error)]
pub enum ValidatorInitError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("invalid gating configuration: {0}")]
    Gating(#[from] regex::Error),
}

/// Holds the long-lived collaborators an accepted activation needs and
/// hands each one off to its own spawned `EscalationEngine::run` so that
/// unrelated scenes never wait behind one activation's sleeps (SPEC_FULL.md
/// §5).
pub struct Validator {
    inventory: Arc<Inventory>,
    identity: Arc<IdentityMap>,
    gating: Arc<GatingLayer>,
    hub: Arc<dyn HubClient>,
    scheduler: Arc<dyn Scheduler>,
    tolerances: ToleranceConfig,
    timing: TimingConfig,
}

impl Validator {
    pub fn new(
        config: &ValidatorConfig,
        hub: Arc<dyn HubClient>,
    ) -> Result<Self, ValidatorInitError> {
        let inventory = Inventory::load_from_dir(&config.inventory_dir)?;
        let identity = IdentityMap::load_from_registry(&config.entity_registry_path)?;
        let gating = GatingLayer::new(
            &config.timing,
            config.rate_limits.clone(),
            config.circuit_breaker.clone(),
            &config.filters,
        )?;

        info!(
            scenes = inventory.len(),
            identities = identity.len(),
            "validator initialized"
        );

        Ok(Self {
            inventory: Arc::new(inventory),
            identity: Arc::new(identity),
            gating: Arc::new(gating),
            hub,
            scheduler: Arc::new(TokioScheduler),
            tolerances: config.tolerances.clone(),
            timing: config.timing.clone(),
        })
    }

    /// Run for the lifetime of the hub's notification stream (C6). Returns
    /// once the stream ends, which in production only happens on shutdown.
    pub async fn run(&self) {
        let mut changes = self.hub.subscribe_scene_state_changes().await;

        while let Some(change) = changes.next().await {
            if !change.is_candidate() {
                continue;
            }

            let Some(scene) = self.inventory.lookup(&change.scene_entity_id) else {
                warn!(scene_id = %change.scene_entity_id, "activation for unknown scene, ignoring");
                continue;
            };
            let scene = Arc::new(scene.clone());

            let now = self.scheduler.now();
            match self.gating.decide(&scene, now) {
                GateDecision::Accept => {
                    let engine = EscalationEngine::new(
                        self.hub.clone(),
                        self.identity.clone(),
                        self.gating.clone(),
                        self.scheduler.clone(),
                        self.tolerances.clone(),
                        self.timing.clone(),
                    );
                    tokio::spawn(async move {
                        engine.run(scene).await;
                    });
                }
                GateDecision::Reject(reason) => {
                    info!(scene_id = %scene.id, ?reason, "activation rejected at gate");
                }
            }
        }
    }
}
