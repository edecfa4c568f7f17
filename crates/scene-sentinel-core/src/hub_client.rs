//! `HubClient`: the one capability boundary between this crate and the
//! home-automation hub. Combines C3 (state reads), C5 (actuation), and C6
//! (trigger subscription) behind a single async trait so tests can supply a
//! fake implementation instead of a real network client (SPEC_FULL.md §9,
//! §10.5).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::actuator::DriveCommand;
use crate::error::HubError;
use crate::model::LightEntity;

/// One state-change notification for a scene-typed entity, as delivered by
/// the hub's subscription. `new_state` is the hub's activation marker: any
/// change from `old_state` signals a fresh activation (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneStateChange {
    pub scene_entity_id: String,
    pub old_state: Option<String>,
    pub new_state: String,
}

impl SceneStateChange {
    /// The sentinel value the hub uses to mark an entity with no current
    /// state. A candidate with this new_state is never dispatched (§4.5).
    pub const UNAVAILABLE: &'static str = "unavailable";

    pub fn is_candidate(&self) -> bool {
        !self.new_state.is_empty()
            && self.new_state != Self::UNAVAILABLE
            && self.old_state.as_deref() != Some(self.new_state.as_str())
    }
}

#[async_trait]
pub trait HubClient: Send + Sync {
    /// Subscribe to state-change notifications for every scene-typed entity
    /// known to the hub. The stream runs for the lifetime of the process;
    /// ending it ends the validator's trigger listener (C6).
    async fn subscribe_scene_state_changes(&self) -> BoxStream<'static, SceneStateChange>;

    /// Read a light's current on/off, brightness, xy, and color temperature
    /// (C3). Returns `StateUnavailable` when the hub has no current reading.
    async fn read_light_state(&self, entity_id: &str) -> Result<LightEntity, HubError>;

    /// Activate a scene by its hub entity id (C5).
    async fn activate_scene(&self, scene_entity_id: &str) -> Result<(), HubError>;

    /// Drive a single light toward a resolved command (C5).
    async fn drive_light(&self, entity_id: &str, command: DriveCommand) -> Result<(), HubError>;
}
