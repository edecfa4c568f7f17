//! Core data types: declared scene state, observed light state, and the
//! identity types that tie resource ids to hub entity ids.

use std::collections::HashSet;

/// The vendor's opaque identifier for a light or scene.
pub type ResourceId = String;
/// The hub's stable identifier for the same resource (`type.name`).
pub type EntityId = String;

/// One of the four attribute classes a comparison can fail on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    OnOff,
    Brightness,
    Color,
    ColorTemp,
}

pub type FailureSet = HashSet<FailureClass>;

/// Declared (x, y) chromaticity in the CIE 1931 color space.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

/// One light's target state within a scene.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Action {
    pub target_rid: ResourceId,
    pub on: bool,
    /// Desired brightness percent in [0, 100].
    pub brightness: Option<f64>,
    pub xy: Option<Xy>,
    /// Desired color temperature in mireds.
    pub mirek: Option<f64>,
}

/// A named, immutable set of per-light target states.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub actions: Vec<Action>,
    pub labels: Vec<String>,
    /// Set when the owning catalog file used the legacy opaque-string action
    /// list rather than structured actions. A legacy scene's `actions` is
    /// always empty; structural comparison against it is never attempted.
    pub legacy: bool,
}

impl Scene {
    pub fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Observed state of a controllable light, read fresh from the hub on every
/// call — never cached by this type.
#[derive(Debug, Clone, PartialEq)]
pub struct LightEntity {
    pub on: bool,
    /// Native 0-255 brightness scale.
    pub brightness: Option<u8>,
    pub xy: Option<Xy>,
    pub mirek: Option<f64>,
}

impl LightEntity {
    /// Observed brightness as a percent in [0, 100], if present.
    pub fn brightness_percent(&self) -> Option<f64> {
        self.brightness.map(|b| b as f64 / 255.0 * 100.0)
    }

    pub fn in_xy_mode(&self) -> bool {
        self.xy.is_some()
    }

    pub fn in_color_temp_mode(&self) -> bool {
        self.mirek.is_some()
    }
}
