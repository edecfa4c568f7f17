//! Inventory Store (C1): loads scene catalogs from a directory and answers
//! "what is the declared end-state for scene S?"

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::InventoryError;
use crate::model::{Action, Scene, Xy};

/// Read-only after construction; holds every scene loaded across every
/// catalog file in the inventory directory.
#[derive(Debug, Default)]
pub struct Inventory {
    scenes: HashMap<String, Scene>,
}

impl Inventory {
    pub fn lookup(&self, scene_id: &str) -> Option<&Scene> {
        self.scenes.get(scene_id)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Load every catalog file directly inside `dir`. At least one file must
    /// load successfully; individual malformed files are logged and skipped
    /// rather than aborting the whole load.
    pub fn load_from_dir(dir: &Path) -> Result<Self, InventoryError> {
        if !dir.is_dir() {
            return Err(InventoryError::Missing(dir.to_path_buf()));
        }

        let mut scenes = HashMap::new();
        let mut loaded_any = false;

        let mut entries: Vec<_> = fs::read_dir(dir)
            .map_err(|_| InventoryError::Missing(dir.to_path_buf()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        entries.sort();

        for path in entries {
            match load_catalog_file(&path) {
                Ok(catalog_scenes) => {
                    loaded_any = true;
                    for scene in catalog_scenes {
                        if scenes.contains_key(&scene.id) {
                            warn!(scene_id = %scene.id, file = %path.display(), "duplicate scene id, later catalog wins");
                        }
                        scenes.insert(scene.id.clone(), scene);
                    }
                }
                Err(err) => {
                    warn!(file = %path.display(), %err, "skipping malformed catalog file");
                }
            }
        }

        if !loaded_any {
            return Err(InventoryError::Missing(dir.to_path_buf()));
        }

        Ok(Self { scenes })
    }
}

fn load_catalog_file(path: &Path) -> Result<Vec<Scene>, InventoryError> {
    let malformed = |reason: String| InventoryError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let contents = fs::read_to_string(path).map_err(|e| malformed(e.to_string()))?;
    let document: CatalogDocument =
        serde_json::from_str(&contents).map_err(|e| malformed(e.to_string()))?;

    document
        .resources
        .scenes
        .items
        .into_iter()
        .map(RawScene::into_scene)
        .collect::<Result<Vec<Scene>, String>>()
        .map_err(malformed)
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    resources: CatalogResources,
}

#[derive(Debug, Deserialize)]
struct CatalogResources {
    scenes: CatalogScenes,
}

#[derive(Debug, Deserialize)]
struct CatalogScenes {
    items: Vec<RawScene>,
}

#[derive(Debug, Deserialize)]
struct RawScene {
    id: String,
    metadata: RawMetadata,
    #[serde(default)]
    labels: Vec<String>,
    actions: RawActionList,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    name: String,
}

/// Either a list of structured actions, or (the legacy form) a list of
/// opaque strings that cannot be structurally validated.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawActionList {
    Structured(Vec<RawAction>),
    Legacy(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawAction {
    target: RawTarget,
    action: RawActionBody,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    rid: String,
}

#[derive(Debug, Deserialize)]
struct RawActionBody {
    on: RawOn,
    dimming: Option<RawDimming>,
    color: Option<RawColor>,
    color_temperature: Option<RawColorTemperature>,
}

#[derive(Debug, Deserialize)]
struct RawOn {
    on: bool,
}

#[derive(Debug, Deserialize)]
struct RawDimming {
    brightness: f64,
}

#[derive(Debug, Deserialize)]
struct RawColor {
    xy: RawXy,
}

#[derive(Debug, Deserialize)]
struct RawXy {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct RawColorTemperature {
    mirek: f64,
}

impl RawScene {
    fn into_scene(self) -> Result<Scene, String> {
        match self.actions {
            RawActionList::Structured(raw_actions) => {
                let actions = raw_actions
                    .into_iter()
                    .map(|raw| Action {
                        target_rid: raw.target.rid,
                        on: raw.action.on.on,
                        brightness: raw.action.dimming.map(|d| d.brightness),
                        xy: raw.action.color.map(|c| Xy {
                            x: c.xy.x,
                            y: c.xy.y,
                        }),
                        mirek: raw.action.color_temperature.map(|t| t.mirek),
                    })
                    .collect();
                Ok(Scene {
                    id: self.id,
                    name: self.metadata.name,
                    actions,
                    labels: self.labels,
                    legacy: false,
                })
            }
            RawActionList::Legacy(_) => Ok(Scene {
                id: self.id,
                name: self.metadata.name,
                actions: Vec::new(),
                labels: self.labels,
                legacy: true,
            }),
        }
    }
}
