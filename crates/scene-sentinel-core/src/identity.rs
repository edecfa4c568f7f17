//! Identity Resolver (C2): builds a `resource-id -> entity-id` map once at
//! startup from the hub's local entity registry and never reloads it (an
//! open question in the original source, resolved in favor of "stale is
//! fine" — see SPEC_FULL.md §9).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::IdentityError;

/// The integration's platform name as recorded in the hub's entity
/// registry. Entries from other platforms are not part of this validator's
/// identity space.
const PLATFORM: &str = "hue";

#[derive(Debug, Default)]
pub struct IdentityMap {
    by_unique_id: HashMap<String, String>,
}

impl IdentityMap {
    /// Resolve a vendor resource-id to a hub entity-id: exact match first,
    /// then a match against any key that ends with `rid` or contains
    /// `_<rid>` or `-<rid>` anywhere, to accommodate composite hub ids.
    /// Ambiguous matches (more than one candidate) are treated as a miss
    /// rather than guessed.
    pub fn resolve(&self, rid: &str) -> Option<&str> {
        if let Some(entity_id) = self.by_unique_id.get(rid) {
            return Some(entity_id);
        }

        let suffix_underscore = format!("_{rid}");
        let suffix_dash = format!("-{rid}");
        let mut candidates = self.by_unique_id.iter().filter(|(unique_id, _)| {
            unique_id.ends_with(rid)
                || unique_id.contains(&suffix_underscore)
                || unique_id.contains(&suffix_dash)
        });

        let first = candidates.next()?;
        if candidates.next().is_some() {
            return None;
        }
        Some(first.1.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_unique_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_unique_id.is_empty()
    }

    pub fn load_from_registry(path: &Path) -> Result<Self, IdentityError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| IdentityError::RegistryUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let registry: RegistryDocument =
            serde_json::from_str(&contents).map_err(|e| IdentityError::RegistryMalformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let by_unique_id = registry
            .data
            .entities
            .into_iter()
            .filter(|entry| entry.platform == PLATFORM)
            .map(|entry| (entry.unique_id, entry.entity_id))
            .collect();

        Ok(Self { by_unique_id })
    }
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    data: RegistryData,
}

#[derive(Debug, Deserialize)]
struct RegistryData {
    entities: Vec<RegistryEntry>,
}

#[derive(Debug, Deserialize)]
struct RegistryEntry {
    unique_id: String,
    entity_id: String,
    platform: String,
}
