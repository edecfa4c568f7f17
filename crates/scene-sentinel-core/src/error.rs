//! Error taxonomy. Boundary errors (inventory load, identity registry load,
//! hub I/O) are typed enums callers can match on; nothing below this module
//! escapes a validation run as a propagated `Result` — each run terminates
//! in exactly one success/failure report to the gating layer instead (§7).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory directory {0} does not exist or contains no catalog files")]
    Missing(PathBuf),
    #[error("catalog file {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("entity registry file {path} could not be read: {reason}")]
    RegistryUnreadable { path: PathBuf, reason: String },
    #[error("entity registry file {path} is not valid: {reason}")]
    RegistryMalformed { path: PathBuf, reason: String },
}

/// Per-light or per-call hub I/O failure. Never aborts a phase; the caller
/// records it against the current light's comparison and continues with
/// the remaining lights in the same phase.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("state read for {entity_id} returned no data")]
    StateUnavailable { entity_id: EntityIdOwned },
    #[error("hub call failed for {entity_id}: {reason}")]
    CallFailed {
        entity_id: EntityIdOwned,
        reason: String,
    },
}

type EntityIdOwned = String;
