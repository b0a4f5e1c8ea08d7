//! Staleness fingerprint for priced snapshots.
//!
//! SHA-256 over the canonical rendering of the (tree version, explicit
//! selections, environment) triple. Purely a cache-invalidation key,
//! never a security boundary.

use crate::canonical::{canonicalize, CanonicalError};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Compute the hex fingerprint for a pricing request.
///
/// The same inputs always produce the same digest regardless of JSON
/// key order in `explicit_selections` or `env`.
pub fn signature(
    tree_version_id: &str,
    explicit_selections: &Value,
    env: &Value,
) -> Result<String, CanonicalError> {
    let payload = json!({
        "env": env,
        "explicitSelections": explicit_selections,
        "treeVersionId": tree_version_id,
    });
    let canon = canonicalize(&payload)?;
    let mut hasher = Sha256::new();
    hasher.update(canon.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
