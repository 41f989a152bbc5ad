//! Open-ended key/value metadata attached to profiles.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use waybill_core::{DomainError, DomainResult};

/// Metadata map. Keys are ordered so serialized output is stable.
pub type Metadata = BTreeMap<String, JsonValue>;

/// Reject keys that cannot be stored as a plain document field.
///
/// Keys must be non-empty, must not start with `$` and must not contain `.`.
pub fn validate_metadata_key(key: &str) -> DomainResult<()> {
    if key.is_empty() {
        return Err(DomainError::validation("metadata key must not be empty"));
    }
    if key.starts_with('$') {
        return Err(DomainError::validation(format!(
            "metadata key '{key}' must not start with '$'"
        )));
    }
    if key.contains('.') {
        return Err(DomainError::validation(format!(
            "metadata key '{key}' must not contain '.'"
        )));
    }
    Ok(())
}
