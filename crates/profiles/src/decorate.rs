//! Field projection for profile responses.
//!
//! `project` is the pure half of decoration: it picks the requested fields and
//! always keeps `id` and `metadata`. Expansion of reference lists into full
//! records needs the collaborators and lives in infra.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use waybill_core::{DomainError, DomainResult};

use crate::profile::ShippingProfile;

/// Reference lists that can be expanded into full records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileExpand {
    Products,
    ShippingOptions,
}

impl ProfileExpand {
    pub fn field_name(self) -> &'static str {
        match self {
            ProfileExpand::Products => "products",
            ProfileExpand::ShippingOptions => "shipping_options",
        }
    }
}

impl core::str::FromStr for ProfileExpand {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "products" => Ok(ProfileExpand::Products),
            "shipping_options" => Ok(ProfileExpand::ShippingOptions),
            other => Err(DomainError::validation(format!(
                "cannot expand '{other}' (expected products or shipping_options)"
            ))),
        }
    }
}

/// Project `profile` down to `fields`, plus `id` and `metadata`.
///
/// Unknown field names are skipped.
pub fn project(profile: &ShippingProfile, fields: &[&str]) -> DomainResult<Map<String, JsonValue>> {
    let full = match serde_json::to_value(profile) {
        Ok(JsonValue::Object(map)) => map,
        Ok(_) => return Err(DomainError::invalid_data("profile did not serialize to an object")),
        Err(e) => return Err(DomainError::invalid_data(format!("profile serialization failed: {e}"))),
    };

    let mut out = Map::new();
    for key in ["id", "metadata"].into_iter().chain(fields.iter().copied()) {
        if let Some(value) = full.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }
    Ok(out)
}
