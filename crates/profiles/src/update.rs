//! Shallow field updates on a profile.
//!
//! Membership lists and metadata have dedicated operations; this path only
//! touches scalar fields and refuses everything else.

use serde_json::{Map, Value as JsonValue};

use waybill_core::{DomainError, DomainResult};

use crate::profile::{ProfileType, ShippingProfile};

/// Fields that must go through their dedicated operation.
const GUARDED_FIELDS: [&str; 3] = ["metadata", "products", "shipping_options"];

/// A validated shallow update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub profile_type: Option<ProfileType>,
}

impl ProfileUpdate {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Build an update from a raw field map.
    ///
    /// Guarded fields, `id`, and unknown fields fail with `InvalidData`.
    pub fn from_fields(fields: &Map<String, JsonValue>) -> DomainResult<Self> {
        let mut update = Self::default();

        for (key, value) in fields {
            match key.as_str() {
                k if GUARDED_FIELDS.contains(&k) => {
                    return Err(DomainError::invalid_data(format!(
                        "use the dedicated operation to update {k}"
                    )));
                }
                "id" => return Err(DomainError::invalid_data("id cannot be updated")),
                "name" => {
                    let name = value
                        .as_str()
                        .ok_or_else(|| DomainError::invalid_data("name must be a string"))?;
                    update.name = Some(name.to_string());
                }
                "profile_type" => {
                    let raw = value
                        .as_str()
                        .ok_or_else(|| DomainError::invalid_data("profile_type must be a string"))?;
                    let parsed = raw
                        .parse::<ProfileType>()
                        .map_err(|e| DomainError::invalid_data(e.to_string()))?;
                    update.profile_type = Some(parsed);
                }
                other => {
                    return Err(DomainError::invalid_data(format!("unknown field '{other}'")));
                }
            }
        }

        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(DomainError::invalid_data("name must not be empty"));
            }
        }

        Ok(update)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.profile_type.is_none()
    }

    /// Returns `true` if any field changed.
    pub fn apply(&self, profile: &mut ShippingProfile) -> bool {
        let mut changed = false;
        if let Some(name) = &self.name {
            if profile.name != *name {
                profile.name = name.clone();
                changed = true;
            }
        }
        if let Some(profile_type) = self.profile_type {
            if profile.profile_type != profile_type {
                profile.profile_type = profile_type;
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use waybill_core::ProfileId;

    fn fields(v: JsonValue) -> Map<String, JsonValue> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn guarded_fields_are_invalid_data() {
        for patch in [
            json!({ "metadata": { "a": 1 } }),
            json!({ "products": [] }),
            json!({ "shipping_options": [] }),
            json!({ "name": "ok", "products": [] }),
        ] {
            let err = ProfileUpdate::from_fields(&fields(patch)).unwrap_err();
            assert!(matches!(err, DomainError::InvalidData(_)), "{err:?}");
        }
    }

    #[test]
    fn unknown_and_id_fields_are_rejected() {
        assert!(ProfileUpdate::from_fields(&fields(json!({ "id": "x" }))).is_err());
        assert!(ProfileUpdate::from_fields(&fields(json!({ "color": "red" }))).is_err());
    }

    #[test]
    fn parses_scalar_fields() {
        let update = ProfileUpdate::from_fields(&fields(json!({
            "name": "Oversized",
            "profile_type": "gift_card",
        })))
        .unwrap();
        assert_eq!(update.name.as_deref(), Some("Oversized"));
        assert_eq!(update.profile_type, Some(ProfileType::GiftCard));
    }

    #[test]
    fn apply_reports_changes() {
        let mut p = ShippingProfile::new(ProfileId::new(), "A", ProfileType::Custom, Utc::now());
        assert!(ProfileUpdate::name("B").apply(&mut p));
        assert!(!ProfileUpdate::name("B").apply(&mut p));
        assert_eq!(p.name, "B");
    }
}
