use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use waybill_core::{ProductId, ProfileId, ShippingOptionId};

use crate::metadata::Metadata;

/// Name of the singleton profile that catches products with no dedicated profile.
pub const DEFAULT_PROFILE_NAME: &str = "Default Shipping Profile";

/// Name of the singleton profile used for gift cards.
pub const GIFT_CARD_PROFILE_NAME: &str = "Gift Card Profile";

/// Kind of shipping profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    Default,
    GiftCard,
    Custom,
}

impl ProfileType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileType::Default => "default",
            ProfileType::GiftCard => "gift_card",
            ProfileType::Custom => "custom",
        }
    }
}

impl core::str::FromStr for ProfileType {
    type Err = waybill_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(ProfileType::Default),
            "gift_card" => Ok(ProfileType::GiftCard),
            "custom" => Ok(ProfileType::Custom),
            other => Err(waybill_core::DomainError::validation(format!(
                "unknown profile type '{other}' (expected default, gift_card or custom)"
            ))),
        }
    }
}

/// A grouping of catalog products that share a set of applicable shipping options.
///
/// Membership lists behave as sets: the helpers below never insert a duplicate
/// and report whether the list actually changed, so callers can skip no-op writes.
/// Profiles may overlap on products; a shipping option is held by at most one
/// profile, which is enforced by the store (see `assign_option` in infra).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingProfile {
    pub id: ProfileId,
    pub name: String,
    pub profile_type: ProfileType,
    pub products: Vec<ProductId>,
    pub shipping_options: Vec<ShippingOptionId>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShippingProfile {
    /// A fresh profile with empty product/option sets and no metadata.
    pub fn new(id: ProfileId, name: impl Into<String>, profile_type: ProfileType, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            profile_type,
            products: Vec::new(),
            shipping_options: Vec::new(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_product(&self, product_id: ProductId) -> bool {
        self.products.contains(&product_id)
    }

    pub fn has_shipping_option(&self, option_id: ShippingOptionId) -> bool {
        self.shipping_options.contains(&option_id)
    }

    /// Returns `true` if the product was appended.
    pub fn add_product(&mut self, product_id: ProductId) -> bool {
        if self.has_product(product_id) {
            return false;
        }
        self.products.push(product_id);
        true
    }

    /// Returns `true` if the product was removed.
    pub fn remove_product(&mut self, product_id: ProductId) -> bool {
        let before = self.products.len();
        self.products.retain(|p| *p != product_id);
        self.products.len() != before
    }

    /// Returns `true` if the option was appended.
    pub fn add_shipping_option(&mut self, option_id: ShippingOptionId) -> bool {
        if self.has_shipping_option(option_id) {
            return false;
        }
        self.shipping_options.push(option_id);
        true
    }

    /// Returns `true` if the option was removed.
    pub fn remove_shipping_option(&mut self, option_id: ShippingOptionId) -> bool {
        let before = self.shipping_options.len();
        self.shipping_options.retain(|o| *o != option_id);
        self.shipping_options.len() != before
    }

    /// Set one metadata key, leaving the others untouched.
    ///
    /// Returns `true` if the stored value changed. Keys are checked with
    /// [`validate_metadata_key`](crate::metadata::validate_metadata_key) before they reach a profile.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: JsonValue) -> bool {
        let key = key.into();
        if self.metadata.get(&key) == Some(&value) {
            return false;
        }
        self.metadata.insert(key, value);
        true
    }

    /// Returns `true` if the key was present.
    pub fn delete_metadata(&mut self, key: &str) -> bool {
        self.metadata.remove(key).is_some()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile() -> ShippingProfile {
        ShippingProfile::new(ProfileId::new(), "Heavy goods", ProfileType::Custom, Utc::now())
    }

    #[test]
    fn new_profile_has_empty_membership() {
        let p = profile();
        assert!(p.products.is_empty());
        assert!(p.shipping_options.is_empty());
        assert!(p.metadata.is_empty());
        assert_eq!(p.created_at, p.updated_at);
    }

    #[test]
    fn add_product_is_idempotent() {
        let mut p = profile();
        let product = ProductId::new();
        assert!(p.add_product(product));
        assert!(!p.add_product(product));
        assert_eq!(p.products, vec![product]);
    }

    #[test]
    fn remove_missing_product_is_noop() {
        let mut p = profile();
        p.add_product(ProductId::new());
        assert!(!p.remove_product(ProductId::new()));
        assert_eq!(p.products.len(), 1);
    }

    #[test]
    fn option_membership_is_idempotent() {
        let mut p = profile();
        let opt = ShippingOptionId::new();
        assert!(p.add_shipping_option(opt));
        assert!(!p.add_shipping_option(opt));
        assert!(p.remove_shipping_option(opt));
        assert!(!p.remove_shipping_option(opt));
        assert!(p.shipping_options.is_empty());
    }

    #[test]
    fn set_metadata_merges_keys() {
        let mut p = profile();
        assert!(p.set_metadata("carrier", json!("dhl")));
        assert!(p.set_metadata("fragile", json!(true)));
        assert!(!p.set_metadata("fragile", json!(true)));
        assert!(p.set_metadata("carrier", json!("ups")));
        assert_eq!(p.metadata.len(), 2);
        assert_eq!(p.metadata["carrier"], json!("ups"));
        assert_eq!(p.metadata["fragile"], json!(true));
    }

    #[test]
    fn delete_metadata_reports_presence() {
        let mut p = profile();
        p.set_metadata("carrier", json!("dhl"));
        assert!(p.delete_metadata("carrier"));
        assert!(!p.delete_metadata("carrier"));
    }

    #[test]
    fn profile_type_parses_wire_names() {
        for t in [ProfileType::Default, ProfileType::GiftCard, ProfileType::Custom] {
            assert_eq!(t.as_str().parse::<ProfileType>().unwrap(), t);
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
        assert!("express".parse::<ProfileType>().is_err());
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            #[test]
            fn products_never_contain_duplicates(picks in prop::collection::vec(0usize..6, 0..40)) {
                let pool: Vec<ProductId> = (0..6).map(|_| ProductId::new()).collect();
                let mut p = profile();
                for (i, pick) in picks.iter().enumerate() {
                    if i % 3 == 2 {
                        p.remove_product(pool[*pick]);
                    } else {
                        p.add_product(pool[*pick]);
                    }
                }
                let mut sorted = p.products.clone();
                sorted.sort();
                sorted.dedup();
                prop_assert_eq!(sorted.len(), p.products.len());
            }

            #[test]
            fn add_twice_equals_add_once(n in 1usize..10) {
                let ids: Vec<ShippingOptionId> = (0..n).map(|_| ShippingOptionId::new()).collect();
                let mut once = profile();
                let mut twice = once.clone();
                for id in &ids {
                    once.add_shipping_option(*id);
                    twice.add_shipping_option(*id);
                    twice.add_shipping_option(*id);
                }
                prop_assert_eq!(once.shipping_options, twice.shipping_options);
            }
        }
    }
}
