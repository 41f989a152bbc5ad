//! Profile selectors: equality and "contains any of" predicates.
//!
//! A selector is a conjunction of optional predicates. Backends translate it to
//! their own query language; `matches` is the reference evaluation used by the
//! in-memory backend.

use serde::{Deserialize, Serialize};

use waybill_core::{ProductId, ProfileId, ShippingOptionId};

use crate::profile::{ProfileType, ShippingProfile};

/// Predicate on one field.
///
/// On a scalar field `Eq` is equality and `In` is set membership. On a list
/// field `Eq` means "list contains the value" and `In` means "list contains
/// any of the values". `In` with an empty set matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Match<T> {
    Eq(T),
    In(Vec<T>),
}

impl<T: PartialEq> Match<T> {
    pub fn matches_value(&self, value: &T) -> bool {
        match self {
            Match::Eq(expected) => expected == value,
            Match::In(set) => set.contains(value),
        }
    }

    pub fn matches_list(&self, list: &[T]) -> bool {
        match self {
            Match::Eq(expected) => list.contains(expected),
            Match::In(set) => set.iter().any(|v| list.contains(v)),
        }
    }
}

/// Conjunction of optional predicates over profile fields.
///
/// The default selector matches every profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSelector {
    pub id: Option<Match<ProfileId>>,
    pub products: Option<Match<ProductId>>,
    pub shipping_options: Option<Match<ShippingOptionId>>,
    pub profile_type: Option<ProfileType>,
}

impl ProfileSelector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: ProfileId) -> Self {
        Self {
            id: Some(Match::Eq(id)),
            ..Self::default()
        }
    }

    pub fn by_product(product_id: ProductId) -> Self {
        Self {
            products: Some(Match::Eq(product_id)),
            ..Self::default()
        }
    }

    pub fn by_any_product(product_ids: Vec<ProductId>) -> Self {
        Self {
            products: Some(Match::In(product_ids)),
            ..Self::default()
        }
    }

    pub fn by_shipping_option(option_id: ShippingOptionId) -> Self {
        Self {
            shipping_options: Some(Match::Eq(option_id)),
            ..Self::default()
        }
    }

    pub fn by_type(profile_type: ProfileType) -> Self {
        Self {
            profile_type: Some(profile_type),
            ..Self::default()
        }
    }

    pub fn with_shipping_options(mut self, options: Match<ShippingOptionId>) -> Self {
        self.shipping_options = Some(options);
        self
    }

    pub fn with_type(mut self, profile_type: ProfileType) -> Self {
        self.profile_type = Some(profile_type);
        self
    }

    pub fn matches(&self, profile: &ShippingProfile) -> bool {
        if let Some(m) = &self.id {
            if !m.matches_value(&profile.id) {
                return false;
            }
        }
        if let Some(m) = &self.products {
            if !m.matches_list(&profile.products) {
                return false;
            }
        }
        if let Some(m) = &self.shipping_options {
            if !m.matches_list(&profile.shipping_options) {
                return false;
            }
        }
        if let Some(t) = self.profile_type {
            if profile.profile_type != t {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile_with(products: &[ProductId], options: &[ShippingOptionId]) -> ShippingProfile {
        let mut p = ShippingProfile::new(ProfileId::new(), "p", ProfileType::Custom, Utc::now());
        for id in products {
            p.add_product(*id);
        }
        for id in options {
            p.add_shipping_option(*id);
        }
        p
    }

    #[test]
    fn default_selector_matches_everything() {
        assert!(ProfileSelector::all().matches(&profile_with(&[], &[])));
    }

    #[test]
    fn by_id_matches_only_that_profile() {
        let a = profile_with(&[], &[]);
        let b = profile_with(&[], &[]);
        let sel = ProfileSelector::by_id(a.id);
        assert!(sel.matches(&a));
        assert!(!sel.matches(&b));
    }

    #[test]
    fn any_product_uses_intersection() {
        let (p1, p2, p3) = (ProductId::new(), ProductId::new(), ProductId::new());
        let profile = profile_with(&[p1, p2], &[]);
        assert!(ProfileSelector::by_any_product(vec![p3, p2]).matches(&profile));
        assert!(!ProfileSelector::by_any_product(vec![p3]).matches(&profile));
    }

    #[test]
    fn empty_in_matches_nothing() {
        let profile = profile_with(&[ProductId::new()], &[]);
        assert!(!ProfileSelector::by_any_product(vec![]).matches(&profile));
    }

    #[test]
    fn predicates_are_conjunctive() {
        let opt = ShippingOptionId::new();
        let profile = profile_with(&[], &[opt]);
        let sel = ProfileSelector::by_shipping_option(opt).with_type(ProfileType::Default);
        assert!(!sel.matches(&profile));
        let sel = ProfileSelector::by_shipping_option(opt).with_type(ProfileType::Custom);
        assert!(sel.matches(&profile));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn in_matches_iff_some_eq_matches(
                held in prop::collection::vec(0usize..8, 0..8),
                wanted in prop::collection::vec(0usize..8, 0..8),
            ) {
                let pool: Vec<ProductId> = (0..8).map(|_| ProductId::new()).collect();
                let held_ids: Vec<ProductId> = held.iter().map(|i| pool[*i]).collect();
                let wanted_ids: Vec<ProductId> = wanted.iter().map(|i| pool[*i]).collect();
                let profile = profile_with(&held_ids, &[]);

                let any = ProfileSelector::by_any_product(wanted_ids.clone()).matches(&profile);
                let some_eq = wanted_ids
                    .iter()
                    .any(|id| ProfileSelector::by_product(*id).matches(&profile));
                prop_assert_eq!(any, some_eq);
            }
        }
    }
}
