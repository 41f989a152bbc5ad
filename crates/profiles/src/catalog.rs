//! Records owned by sibling services (product catalog, shipping options).
//!
//! Profiles only hold references to these; the records themselves are resolved
//! through the collaborator traits in infra.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use waybill_core::{DomainError, DomainResult, ProductId, RegionId, ShippingOptionId};

use crate::cart::Cart;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub is_giftcard: bool,
}

impl Product {
    pub fn new(id: ProductId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            is_giftcard: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingPriceType {
    FlatRate,
    Calculated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    MinSubtotal,
    MaxSubtotal,
}

/// A price threshold the cart must satisfy for the option to be offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRequirement {
    pub kind: RequirementKind,
    pub amount: u64,
}

impl ShippingRequirement {
    pub fn min_subtotal(amount: u64) -> Self {
        Self {
            kind: RequirementKind::MinSubtotal,
            amount,
        }
    }

    pub fn max_subtotal(amount: u64) -> Self {
        Self {
            kind: RequirementKind::MaxSubtotal,
            amount,
        }
    }

    pub fn is_satisfied_by(&self, subtotal: u64) -> bool {
        match self.kind {
            RequirementKind::MinSubtotal => subtotal >= self.amount,
            RequirementKind::MaxSubtotal => subtotal <= self.amount,
        }
    }
}

/// A fulfillment method with price/requirement rules, scoped to a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingOption {
    pub id: ShippingOptionId,
    pub name: String,
    pub region_id: RegionId,
    pub provider_id: String,
    pub price_type: ShippingPriceType,
    /// Flat price in the smallest currency unit; `None` for calculated options.
    pub amount: Option<u64>,
    #[serde(default)]
    pub requirements: Vec<ShippingRequirement>,
    #[serde(default)]
    pub is_return: bool,
    #[serde(default)]
    pub data: Map<String, JsonValue>,
}

impl ShippingOption {
    pub fn flat_rate(
        id: ShippingOptionId,
        name: impl Into<String>,
        region_id: RegionId,
        amount: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            region_id,
            provider_id: "manual".to_string(),
            price_type: ShippingPriceType::FlatRate,
            amount: Some(amount),
            requirements: Vec::new(),
            is_return: false,
            data: Map::new(),
        }
    }

    pub fn with_requirement(mut self, requirement: ShippingRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Check whether this option may be offered for `cart`.
    ///
    /// The option must be an outbound option in the cart's region and every
    /// requirement must hold against the cart subtotal.
    pub fn check_cart_eligibility(&self, cart: &Cart) -> DomainResult<()> {
        if self.is_return {
            return Err(DomainError::validation(format!(
                "shipping option {} is a return option",
                self.id
            )));
        }
        if self.region_id != cart.region_id {
            return Err(DomainError::validation(format!(
                "shipping option {} is not available in region {}",
                self.id, cart.region_id
            )));
        }
        let subtotal = cart.subtotal();
        if let Some(failed) = self.requirements.iter().find(|r| !r.is_satisfied_by(subtotal)) {
            return Err(DomainError::validation(format!(
                "shipping option {} requirement {:?} {} not met by subtotal {subtotal}",
                self.id, failed.kind, failed.amount
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{ItemContent, LineItem};

    fn cart_in(region: RegionId, subtotal: u64) -> Cart {
        Cart::new(region).with_item(LineItem::simple(
            "item",
            ItemContent::new(ProductId::new(), 1, subtotal),
        ))
    }

    #[test]
    fn eligible_in_same_region_without_requirements() {
        let region = RegionId::new();
        let opt = ShippingOption::flat_rate(ShippingOptionId::new(), "Standard", region, 500);
        assert!(opt.check_cart_eligibility(&cart_in(region, 1000)).is_ok());
    }

    #[test]
    fn rejected_in_other_region() {
        let opt = ShippingOption::flat_rate(ShippingOptionId::new(), "Standard", RegionId::new(), 500);
        assert!(opt.check_cart_eligibility(&cart_in(RegionId::new(), 1000)).is_err());
    }

    #[test]
    fn subtotal_thresholds_apply() {
        let region = RegionId::new();
        let opt = ShippingOption::flat_rate(ShippingOptionId::new(), "Free", region, 0)
            .with_requirement(ShippingRequirement::min_subtotal(5000))
            .with_requirement(ShippingRequirement::max_subtotal(20000));
        assert!(opt.check_cart_eligibility(&cart_in(region, 4999)).is_err());
        assert!(opt.check_cart_eligibility(&cart_in(region, 5000)).is_ok());
        assert!(opt.check_cart_eligibility(&cart_in(region, 20001)).is_err());
    }

    #[test]
    fn return_options_are_never_offered() {
        let region = RegionId::new();
        let mut opt = ShippingOption::flat_rate(ShippingOptionId::new(), "Return", region, 0);
        opt.is_return = true;
        assert!(opt.check_cart_eligibility(&cart_in(region, 100)).is_err());
    }
}
