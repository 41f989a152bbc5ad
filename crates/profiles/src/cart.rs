//! Cart shape consumed by shipping option resolution.
//!
//! Carts are created and priced elsewhere; this is the subset of their state
//! that profile resolution and option eligibility read.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use waybill_core::{CartId, LineItemId, ProductId, RegionId};

/// One product reference inside a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemContent {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price in the smallest currency unit (e.g. cents).
    pub unit_price: u64,
}

impl ItemContent {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: u64) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }

    pub fn total(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

/// A line item holds either one product reference or a bundle of them.
///
/// On the wire a simple item is an object and a bundle is an array of objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineItemContent {
    Simple(ItemContent),
    Bundle(Vec<ItemContent>),
}

impl LineItemContent {
    pub fn contents(&self) -> &[ItemContent] {
        match self {
            LineItemContent::Simple(c) => core::slice::from_ref(c),
            LineItemContent::Bundle(items) => items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub title: String,
    pub content: LineItemContent,
}

impl LineItem {
    pub fn simple(title: impl Into<String>, content: ItemContent) -> Self {
        Self {
            id: LineItemId::new(),
            title: title.into(),
            content: LineItemContent::Simple(content),
        }
    }

    pub fn bundle(title: impl Into<String>, contents: Vec<ItemContent>) -> Self {
        Self {
            id: LineItemId::new(),
            title: title.into(),
            content: LineItemContent::Bundle(contents),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub region_id: RegionId,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

impl Cart {
    pub fn new(region_id: RegionId) -> Self {
        Self {
            id: CartId::new(),
            region_id,
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }

    /// Distinct product ids referenced by the cart, in first-appearance order.
    pub fn distinct_product_ids(&self) -> Vec<ProductId> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .flat_map(|item| item.content.contents())
            .map(|c| c.product_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Sum of all line item totals.
    pub fn subtotal(&self) -> u64 {
        self.items
            .iter()
            .flat_map(|item| item.content.contents())
            .fold(0u64, |acc, c| acc.saturating_add(c.total()))
    }
}
