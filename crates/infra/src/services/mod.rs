//! Sibling-service boundaries: product lookup and shipping options.
//!
//! The profile store only holds references; these traits resolve them into
//! records. In-memory implementations back tests and local development.

pub mod in_memory;

use std::sync::Arc;

use thiserror::Error;

use waybill_core::{ProductId, ShippingOptionId};
use waybill_profiles::{Cart, Product, ShippingOption};

pub use in_memory::{InMemoryProductService, InMemoryShippingOptionService};

/// Collaborator failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The option exists but may not be offered for this cart.
    #[error("ineligible: {0}")]
    Ineligible(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait ProductService: Send + Sync {
    async fn retrieve(&self, product_id: ProductId) -> Result<Product, ServiceError>;
}

#[async_trait::async_trait]
pub trait ShippingOptionService: Send + Sync {
    async fn retrieve(&self, option_id: ShippingOptionId) -> Result<ShippingOption, ServiceError>;

    /// Resolve the option if it may be offered for `cart` (region, price
    /// thresholds, requirements); fail otherwise.
    async fn validate_cart_option(
        &self,
        option_id: ShippingOptionId,
        cart: &Cart,
    ) -> Result<ShippingOption, ServiceError>;
}

#[async_trait::async_trait]
impl<S> ProductService for Arc<S>
where
    S: ProductService + ?Sized,
{
    async fn retrieve(&self, product_id: ProductId) -> Result<Product, ServiceError> {
        (**self).retrieve(product_id).await
    }
}

#[async_trait::async_trait]
impl<S> ShippingOptionService for Arc<S>
where
    S: ShippingOptionService + ?Sized,
{
    async fn retrieve(&self, option_id: ShippingOptionId) -> Result<ShippingOption, ServiceError> {
        (**self).retrieve(option_id).await
    }

    async fn validate_cart_option(
        &self,
        option_id: ShippingOptionId,
        cart: &Cart,
    ) -> Result<ShippingOption, ServiceError> {
        (**self).validate_cart_option(option_id, cart).await
    }
}
