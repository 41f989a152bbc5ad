//! `waybill-core`: shared domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{CartId, LineItemId, ProductId, ProfileId, RegionId, ShippingOptionId};
