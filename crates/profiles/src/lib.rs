//! Shipping profiles domain module.
//!
//! This crate contains the profile record, its membership rules, the cart shape
//! used for option resolution, and the selector/projection helpers, implemented
//! purely as deterministic domain logic (no IO, no storage).

pub mod cart;
pub mod catalog;
pub mod decorate;
pub mod metadata;
pub mod profile;
pub mod selector;
pub mod update;

pub use cart::{Cart, ItemContent, LineItem, LineItemContent};
pub use catalog::{
    Product, RequirementKind, ShippingOption, ShippingPriceType, ShippingRequirement,
};
pub use decorate::{ProfileExpand, project};
pub use metadata::{Metadata, validate_metadata_key};
pub use profile::{
    DEFAULT_PROFILE_NAME, GIFT_CARD_PROFILE_NAME, ProfileType, ShippingProfile,
};
pub use selector::{Match, ProfileSelector};
pub use update::ProfileUpdate;
