//! Cart shipping option resolution.
//!
//! ```text
//! Cart
//!   ↓
//! 1. distinct product ids (simple + bundle line items)
//!   ↓
//! 2. profiles whose products contain any of them
//!   ↓
//! 3. their shipping option ids, deduplicated in discovery order
//!   ↓
//! 4. validate_cart_option per id, concurrently; failures drop that option only
//!   ↓
//! Offered options, in discovery order
//! ```

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::debug;

use waybill_profiles::{Cart, ProfileSelector, ShippingOption};

use crate::profile_store::{ProfileStore, ProfileStoreResult, distinct_option_ids};
use crate::services::ShippingOptionService;

/// Default cap on in-flight validations per resolution.
pub const DEFAULT_VALIDATION_CONCURRENCY: usize = 8;

/// Computes which shipping options a cart may be offered.
#[derive(Clone)]
pub struct CartOptionResolver {
    profiles: ProfileStore,
    options: Arc<dyn ShippingOptionService>,
    concurrency: usize,
}

impl CartOptionResolver {
    pub fn new(profiles: ProfileStore, options: Arc<dyn ShippingOptionService>) -> Self {
        Self {
            profiles,
            options,
            concurrency: DEFAULT_VALIDATION_CONCURRENCY,
        }
    }

    /// Resolver that validates through the profile store's own option service.
    pub fn from_store(profiles: ProfileStore) -> Self {
        let options = profiles.shipping_options();
        Self::new(profiles, options)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Options offered for `cart`.
    ///
    /// A cart whose products match no profile yields an empty list without
    /// consulting the option service. Validation errors are not surfaced: an
    /// option that fails validation for any reason is simply not offered.
    /// Store faults while finding profiles are returned.
    pub async fn fetch_cart_options(&self, cart: &Cart) -> ProfileStoreResult<Vec<ShippingOption>> {
        let product_ids = cart.distinct_product_ids();
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let profiles = self
            .profiles
            .list(&ProfileSelector::by_any_product(product_ids))
            .await?;
        if profiles.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = distinct_option_ids(&profiles);
        let candidate_count = candidates.len();

        let offered: Vec<ShippingOption> = stream::iter(candidates)
            .map(|option_id| self.options.validate_cart_option(option_id, cart))
            .buffered(self.concurrency)
            .filter_map(|outcome| async move { outcome.ok() })
            .collect()
            .await;

        debug!(
            cart_id = %cart.id,
            profiles = profiles.len(),
            candidates = candidate_count,
            offered = offered.len(),
            "resolved cart shipping options"
        );
        Ok(offered)
    }
}
