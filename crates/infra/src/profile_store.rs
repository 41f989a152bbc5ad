//! Shipping profile store (application-level service).
//!
//! Wraps a [`ProfileDocumentStore`] with the caller-facing operations: id
//! parsing, existence checks, collaborator lookups, guarded updates and
//! idempotent membership changes. All caller errors surface as
//! [`ProfileStoreError`]; storage faults are wrapped with their cause.
//!
//! ```text
//! add_shipping_option(profile, option)
//!   ↓
//! 1. parse ids (InvalidArgument)
//!   ↓
//! 2. retrieve profile (NotFound) + retrieve option via collaborator (NotFound)
//!   ↓
//! 3. no-op if already held
//!   ↓
//! 4. assign_option: detach from previous holder + attach, atomically
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::{join_all, try_join_all};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, instrument};

use waybill_core::{DomainError, ProductId, ProfileId, ShippingOptionId};
use waybill_profiles::{
    DEFAULT_PROFILE_NAME, GIFT_CARD_PROFILE_NAME, ProfileExpand, ProfileSelector, ProfileType,
    ProfileUpdate, ShippingOption, ShippingProfile, project, validate_metadata_key,
};

use crate::document_store::{
    DocumentStoreError, OptionAssignment, ProfileDocumentStore, ProfilePatch,
};
use crate::services::{ProductService, ServiceError, ShippingOptionService};

pub type ProfileStoreResult<T> = Result<T, ProfileStoreError>;

#[derive(Debug, Error)]
pub enum ProfileStoreError {
    /// Malformed identifier or metadata key.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A field was written through the wrong operation.
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] DocumentStoreError),

    /// A collaborator failed for a reason other than a missing record.
    #[error("collaborator error: {0}")]
    Collaborator(#[source] ServiceError),
}

impl From<DomainError> for ProfileStoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidId(msg) | DomainError::Validation(msg) => {
                ProfileStoreError::InvalidArgument(msg)
            }
            DomainError::InvalidData(msg) | DomainError::Conflict(msg) => {
                ProfileStoreError::InvalidData(msg)
            }
            DomainError::NotFound(msg) => ProfileStoreError::NotFound(msg),
        }
    }
}

impl From<ServiceError> for ProfileStoreError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::NotFound(msg) => ProfileStoreError::NotFound(msg),
            other => ProfileStoreError::Collaborator(other),
        }
    }
}

/// Turn a uniqueness conflict from the store into a caller error.
fn conflict_as_invalid_data(err: DocumentStoreError) -> ProfileStoreError {
    match err {
        DocumentStoreError::Conflict(msg) => ProfileStoreError::InvalidData(msg),
        other => ProfileStoreError::Storage(other),
    }
}

/// Caller-facing shipping profile operations.
#[derive(Clone)]
pub struct ProfileStore {
    store: Arc<dyn ProfileDocumentStore>,
    products: Arc<dyn ProductService>,
    options: Arc<dyn ShippingOptionService>,
}

impl ProfileStore {
    pub fn new(
        store: Arc<dyn ProfileDocumentStore>,
        products: Arc<dyn ProductService>,
        options: Arc<dyn ShippingOptionService>,
    ) -> Self {
        Self {
            store,
            products,
            options,
        }
    }

    pub fn shipping_options(&self) -> Arc<dyn ShippingOptionService> {
        self.options.clone()
    }

    /// Profiles matching `selector`, in creation order. No match is an empty list.
    pub async fn list(&self, selector: &ProfileSelector) -> ProfileStoreResult<Vec<ShippingProfile>> {
        Ok(self.store.find(selector).await?)
    }

    pub async fn retrieve(&self, profile_id: &str) -> ProfileStoreResult<ShippingProfile> {
        let id: ProfileId = profile_id.parse()?;
        self.retrieve_by_id(id).await
    }

    pub async fn retrieve_by_id(&self, id: ProfileId) -> ProfileStoreResult<ShippingProfile> {
        self.store
            .find_one(&ProfileSelector::by_id(id))
            .await?
            .ok_or_else(|| ProfileStoreError::NotFound(format!("shipping profile {id}")))
    }

    /// Insert a new profile with empty membership.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str, profile_type: ProfileType) -> ProfileStoreResult<ShippingProfile> {
        if name.trim().is_empty() {
            return Err(ProfileStoreError::InvalidData("name must not be empty".into()));
        }
        let profile = ShippingProfile::new(ProfileId::new(), name, profile_type, Utc::now());
        self.store
            .insert_one(profile.clone())
            .await
            .map_err(conflict_as_invalid_data)?;
        debug!(profile_id = %profile.id, "shipping profile created");
        Ok(profile)
    }

    /// Get or create the default profile.
    pub async fn create_default(&self) -> ProfileStoreResult<ShippingProfile> {
        self.get_or_create_singleton(ProfileType::Default, DEFAULT_PROFILE_NAME)
            .await
    }

    pub async fn retrieve_default(&self) -> ProfileStoreResult<Option<ShippingProfile>> {
        Ok(self
            .store
            .find_one(&ProfileSelector::by_type(ProfileType::Default))
            .await?)
    }

    /// Get or create the gift card profile.
    pub async fn create_gift_card_default(&self) -> ProfileStoreResult<ShippingProfile> {
        self.get_or_create_singleton(ProfileType::GiftCard, GIFT_CARD_PROFILE_NAME)
            .await
    }

    pub async fn retrieve_gift_card_default(&self) -> ProfileStoreResult<Option<ShippingProfile>> {
        Ok(self
            .store
            .find_one(&ProfileSelector::by_type(ProfileType::GiftCard))
            .await?)
    }

    async fn get_or_create_singleton(
        &self,
        profile_type: ProfileType,
        name: &str,
    ) -> ProfileStoreResult<ShippingProfile> {
        let selector = ProfileSelector::by_type(profile_type);
        if let Some(existing) = self.store.find_one(&selector).await? {
            return Ok(existing);
        }

        let profile = ShippingProfile::new(ProfileId::new(), name, profile_type, Utc::now());
        match self.store.insert_one(profile.clone()).await {
            Ok(()) => Ok(profile),
            // Lost a race with a concurrent creator; theirs wins.
            Err(DocumentStoreError::Conflict(_)) => self
                .store
                .find_one(&selector)
                .await?
                .ok_or_else(|| ProfileStoreError::NotFound(format!("{} profile", profile_type.as_str()))),
            Err(e) => Err(e.into()),
        }
    }

    /// Shallow field update.
    ///
    /// `metadata`, `products` and `shipping_options` are refused with
    /// `InvalidData`; they have dedicated operations.
    #[instrument(skip(self, fields))]
    pub async fn update(
        &self,
        profile_id: &str,
        fields: &Map<String, JsonValue>,
    ) -> ProfileStoreResult<ShippingProfile> {
        let id: ProfileId = profile_id.parse()?;
        let update = ProfileUpdate::from_fields(fields)?;

        let result = self
            .store
            .update_one(&ProfileSelector::by_id(id), ProfilePatch::Set(update))
            .await
            .map_err(conflict_as_invalid_data)?;
        if result.matched == 0 {
            return Err(ProfileStoreError::NotFound(format!("shipping profile {id}")));
        }
        self.retrieve_by_id(id).await
    }

    /// Delete a profile. Deleting a profile that does not exist succeeds.
    #[instrument(skip(self))]
    pub async fn delete(&self, profile_id: &str) -> ProfileStoreResult<()> {
        let profile = match self.retrieve(profile_id).await {
            Ok(profile) => profile,
            Err(ProfileStoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        self.store
            .delete_one(&ProfileSelector::by_id(profile.id))
            .await?;
        debug!(profile_id = %profile.id, "shipping profile deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn add_product(&self, profile_id: &str, product_id: &str) -> ProfileStoreResult<()> {
        let id: ProfileId = profile_id.parse()?;
        let product_id: ProductId = product_id.parse()?;
        let profile = self.retrieve_by_id(id).await?;
        let product = self.products.retrieve(product_id).await?;

        if profile.has_product(product.id) {
            return Ok(());
        }

        self.store
            .update_one(&ProfileSelector::by_id(profile.id), ProfilePatch::AddProduct(product.id))
            .await?;
        debug!(profile_id = %profile.id, product_id = %product.id, "product added to profile");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_product(&self, profile_id: &str, product_id: &str) -> ProfileStoreResult<()> {
        let id: ProfileId = profile_id.parse()?;
        let product_id: ProductId = product_id.parse()?;
        let profile = self.retrieve_by_id(id).await?;

        if !profile.has_product(product_id) {
            return Ok(());
        }

        self.store
            .update_one(&ProfileSelector::by_id(profile.id), ProfilePatch::PullProduct(product_id))
            .await?;
        debug!(profile_id = %profile.id, %product_id, "product removed from profile");
        Ok(())
    }

    /// Assign a shipping option to a profile, taking it away from whichever
    /// profile held it before.
    #[instrument(skip(self))]
    pub async fn add_shipping_option(&self, profile_id: &str, option_id: &str) -> ProfileStoreResult<()> {
        let id: ProfileId = profile_id.parse()?;
        let option_id: ShippingOptionId = option_id.parse()?;
        let profile = self.retrieve_by_id(id).await?;
        let option = self.options.retrieve(option_id).await?;

        if profile.has_shipping_option(option.id) {
            return Ok(());
        }

        self.transfer_option(profile.id, option.id).await
    }

    /// Move ownership of `option_id` to `profile_id` in one atomic store write.
    async fn transfer_option(&self, profile_id: ProfileId, option_id: ShippingOptionId) -> ProfileStoreResult<()> {
        match self.store.assign_option(profile_id, option_id).await? {
            OptionAssignment::ProfileMissing => {
                Err(ProfileStoreError::NotFound(format!("shipping profile {profile_id}")))
            }
            OptionAssignment::AlreadyAssigned => Ok(()),
            OptionAssignment::Assigned { previous_owner } => {
                debug!(
                    %profile_id,
                    %option_id,
                    previous_owner = ?previous_owner,
                    "shipping option assigned"
                );
                Ok(())
            }
        }
    }

    /// Detach a shipping option. Removing an option the profile does not hold
    /// is a no-op.
    #[instrument(skip(self))]
    pub async fn remove_shipping_option(&self, profile_id: &str, option_id: &str) -> ProfileStoreResult<()> {
        let id: ProfileId = profile_id.parse()?;
        let option_id: ShippingOptionId = option_id.parse()?;
        let profile = self.retrieve_by_id(id).await?;

        self.store
            .update_one(
                &ProfileSelector::by_id(profile.id),
                ProfilePatch::PullShippingOption(option_id),
            )
            .await?;
        Ok(())
    }

    /// Set one metadata key, keeping the others.
    #[instrument(skip(self, value))]
    pub async fn set_metadata(&self, profile_id: &str, key: &str, value: JsonValue) -> ProfileStoreResult<()> {
        let id: ProfileId = profile_id.parse()?;
        validate_metadata_key(key)?;

        let result = self
            .store
            .update_one(
                &ProfileSelector::by_id(id),
                ProfilePatch::SetMetadata {
                    key: key.to_string(),
                    value,
                },
            )
            .await?;
        if result.matched == 0 {
            return Err(ProfileStoreError::NotFound(format!("shipping profile {id}")));
        }
        Ok(())
    }

    /// Remove one metadata key. Removing an absent key is a no-op.
    #[instrument(skip(self))]
    pub async fn delete_metadata(&self, profile_id: &str, key: &str) -> ProfileStoreResult<()> {
        let id: ProfileId = profile_id.parse()?;
        validate_metadata_key(key)?;

        let result = self
            .store
            .update_one(
                &ProfileSelector::by_id(id),
                ProfilePatch::UnsetMetadata { key: key.to_string() },
            )
            .await?;
        if result.matched == 0 {
            return Err(ProfileStoreError::NotFound(format!("shipping profile {id}")));
        }
        Ok(())
    }

    /// Project `profile` to `fields` (plus `id` and `metadata`) and expand the
    /// requested reference lists into full records.
    ///
    /// Each expansion resolves its list concurrently and keeps the original
    /// order; the first failed lookup fails the whole call.
    pub async fn decorate(
        &self,
        profile: &ShippingProfile,
        fields: &[&str],
        expand: &[ProfileExpand],
    ) -> ProfileStoreResult<Map<String, JsonValue>> {
        let mut decorated = project(profile, fields)?;

        for field in expand {
            let value = match field {
                ProfileExpand::Products => {
                    let products =
                        try_join_all(profile.products.iter().map(|id| self.products.retrieve(*id))).await?;
                    to_json(&products)?
                }
                ProfileExpand::ShippingOptions => {
                    let options = try_join_all(
                        profile.shipping_options.iter().map(|id| self.options.retrieve(*id)),
                    )
                    .await?;
                    to_json(&options)?
                }
            };
            decorated.insert(field.field_name().to_string(), value);
        }

        Ok(decorated)
    }

    /// Shipping option records of every profile covering any of `product_ids`.
    ///
    /// Options are deduplicated in discovery order. Options that no longer
    /// exist are skipped; any other lookup failure is returned.
    pub async fn fetch_options_by_product_ids(
        &self,
        product_ids: &[ProductId],
    ) -> ProfileStoreResult<Vec<ShippingOption>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let profiles = self
            .list(&ProfileSelector::by_any_product(product_ids.to_vec()))
            .await?;
        let option_ids = distinct_option_ids(&profiles);

        let lookups = join_all(option_ids.into_iter().map(|id| self.options.retrieve(id))).await;
        let mut options = Vec::with_capacity(lookups.len());
        for lookup in lookups {
            match lookup {
                Ok(option) => options.push(option),
                Err(ServiceError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(options)
    }
}

/// Option ids across `profiles`, first occurrence wins.
pub(crate) fn distinct_option_ids(profiles: &[ShippingProfile]) -> Vec<ShippingOptionId> {
    let mut seen = HashSet::new();
    profiles
        .iter()
        .flat_map(|p| p.shipping_options.iter().copied())
        .filter(|id| seen.insert(*id))
        .collect()
}

fn to_json<T: serde::Serialize>(value: &T) -> ProfileStoreResult<JsonValue> {
    serde_json::to_value(value)
        .map_err(|e| ProfileStoreError::InvalidData(format!("serialization failed: {e}")))
}
