use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use waybill_core::{ProductId, ProfileId, ShippingOptionId};
use waybill_profiles::{ProfileSelector, ProfileUpdate, ShippingProfile};

/// A single write applied to the first profile matching a selector.
///
/// Membership writes have set semantics: adding a present id and pulling an
/// absent id leave the record unchanged. Shipping options are only ever added
/// through [`ProfileDocumentStore::assign_option`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProfilePatch {
    Set(ProfileUpdate),
    AddProduct(ProductId),
    PullProduct(ProductId),
    PullShippingOption(ShippingOptionId),
    SetMetadata { key: String, value: JsonValue },
    UnsetMetadata { key: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted: u64,
}

/// Outcome of moving a shipping option onto a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionAssignment {
    /// The target profile does not exist; nothing was written.
    ProfileMissing,
    /// The target profile already holds the option; nothing was written.
    AlreadyAssigned,
    /// The option now belongs to the target, detached from `previous_owner` if any.
    Assigned { previous_owner: Option<ProfileId> },
}

/// Document store operation error.
///
/// These are **infrastructure errors**; caller mistakes (bad ids, guarded
/// fields) are rejected before a store is ever reached.
#[derive(Debug, Error)]
pub enum DocumentStoreError {
    /// A write would break a uniqueness rule (duplicate id, second singleton profile).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored record could not be turned back into a profile.
    #[error("failed to decode profile record: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence boundary for shipping profile records.
///
/// ## Selection
///
/// `find` returns every profile matching the selector in creation order;
/// `find_one`, `update_one` and `delete_one` act on the first of them.
///
/// ## Exclusivity
///
/// A shipping option belongs to at most one profile. Implementations must make
/// `assign_option` atomic with respect to other `assign_option` calls for the
/// same option: detaching the option from its previous holder and attaching it
/// to the target happen as one step, so concurrent assignments serialize and
/// the option never ends up on two profiles.
#[async_trait::async_trait]
pub trait ProfileDocumentStore: Send + Sync {
    async fn find(&self, selector: &ProfileSelector) -> Result<Vec<ShippingProfile>, DocumentStoreError>;

    async fn find_one(
        &self,
        selector: &ProfileSelector,
    ) -> Result<Option<ShippingProfile>, DocumentStoreError>;

    async fn insert_one(&self, profile: ShippingProfile) -> Result<(), DocumentStoreError>;

    async fn update_one(
        &self,
        selector: &ProfileSelector,
        patch: ProfilePatch,
    ) -> Result<UpdateResult, DocumentStoreError>;

    async fn delete_one(&self, selector: &ProfileSelector) -> Result<DeleteResult, DocumentStoreError>;

    /// Atomically transfer ownership of `option_id` to `profile_id`.
    async fn assign_option(
        &self,
        profile_id: ProfileId,
        option_id: ShippingOptionId,
    ) -> Result<OptionAssignment, DocumentStoreError>;
}

#[async_trait::async_trait]
impl<S> ProfileDocumentStore for Arc<S>
where
    S: ProfileDocumentStore + ?Sized,
{
    async fn find(&self, selector: &ProfileSelector) -> Result<Vec<ShippingProfile>, DocumentStoreError> {
        (**self).find(selector).await
    }

    async fn find_one(
        &self,
        selector: &ProfileSelector,
    ) -> Result<Option<ShippingProfile>, DocumentStoreError> {
        (**self).find_one(selector).await
    }

    async fn insert_one(&self, profile: ShippingProfile) -> Result<(), DocumentStoreError> {
        (**self).insert_one(profile).await
    }

    async fn update_one(
        &self,
        selector: &ProfileSelector,
        patch: ProfilePatch,
    ) -> Result<UpdateResult, DocumentStoreError> {
        (**self).update_one(selector, patch).await
    }

    async fn delete_one(&self, selector: &ProfileSelector) -> Result<DeleteResult, DocumentStoreError> {
        (**self).delete_one(selector).await
    }

    async fn assign_option(
        &self,
        profile_id: ProfileId,
        option_id: ShippingOptionId,
    ) -> Result<OptionAssignment, DocumentStoreError> {
        (**self).assign_option(profile_id, option_id).await
    }
}
