use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use waybill_core::{ProfileId, ShippingOptionId};
use waybill_profiles::{ProfileSelector, ProfileType, ShippingProfile};

use super::r#trait::{
    DeleteResult, DocumentStoreError, OptionAssignment, ProfileDocumentStore, ProfilePatch,
    UpdateResult,
};

#[derive(Debug, Clone)]
struct StoredProfile {
    seq: u64,
    profile: ShippingProfile,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    profiles: HashMap<ProfileId, StoredProfile>,
}

impl Inner {
    /// Matching records in insertion order.
    fn matching(&self, selector: &ProfileSelector) -> Vec<&StoredProfile> {
        let mut hits: Vec<&StoredProfile> = self
            .profiles
            .values()
            .filter(|s| selector.matches(&s.profile))
            .collect();
        hits.sort_by_key(|s| s.seq);
        hits
    }

    fn first_match(&self, selector: &ProfileSelector) -> Option<ProfileId> {
        self.matching(selector).first().map(|s| s.profile.id)
    }

    fn singleton_taken(&self, profile_type: ProfileType, except: ProfileId) -> bool {
        profile_type != ProfileType::Custom
            && self
                .profiles
                .values()
                .any(|s| s.profile.id != except && s.profile.profile_type == profile_type)
    }
}

/// In-memory profile store.
///
/// Intended for tests/dev. Every write, including option assignment, happens
/// under a single write lock, which is what makes `assign_option` atomic here.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    inner: RwLock<Inner>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Apply one patch; returns `true` if the profile changed.
fn apply_patch(profile: &mut ShippingProfile, patch: ProfilePatch) -> bool {
    match patch {
        ProfilePatch::Set(update) => update.apply(profile),
        ProfilePatch::AddProduct(id) => profile.add_product(id),
        ProfilePatch::PullProduct(id) => profile.remove_product(id),
        ProfilePatch::PullShippingOption(id) => profile.remove_shipping_option(id),
        ProfilePatch::SetMetadata { key, value } => profile.set_metadata(key, value),
        ProfilePatch::UnsetMetadata { key } => profile.delete_metadata(&key),
    }
}

#[async_trait::async_trait]
impl ProfileDocumentStore for InMemoryProfileStore {
    async fn find(&self, selector: &ProfileSelector) -> Result<Vec<ShippingProfile>, DocumentStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .matching(selector)
            .into_iter()
            .map(|s| s.profile.clone())
            .collect())
    }

    async fn find_one(
        &self,
        selector: &ProfileSelector,
    ) -> Result<Option<ShippingProfile>, DocumentStoreError> {
        let inner = self.inner.read().await;
        Ok(inner.matching(selector).first().map(|s| s.profile.clone()))
    }

    async fn insert_one(&self, profile: ShippingProfile) -> Result<(), DocumentStoreError> {
        let mut inner = self.inner.write().await;

        if inner.profiles.contains_key(&profile.id) {
            return Err(DocumentStoreError::Conflict(format!(
                "profile {} already exists",
                profile.id
            )));
        }
        if inner.singleton_taken(profile.profile_type, profile.id) {
            return Err(DocumentStoreError::Conflict(format!(
                "a {} profile already exists",
                profile.profile_type.as_str()
            )));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.profiles.insert(profile.id, StoredProfile { seq, profile });
        Ok(())
    }

    async fn update_one(
        &self,
        selector: &ProfileSelector,
        patch: ProfilePatch,
    ) -> Result<UpdateResult, DocumentStoreError> {
        let mut inner = self.inner.write().await;

        let Some(target) = inner.first_match(selector) else {
            return Ok(UpdateResult::default());
        };

        if let ProfilePatch::Set(update) = &patch {
            if let Some(profile_type) = update.profile_type {
                if inner.singleton_taken(profile_type, target) {
                    return Err(DocumentStoreError::Conflict(format!(
                        "a {} profile already exists",
                        profile_type.as_str()
                    )));
                }
            }
        }

        let Some(stored) = inner.profiles.get_mut(&target) else {
            return Ok(UpdateResult::default());
        };
        let modified = apply_patch(&mut stored.profile, patch);
        if modified {
            stored.profile.touch(Utc::now());
        }

        Ok(UpdateResult {
            matched: 1,
            modified: u64::from(modified),
        })
    }

    async fn delete_one(&self, selector: &ProfileSelector) -> Result<DeleteResult, DocumentStoreError> {
        let mut inner = self.inner.write().await;
        let deleted = inner
            .first_match(selector)
            .and_then(|id| inner.profiles.remove(&id))
            .map_or(0, |_| 1);
        Ok(DeleteResult { deleted })
    }

    async fn assign_option(
        &self,
        profile_id: ProfileId,
        option_id: ShippingOptionId,
    ) -> Result<OptionAssignment, DocumentStoreError> {
        let mut inner = self.inner.write().await;

        match inner.profiles.get(&profile_id) {
            None => return Ok(OptionAssignment::ProfileMissing),
            Some(s) if s.profile.has_shipping_option(option_id) => {
                return Ok(OptionAssignment::AlreadyAssigned);
            }
            Some(_) => {}
        }

        let now = Utc::now();
        let mut previous_owner = None;
        for stored in inner.profiles.values_mut() {
            if stored.profile.id != profile_id && stored.profile.remove_shipping_option(option_id) {
                stored.profile.touch(now);
                previous_owner = Some(stored.profile.id);
            }
        }

        if let Some(stored) = inner.profiles.get_mut(&profile_id) {
            stored.profile.add_shipping_option(option_id);
            stored.profile.touch(now);
        }

        Ok(OptionAssignment::Assigned { previous_owner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use waybill_core::ProductId;
    use waybill_profiles::ProfileUpdate;

    fn profile(name: &str) -> ShippingProfile {
        ShippingProfile::new(ProfileId::new(), name, ProfileType::Custom, Utc::now())
    }

    #[tokio::test]
    async fn find_returns_insertion_order() {
        let store = InMemoryProfileStore::new();
        let names = ["a", "b", "c", "d"];
        for n in names {
            store.insert_one(profile(n)).await.unwrap();
        }
        let found: Vec<String> = store
            .find(&ProfileSelector::all())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(found, names);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let store = InMemoryProfileStore::new();
        let p = profile("a");
        store.insert_one(p.clone()).await.unwrap();
        assert!(matches!(
            store.insert_one(p).await,
            Err(DocumentStoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn insert_rejects_second_default_profile() {
        let store = InMemoryProfileStore::new();
        let mut a = profile("a");
        a.profile_type = ProfileType::Default;
        let mut b = profile("b");
        b.profile_type = ProfileType::Default;
        store.insert_one(a).await.unwrap();
        assert!(store.insert_one(b).await.is_err());
    }

    #[tokio::test]
    async fn update_one_reports_matched_and_modified() {
        let store = InMemoryProfileStore::new();
        let p = profile("a");
        let id = p.id;
        store.insert_one(p).await.unwrap();

        let product = ProductId::new();
        let sel = ProfileSelector::by_id(id);
        let first = store.update_one(&sel, ProfilePatch::AddProduct(product)).await.unwrap();
        let second = store.update_one(&sel, ProfilePatch::AddProduct(product)).await.unwrap();
        assert_eq!(first, UpdateResult { matched: 1, modified: 1 });
        assert_eq!(second, UpdateResult { matched: 1, modified: 0 });

        let missing = store
            .update_one(&ProfileSelector::by_id(ProfileId::new()), ProfilePatch::AddProduct(product))
            .await
            .unwrap();
        assert_eq!(missing.matched, 0);
    }

    #[tokio::test]
    async fn update_bumps_updated_at_only_on_change() {
        let store = InMemoryProfileStore::new();
        let p = profile("a");
        let (id, before) = (p.id, p.updated_at);
        store.insert_one(p).await.unwrap();

        let sel = ProfileSelector::by_id(id);
        store
            .update_one(&sel, ProfilePatch::Set(ProfileUpdate::name("a")))
            .await
            .unwrap();
        assert_eq!(store.find_one(&sel).await.unwrap().unwrap().updated_at, before);

        store
            .update_one(
                &sel,
                ProfilePatch::SetMetadata {
                    key: "k".into(),
                    value: json!(1),
                },
            )
            .await
            .unwrap();
        assert!(store.find_one(&sel).await.unwrap().unwrap().updated_at >= before);
    }

    #[tokio::test]
    async fn metadata_patches_report_real_changes_only() {
        let store = InMemoryProfileStore::new();
        let p = profile("a");
        let sel = ProfileSelector::by_id(p.id);
        store.insert_one(p).await.unwrap();

        let set = || ProfilePatch::SetMetadata {
            key: "k".into(),
            value: json!(1),
        };
        let unset = || ProfilePatch::UnsetMetadata { key: "k".into() };

        assert_eq!(store.update_one(&sel, set()).await.unwrap().modified, 1);
        assert_eq!(store.update_one(&sel, set()).await.unwrap().modified, 0);
        assert_eq!(store.update_one(&sel, unset()).await.unwrap().modified, 1);
        let res = store.update_one(&sel, unset()).await.unwrap();
        assert_eq!((res.matched, res.modified), (1, 0));
        assert!(store.find_one(&sel).await.unwrap().unwrap().metadata.is_empty());
    }

    #[tokio::test]
    async fn delete_one_is_zero_for_missing() {
        let store = InMemoryProfileStore::new();
        let res = store.delete_one(&ProfileSelector::by_id(ProfileId::new())).await.unwrap();
        assert_eq!(res.deleted, 0);
    }

    #[tokio::test]
    async fn assign_option_moves_ownership() {
        let store = InMemoryProfileStore::new();
        let (a, b) = (profile("a"), profile("b"));
        let (a_id, b_id) = (a.id, b.id);
        store.insert_one(a).await.unwrap();
        store.insert_one(b).await.unwrap();
        let opt = ShippingOptionId::new();

        assert_eq!(
            store.assign_option(a_id, opt).await.unwrap(),
            OptionAssignment::Assigned { previous_owner: None }
        );
        assert_eq!(
            store.assign_option(a_id, opt).await.unwrap(),
            OptionAssignment::AlreadyAssigned
        );
        assert_eq!(
            store.assign_option(b_id, opt).await.unwrap(),
            OptionAssignment::Assigned {
                previous_owner: Some(a_id)
            }
        );

        let holders = store.find(&ProfileSelector::by_shipping_option(opt)).await.unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].id, b_id);
    }

    #[tokio::test]
    async fn assign_option_to_missing_profile_writes_nothing() {
        let store = InMemoryProfileStore::new();
        let a = profile("a");
        let a_id = a.id;
        store.insert_one(a).await.unwrap();
        let opt = ShippingOptionId::new();
        store.assign_option(a_id, opt).await.unwrap();

        assert_eq!(
            store.assign_option(ProfileId::new(), opt).await.unwrap(),
            OptionAssignment::ProfileMissing
        );
        let holder = store.find_one(&ProfileSelector::by_shipping_option(opt)).await.unwrap();
        assert_eq!(holder.map(|p| p.id), Some(a_id));
    }
}
