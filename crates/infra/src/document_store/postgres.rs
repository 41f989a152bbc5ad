//! Postgres-backed profile store.
//!
//! Profiles live in a single `shipping_profiles` table with `uuid[]` membership
//! columns and a `jsonb` metadata column. Selectors are translated to SQL with
//! `QueryBuilder`; list predicates use `= ANY(..)` for containment and `&&` for
//! "contains any of".
//!
//! ## Option exclusivity
//!
//! `assign_option` runs in one transaction that first takes a transaction-scoped
//! advisory lock keyed on the option id. Two assignments of the same option
//! therefore serialize, and the detach/attach pair commits atomically.

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use waybill_core::{ProductId, ProfileId, ShippingOptionId};
use waybill_profiles::{Match, Metadata, ProfileSelector, ProfileType, ShippingProfile};

use super::r#trait::{
    DeleteResult, DocumentStoreError, OptionAssignment, ProfileDocumentStore, ProfilePatch,
    UpdateResult,
};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS shipping_profiles (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        profile_type TEXT NOT NULL,
        products UUID[] NOT NULL DEFAULT '{}',
        shipping_options UUID[] NOT NULL DEFAULT '{}',
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS shipping_profiles_products_idx ON shipping_profiles USING GIN (products)",
    "CREATE INDEX IF NOT EXISTS shipping_profiles_options_idx ON shipping_profiles USING GIN (shipping_options)",
    "CREATE UNIQUE INDEX IF NOT EXISTS shipping_profiles_singleton_type_idx ON shipping_profiles (profile_type) WHERE profile_type <> 'custom'",
];

const SELECT_PROFILES: &str = "SELECT id, name, profile_type, products, shipping_options, metadata, created_at, updated_at FROM shipping_profiles";

pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, DocumentStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the table and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), DocumentStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

/// Append ` AND ...` clauses for every predicate in `selector`.
fn push_selector(qb: &mut QueryBuilder<'static, Postgres>, selector: &ProfileSelector) {
    qb.push(" WHERE TRUE");

    match &selector.id {
        Some(Match::Eq(id)) => {
            qb.push(" AND id = ");
            qb.push_bind(Uuid::from(*id));
        }
        Some(Match::In(ids)) => {
            qb.push(" AND id = ANY(");
            qb.push_bind(uuids(ids));
            qb.push(")");
        }
        None => {}
    }

    match &selector.products {
        Some(Match::Eq(id)) => {
            qb.push(" AND ");
            qb.push_bind(Uuid::from(*id));
            qb.push(" = ANY(products)");
        }
        Some(Match::In(ids)) => {
            qb.push(" AND products && ");
            qb.push_bind(uuids(ids));
            qb.push("::uuid[]");
        }
        None => {}
    }

    match &selector.shipping_options {
        Some(Match::Eq(id)) => {
            qb.push(" AND ");
            qb.push_bind(Uuid::from(*id));
            qb.push(" = ANY(shipping_options)");
        }
        Some(Match::In(ids)) => {
            qb.push(" AND shipping_options && ");
            qb.push_bind(uuids(ids));
            qb.push("::uuid[]");
        }
        None => {}
    }

    if let Some(profile_type) = selector.profile_type {
        qb.push(" AND profile_type = ");
        qb.push_bind(profile_type.as_str());
    }
}

fn select_query(selector: &ProfileSelector, first_only: bool) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(SELECT_PROFILES);
    push_selector(&mut qb, selector);
    qb.push(" ORDER BY created_at, id");
    if first_only {
        qb.push(" LIMIT 1");
    }
    qb
}

fn first_id_query(selector: &ProfileSelector, lock: bool) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT id FROM shipping_profiles");
    push_selector(&mut qb, selector);
    qb.push(" ORDER BY created_at, id LIMIT 1");
    if lock {
        qb.push(" FOR UPDATE");
    }
    qb
}

/// Build the `UPDATE` for one patch against a known profile id.
///
/// The `WHERE` clause excludes no-op writes, so `rows_affected` is the
/// modified count.
fn patch_query(id: ProfileId, patch: ProfilePatch) -> Option<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new("UPDATE shipping_profiles SET ");

    match patch {
        ProfilePatch::Set(update) => {
            if update.is_empty() {
                return None;
            }
            qb.push("name = COALESCE(");
            qb.push_bind(update.name.clone());
            qb.push(", name), profile_type = COALESCE(");
            qb.push_bind(update.profile_type.map(|t| t.as_str()));
            qb.push(", profile_type), updated_at = now() WHERE id = ");
            qb.push_bind(Uuid::from(id));
            qb.push(" AND (name IS DISTINCT FROM COALESCE(");
            qb.push_bind(update.name);
            qb.push(", name) OR profile_type IS DISTINCT FROM COALESCE(");
            qb.push_bind(update.profile_type.map(|t| t.as_str()));
            qb.push(", profile_type))");
        }
        ProfilePatch::AddProduct(product_id) => {
            let product = Uuid::from(product_id);
            qb.push("products = array_append(products, ");
            qb.push_bind(product);
            qb.push("), updated_at = now() WHERE id = ");
            qb.push_bind(Uuid::from(id));
            qb.push(" AND NOT (");
            qb.push_bind(product);
            qb.push(" = ANY(products))");
        }
        ProfilePatch::PullProduct(product_id) => {
            let product = Uuid::from(product_id);
            qb.push("products = array_remove(products, ");
            qb.push_bind(product);
            qb.push("), updated_at = now() WHERE id = ");
            qb.push_bind(Uuid::from(id));
            qb.push(" AND ");
            qb.push_bind(product);
            qb.push(" = ANY(products)");
        }
        ProfilePatch::PullShippingOption(option_id) => {
            let option = Uuid::from(option_id);
            qb.push("shipping_options = array_remove(shipping_options, ");
            qb.push_bind(option);
            qb.push("), updated_at = now() WHERE id = ");
            qb.push_bind(Uuid::from(id));
            qb.push(" AND ");
            qb.push_bind(option);
            qb.push(" = ANY(shipping_options)");
        }
        ProfilePatch::SetMetadata { key, value } => {
            qb.push("metadata = metadata || jsonb_build_object(");
            qb.push_bind(key.clone());
            qb.push("::text, ");
            qb.push_bind(value.clone());
            qb.push("::jsonb), updated_at = now() WHERE id = ");
            qb.push_bind(Uuid::from(id));
            qb.push(" AND metadata -> ");
            qb.push_bind(key);
            qb.push("::text IS DISTINCT FROM ");
            qb.push_bind(value);
            qb.push("::jsonb");
        }
        ProfilePatch::UnsetMetadata { key } => {
            qb.push("metadata = metadata - ");
            qb.push_bind(key.clone());
            qb.push("::text, updated_at = now() WHERE id = ");
            qb.push_bind(Uuid::from(id));
            qb.push(" AND jsonb_exists(metadata, ");
            qb.push_bind(key);
            qb.push(")");
        }
    }

    Some(qb)
}

fn profile_from_row(row: &PgRow) -> Result<ShippingProfile, DocumentStoreError> {
    let profile_type: String = row.try_get("profile_type")?;
    let profile_type = profile_type
        .parse::<ProfileType>()
        .map_err(|e| DocumentStoreError::Decode(e.to_string()))?;

    let metadata: serde_json::Value = row.try_get("metadata")?;
    let metadata: Metadata = serde_json::from_value(metadata)
        .map_err(|e| DocumentStoreError::Decode(format!("metadata: {e}")))?;

    let products: Vec<Uuid> = row.try_get("products")?;
    let shipping_options: Vec<Uuid> = row.try_get("shipping_options")?;

    Ok(ShippingProfile {
        id: ProfileId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        profile_type,
        products: products.into_iter().map(ProductId::from_uuid).collect(),
        shipping_options: shipping_options
            .into_iter()
            .map(ShippingOptionId::from_uuid)
            .collect(),
        metadata,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_write_error(e: sqlx::Error) -> DocumentStoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DocumentStoreError::Conflict(db.message().to_string())
        }
        _ => DocumentStoreError::Database(e),
    }
}

#[async_trait::async_trait]
impl ProfileDocumentStore for PostgresProfileStore {
    async fn find(&self, selector: &ProfileSelector) -> Result<Vec<ShippingProfile>, DocumentStoreError> {
        let rows = select_query(selector, false)
            .build()
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(profile_from_row).collect()
    }

    async fn find_one(
        &self,
        selector: &ProfileSelector,
    ) -> Result<Option<ShippingProfile>, DocumentStoreError> {
        let row = select_query(selector, true)
            .build()
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn insert_one(&self, profile: ShippingProfile) -> Result<(), DocumentStoreError> {
        let metadata = serde_json::to_value(&profile.metadata)
            .map_err(|e| DocumentStoreError::Decode(format!("metadata: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO shipping_profiles
                (id, name, profile_type, products, shipping_options, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::from(profile.id))
        .bind(&profile.name)
        .bind(profile.profile_type.as_str())
        .bind(uuids(&profile.products))
        .bind(uuids(&profile.shipping_options))
        .bind(metadata)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn update_one(
        &self,
        selector: &ProfileSelector,
        patch: ProfilePatch,
    ) -> Result<UpdateResult, DocumentStoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = first_id_query(selector, true)
            .build()
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(UpdateResult::default());
        };
        let id = ProfileId::from_uuid(row.try_get("id")?);

        let modified = match patch_query(id, patch) {
            Some(mut qb) => qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_write_error)?
                .rows_affected(),
            None => 0,
        };

        tx.commit().await?;
        Ok(UpdateResult {
            matched: 1,
            modified,
        })
    }

    async fn delete_one(&self, selector: &ProfileSelector) -> Result<DeleteResult, DocumentStoreError> {
        let mut qb = QueryBuilder::new("DELETE FROM shipping_profiles WHERE id = (SELECT id FROM shipping_profiles");
        push_selector(&mut qb, selector);
        qb.push(" ORDER BY created_at, id LIMIT 1)");

        let deleted = qb.build().execute(&self.pool).await?.rows_affected();
        Ok(DeleteResult { deleted })
    }

    async fn assign_option(
        &self,
        profile_id: ProfileId,
        option_id: ShippingOptionId,
    ) -> Result<OptionAssignment, DocumentStoreError> {
        let target = Uuid::from(profile_id);
        let option = Uuid::from(option_id);
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(option.to_string())
            .execute(&mut *tx)
            .await?;

        let Some(row) = sqlx::query("SELECT shipping_options FROM shipping_profiles WHERE id = $1 FOR UPDATE")
            .bind(target)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(OptionAssignment::ProfileMissing);
        };
        let held: Vec<Uuid> = row.try_get("shipping_options")?;
        if held.contains(&option) {
            return Ok(OptionAssignment::AlreadyAssigned);
        }

        let previous_owner: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE shipping_profiles
            SET shipping_options = array_remove(shipping_options, $1), updated_at = now()
            WHERE $1 = ANY(shipping_options) AND id <> $2
            RETURNING id
            "#,
        )
        .bind(option)
        .bind(target)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE shipping_profiles
            SET shipping_options = array_append(shipping_options, $1), updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(option)
        .bind(target)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(OptionAssignment::Assigned {
            previous_owner: previous_owner.map(ProfileId::from_uuid),
        })
    }
}
