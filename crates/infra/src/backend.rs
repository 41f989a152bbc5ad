//! Backend wiring: turn an [`InfraConfig`] into a ready profile store.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cart_options::CartOptionResolver;
use crate::config::InfraConfig;
use crate::document_store::{
    DocumentStoreError, InMemoryProfileStore, PostgresProfileStore, ProfileDocumentStore,
};
use crate::profile_store::ProfileStore;
use crate::services::{ProductService, ShippingOptionService};

/// Open the configured document store.
///
/// With a database URL this connects to Postgres and creates the schema if
/// needed; without one it falls back to the in-memory store.
pub async fn connect(config: &InfraConfig) -> Result<Arc<dyn ProfileDocumentStore>, DocumentStoreError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresProfileStore::connect(url, config.db_max_connections).await?;
            store.ensure_schema().await?;
            info!(max_connections = config.db_max_connections, "using postgres profile store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("WAYBILL_DATABASE_URL not set; using in-memory profile store");
            Ok(Arc::new(InMemoryProfileStore::new()))
        }
    }
}

/// The two public services, sharing one store and one set of collaborators.
#[derive(Clone)]
pub struct Services {
    pub profiles: ProfileStore,
    pub cart_options: CartOptionResolver,
}

/// Connect the store and build the profile store + cart option resolver.
pub async fn build(
    config: &InfraConfig,
    products: Arc<dyn ProductService>,
    options: Arc<dyn ShippingOptionService>,
) -> Result<Services, DocumentStoreError> {
    let store = connect(config).await?;
    let profiles = ProfileStore::new(store, products, options.clone());
    let cart_options = CartOptionResolver::new(profiles.clone(), options)
        .with_concurrency(config.validation_concurrency);
    Ok(Services {
        profiles,
        cart_options,
    })
}
