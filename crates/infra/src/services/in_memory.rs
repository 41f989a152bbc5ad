use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use waybill_core::{ProductId, ShippingOptionId};
use waybill_profiles::{Cart, Product, ShippingOption};

use super::{ProductService, ServiceError, ShippingOptionService};

/// In-memory product catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryProductService {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryProductService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }
}

#[async_trait::async_trait]
impl ProductService for InMemoryProductService {
    async fn retrieve(&self, product_id: ProductId) -> Result<Product, ServiceError> {
        self.products
            .read()
            .await
            .get(&product_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("product {product_id}")))
    }
}

/// In-memory shipping options for tests/dev.
///
/// Cart validation applies the option's own eligibility rules. Options marked
/// with [`fail_validation`](Self::fail_validation) fail every validation with
/// `Unavailable`, to stand in for a faulty provider.
#[derive(Debug, Default)]
pub struct InMemoryShippingOptionService {
    options: RwLock<HashMap<ShippingOptionId, ShippingOption>>,
    failing: RwLock<HashSet<ShippingOptionId>>,
    validations: AtomicUsize,
}

impl InMemoryShippingOptionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, option: ShippingOption) {
        self.options.write().await.insert(option.id, option);
    }

    pub async fn fail_validation(&self, option_id: ShippingOptionId) {
        self.failing.write().await.insert(option_id);
    }

    /// Number of `validate_cart_option` calls served so far.
    pub fn validation_calls(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ShippingOptionService for InMemoryShippingOptionService {
    async fn retrieve(&self, option_id: ShippingOptionId) -> Result<ShippingOption, ServiceError> {
        self.options
            .read()
            .await
            .get(&option_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("shipping option {option_id}")))
    }

    async fn validate_cart_option(
        &self,
        option_id: ShippingOptionId,
        cart: &Cart,
    ) -> Result<ShippingOption, ServiceError> {
        self.validations.fetch_add(1, Ordering::SeqCst);

        if self.failing.read().await.contains(&option_id) {
            return Err(ServiceError::Unavailable(format!(
                "shipping option {option_id} provider is down"
            )));
        }

        let option = self.retrieve(option_id).await?;
        option
            .check_cart_eligibility(cart)
            .map_err(|e| ServiceError::Ineligible(e.to_string()))?;
        Ok(option)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waybill_core::RegionId;
    use waybill_profiles::{ItemContent, LineItem};

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let svc = InMemoryProductService::new();
        assert!(matches!(
            svc.retrieve(ProductId::new()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn validation_checks_region_and_counts_calls() {
        let region = RegionId::new();
        let svc = InMemoryShippingOptionService::new();
        let opt = ShippingOption::flat_rate(ShippingOptionId::new(), "Standard", region, 500);
        let opt_id = opt.id;
        svc.insert(opt).await;

        let cart = Cart::new(region)
            .with_item(LineItem::simple("x", ItemContent::new(ProductId::new(), 1, 100)));
        assert!(svc.validate_cart_option(opt_id, &cart).await.is_ok());

        let foreign = Cart::new(RegionId::new());
        assert!(matches!(
            svc.validate_cart_option(opt_id, &foreign).await,
            Err(ServiceError::Ineligible(_))
        ));
        assert_eq!(svc.validation_calls(), 2);
    }

    #[tokio::test]
    async fn failing_option_is_unavailable() {
        let region = RegionId::new();
        let svc = InMemoryShippingOptionService::new();
        let opt = ShippingOption::flat_rate(ShippingOptionId::new(), "Standard", region, 500);
        let opt_id = opt.id;
        svc.insert(opt).await;
        svc.fail_validation(opt_id).await;

        assert!(matches!(
            svc.validate_cart_option(opt_id, &Cart::new(region)).await,
            Err(ServiceError::Unavailable(_))
        ));
    }
}
