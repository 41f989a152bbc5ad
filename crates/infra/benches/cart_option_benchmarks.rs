use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use waybill_core::{ProductId, RegionId, ShippingOptionId};
use waybill_infra::CartOptionResolver;
use waybill_infra::document_store::InMemoryProfileStore;
use waybill_infra::profile_store::ProfileStore;
use waybill_infra::services::{InMemoryProductService, InMemoryShippingOptionService};
use waybill_profiles::{Cart, ItemContent, LineItem, Product, ProfileType, ShippingOption};

fn runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("bench runtime")
}

/// `profiles` profiles, each owning one product and `options_per_profile` options.
/// Returns the store and a cart containing every product.
fn seed(rt: &Runtime, profiles: usize, options_per_profile: usize) -> (ProfileStore, Cart) {
    rt.block_on(async {
        let products = Arc::new(InMemoryProductService::new());
        let options = Arc::new(InMemoryShippingOptionService::new());
        let store = ProfileStore::new(
            Arc::new(InMemoryProfileStore::new()),
            products.clone(),
            options.clone(),
        );
        let region = RegionId::new();
        let mut cart = Cart::new(region);

        for i in 0..profiles {
            let profile = store
                .create(&format!("profile-{i}"), ProfileType::Custom)
                .await
                .unwrap();
            let pid = profile.id.to_string();

            let product = ProductId::new();
            products.insert(Product::new(product, "item")).await;
            store.add_product(&pid, &product.to_string()).await.unwrap();
            cart = cart.with_item(LineItem::simple("line", ItemContent::new(product, 1, 1000)));

            for j in 0..options_per_profile {
                let option = ShippingOptionId::new();
                options
                    .insert(ShippingOption::flat_rate(option, format!("opt-{i}-{j}"), region, 0))
                    .await;
                store.add_shipping_option(&pid, &option.to_string()).await.unwrap();
            }
        }
        (store, cart)
    })
}

fn bench_fetch_cart_options(c: &mut Criterion) {
    waybill_observability::init();
    let rt = runtime();
    let mut group = c.benchmark_group("fetch_cart_options");

    for profiles in [1usize, 10, 100] {
        let (store, cart) = seed(&rt, profiles, 3);
        let resolver = CartOptionResolver::from_store(store);
        group.throughput(Throughput::Elements(profiles as u64));
        group.bench_with_input(BenchmarkId::new("profiles", profiles), &cart, |b, cart| {
            b.iter(|| black_box(rt.block_on(resolver.fetch_cart_options(cart)).unwrap()));
        });
    }

    group.finish();
}

fn bench_validation_concurrency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("validation_concurrency");
    let (store, cart) = seed(&rt, 10, 10);

    for concurrency in [1usize, 8, 32] {
        let resolver = CartOptionResolver::from_store(store.clone()).with_concurrency(concurrency);
        group.bench_with_input(BenchmarkId::new("buffered", concurrency), &cart, |b, cart| {
            b.iter(|| black_box(rt.block_on(resolver.fetch_cart_options(cart)).unwrap()));
        });
    }

    group.finish();
}

fn bench_option_transfer(c: &mut Criterion) {
    let rt = runtime();
    let (store, _) = seed(&rt, 2, 0);
    let (a, b) = rt.block_on(async {
        let all = store.list(&waybill_profiles::ProfileSelector::all()).await.unwrap();
        (all[0].id.to_string(), all[1].id.to_string())
    });
    let option = ShippingOptionId::new().to_string();

    c.bench_function("option_transfer_round_trip", |bench| {
        bench.iter(|| {
            rt.block_on(async {
                store.add_shipping_option(&a, &option).await.unwrap();
                store.add_shipping_option(&b, &option).await.unwrap();
            })
        });
    });
}

criterion_group!(
    benches,
    bench_fetch_cart_options,
    bench_validation_concurrency,
    bench_option_transfer
);
criterion_main!(benches);
