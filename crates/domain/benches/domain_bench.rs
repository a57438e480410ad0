use std::sync::Arc;

use common::{AggregateId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    AcceptOrder, Aggregate, CatalogItem, DeliveryInfo, InMemoryItemCatalog,
    InMemoryUserDirectory, Money, Order, OrderEvent, OrderService, PlaceOrder, UpdateOrderDetails,
    UserProfile,
};
use event_store::{AppendOptions, EventEnvelope, EventStore, InMemoryEventStore, InMemoryKeyRegistry, Version};

fn make_envelope(aggregate_id: AggregateId, version: i64, event: &OrderEvent) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Order")
        .event_type(domain::DomainEvent::event_type(event))
        .version(Version::new(version))
        .payload(event)
        .unwrap()
        .build()
        .unwrap()
}

struct Fixture {
    service: OrderService<InMemoryEventStore>,
    buyer: UserId,
    seller: UserId,
    item: CatalogItem,
}

async fn fixture(available: u32) -> Fixture {
    let catalog = InMemoryItemCatalog::new();
    let users = InMemoryUserDirectory::new();
    let buyer = users.insert(UserProfile::member("bench buyer")).await;
    let seller = users.insert(UserProfile::member("bench seller")).await;
    let item = CatalogItem::new(seller, "Bench item", Money::from_cents(1000), available);
    catalog.insert(item.clone()).await;

    let service = OrderService::new(
        InMemoryEventStore::new(),
        Arc::new(catalog),
        Arc::new(users),
        Arc::new(InMemoryKeyRegistry::new()),
    );
    Fixture {
        service,
        buyer,
        seller,
        item,
    }
}

fn place(f: &Fixture) -> PlaceOrder {
    PlaceOrder::new(
        f.buyer,
        f.item.id,
        1,
        DeliveryInfo::new("1 Bench St", "+966500000000"),
    )
}

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let f = rt.block_on(fixture(u32::MAX));

    c.bench_function("domain/create_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                f.service.create_order(place(&f)).await.unwrap();
            });
        });
    });
}

fn bench_place_and_accept(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let f = rt.block_on(fixture(u32::MAX));

    c.bench_function("domain/place_and_accept", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order_id = f
                    .service
                    .create_order(place(&f))
                    .await
                    .unwrap()
                    .aggregate
                    .id()
                    .unwrap();
                f.service
                    .accept(AcceptOrder::new(order_id, f.seller))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_update_details(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let f = rt.block_on(fixture(u32::MAX));
    let order_id = rt.block_on(async {
        f.service
            .create_order(place(&f))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap()
    });

    c.bench_function("domain/update_details", |b| {
        b.iter(|| {
            rt.block_on(async {
                f.service
                    .update_details(
                        UpdateOrderDetails::new(order_id, f.seller).seller_notes("bench"),
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_aggregate_reconstruction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let f = rt.block_on(fixture(1));
    let store = InMemoryEventStore::new();
    let order_id = AggregateId::new();

    // 1 placement followed by 99 detail updates
    rt.block_on(async {
        let created = Order::default()
            .place(
                order_id,
                domain::OrderNumber::generate(),
                &place(&f),
                &f.item,
            )
            .unwrap();
        let mut events = vec![make_envelope(order_id, 1, &created[0])];
        for v in 2..=100 {
            let updated =
                OrderEvent::details_updated(f.seller, Some(format!("note {v}")), None);
            events.push(make_envelope(order_id, v, &updated));
        }
        store.append(events, AppendOptions::new()).await.unwrap();
    });

    c.bench_function("domain/reconstruct_100_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.get_events_for_aggregate(order_id).await.unwrap();
                let mut order = Order::default();
                for event in &events {
                    let domain_event: OrderEvent =
                        serde_json::from_value(event.payload.clone()).unwrap();
                    order.apply(domain_event);
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_order,
    bench_place_and_accept,
    bench_update_details,
    bench_aggregate_reconstruction,
);
criterion_main!(benches);
