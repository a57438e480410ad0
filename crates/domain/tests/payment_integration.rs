//! Integration tests for the payment ledger sharing an order stream with
//! the order service.

use std::sync::Arc;

use common::{AggregateId, UserId};
use domain::{
    AcceptOrder, Aggregate, CancelPayment, CatalogItem, DeliveryInfo, DomainError, ErrorKind,
    InMemoryItemCatalog, InMemoryUserDirectory, InitiatePayment, ItemId, ItemStatus, Money,
    OrderService, OrderStatus, PaymentLedger, PaymentStatus, PlaceOrder, RejectOrder,
    UserProfile, VerifyPayment,
};
use event_store::{EventStore, InMemoryEventStore, InMemoryKeyRegistry};

struct Market {
    orders: OrderService<InMemoryEventStore>,
    ledger: Arc<PaymentLedger<InMemoryEventStore>>,
    store: InMemoryEventStore,
    catalog: InMemoryItemCatalog,
    users: InMemoryUserDirectory,
    buyer: UserId,
    seller: UserId,
    staff: UserId,
    item_id: ItemId,
}

async fn market() -> Market {
    let store = InMemoryEventStore::new();
    let catalog = InMemoryItemCatalog::new();
    let users = InMemoryUserDirectory::new();
    let keys = InMemoryKeyRegistry::new();

    let buyer = users.insert(UserProfile::member("Layla")).await;
    let seller = users.insert(UserProfile::member("Omar")).await;
    let staff = users.insert(UserProfile::staff("Finance desk")).await;
    let item_id = catalog
        .insert(CatalogItem::new(
            seller,
            "Espresso machine",
            Money::from_cents(25000),
            1,
        ))
        .await;

    let orders = OrderService::new(
        store.clone(),
        Arc::new(catalog.clone()),
        Arc::new(users.clone()),
        Arc::new(keys.clone()),
    );
    let ledger = PaymentLedger::new(
        store.clone(),
        Arc::new(catalog.clone()),
        Arc::new(users.clone()),
        Arc::new(keys),
    );

    Market {
        orders,
        ledger: Arc::new(ledger),
        store,
        catalog,
        users,
        buyer,
        seller,
        staff,
        item_id,
    }
}

async fn place(m: &Market) -> AggregateId {
    m.orders
        .create_order(PlaceOrder::new(
            m.buyer,
            m.item_id,
            1,
            DeliveryInfo::new("3 Olive Ave", "+966500000004"),
        ))
        .await
        .unwrap()
        .aggregate
        .id()
        .unwrap()
}

fn submission(m: &Market, order_id: AggregateId, reference: &str) -> InitiatePayment {
    InitiatePayment::new(
        order_id,
        m.buyer,
        "+966522222222",
        Money::from_cents(25000),
        reference,
    )
}

#[tokio::test]
async fn verified_payment_completes_pending_order() {
    let m = market().await;
    let order_id = place(&m).await;

    let payment = m
        .ledger
        .initiate(submission(&m, order_id, "BANK-001"))
        .await
        .unwrap()
        .payment;
    let result = m
        .ledger
        .verify(VerifyPayment::new(order_id, payment.id, m.staff))
        .await
        .unwrap();

    assert_eq!(result.order.status(), OrderStatus::Completed);
    assert_eq!(result.order.payment_status(), PaymentStatus::Paid);
    assert_eq!(m.catalog.status(m.item_id).await, Some(ItemStatus::Sold));

    let types: Vec<_> = m
        .store
        .get_events_for_aggregate(order_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        ["OrderCreated", "PaymentInitiated", "PaymentVerified", "OrderCompleted"]
    );
}

#[tokio::test]
async fn verify_on_rejected_order_keeps_status() {
    let m = market().await;
    let order_id = place(&m).await;
    let payment = m
        .ledger
        .initiate(submission(&m, order_id, "BANK-002"))
        .await
        .unwrap()
        .payment;
    m.orders
        .reject(RejectOrder::new(order_id, m.seller))
        .await
        .unwrap();

    let result = m
        .ledger
        .verify(VerifyPayment::new(order_id, payment.id, m.staff))
        .await
        .unwrap();

    assert_eq!(result.order.status(), OrderStatus::Rejected);
    assert_eq!(result.order.payment_status(), PaymentStatus::Paid);
    assert_eq!(m.catalog.status(m.item_id).await, Some(ItemStatus::Available));
}

#[tokio::test]
async fn initiate_on_rejected_order_is_invalid_state() {
    let m = market().await;
    let order_id = place(&m).await;
    m.orders
        .reject(RejectOrder::new(order_id, m.seller))
        .await
        .unwrap();

    let err = m
        .ledger
        .initiate(submission(&m, order_id, "BANK-003"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn cancelled_payment_can_be_replaced() {
    let m = market().await;
    let order_id = place(&m).await;
    m.orders
        .accept(AcceptOrder::new(order_id, m.seller))
        .await
        .unwrap();

    m.ledger
        .initiate(submission(&m, order_id, "BANK-004"))
        .await
        .unwrap();
    m.ledger
        .cancel(CancelPayment::new(order_id, m.buyer))
        .await
        .unwrap();

    let err = m
        .ledger
        .cancel(CancelPayment::new(order_id, m.buyer))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let second = m
        .ledger
        .initiate(submission(&m, order_id, "BANK-005"))
        .await
        .unwrap();
    assert_eq!(second.order.payments().len(), 2);
    assert_eq!(second.order.active_payment().unwrap().id, second.payment.id);
}

#[tokio::test]
async fn seller_cannot_cancel_payment() {
    let m = market().await;
    let order_id = place(&m).await;
    m.ledger
        .initiate(submission(&m, order_id, "BANK-006"))
        .await
        .unwrap();

    let err = m
        .ledger
        .cancel(CancelPayment::new(order_id, m.seller))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_initiations_admit_one_payment() {
    let m = market().await;
    let order_id = place(&m).await;

    let handles: Vec<_> = ["BANK-100", "BANK-101", "BANK-102"]
        .into_iter()
        .map(|reference| {
            let ledger = m.ledger.clone();
            let cmd = submission(&m, order_id, reference);
            tokio::spawn(async move { ledger.initiate(cmd).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict, "{e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(m.ledger.payments(order_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn payment_path_does_not_touch_buyer_counter() {
    let m = market().await;
    let order_id = place(&m).await;
    let payment = m
        .ledger
        .initiate(submission(&m, order_id, "BANK-007"))
        .await
        .unwrap()
        .payment;

    m.ledger
        .verify(VerifyPayment::new(order_id, payment.id, m.staff))
        .await
        .unwrap();

    assert_eq!(m.users.order_count(m.buyer).await, Some(0));
}

#[tokio::test]
async fn payments_for_unknown_order() {
    let m = market().await;
    let err = m.ledger.payments(AggregateId::new()).await.unwrap_err();
    assert!(matches!(err, DomainError::OrderNotFound(_)));
}
