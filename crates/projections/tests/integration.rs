//! Integration tests: order and payment commands → ProjectionProcessor → order board.

use std::sync::Arc;

use common::{AggregateId, UserId};
use domain::{
    AcceptOrder, Aggregate, CancelOrder, CatalogItem, CompleteOrder, DeliveryInfo, InMemoryItemCatalog,
    InMemoryUserDirectory, InitiatePayment, ItemId, Money, OrderService, OrderStatus,
    PaymentLedger, PaymentStatus, PlaceOrder, RejectOrder, UserProfile, VerifyPayment,
};
use event_store::{InMemoryEventStore, InMemoryKeyRegistry, Sequence};
use projections::{OrderBoardView, OrderFilter, ProjectionProcessor};

struct Setup {
    orders: OrderService<InMemoryEventStore>,
    ledger: PaymentLedger<InMemoryEventStore>,
    processor: ProjectionProcessor<InMemoryEventStore>,
    board: OrderBoardView,
    buyer: UserId,
    seller: UserId,
    staff: UserId,
    item_id: ItemId,
}

async fn setup() -> Setup {
    let store = InMemoryEventStore::new();
    let catalog = InMemoryItemCatalog::new();
    let users = InMemoryUserDirectory::new();
    let keys = Arc::new(InMemoryKeyRegistry::new());

    let buyer = users.insert(UserProfile::member("Aisha")).await;
    let seller = users.insert(UserProfile::member("Yousef")).await;
    let staff = users.insert(UserProfile::staff("Ops")).await;
    let item_id = catalog
        .insert(CatalogItem::new(seller, "Cast iron pan", Money::from_cents(4000), 10))
        .await;

    let catalog = Arc::new(catalog);
    let users = Arc::new(users);
    let orders = OrderService::new(store.clone(), catalog.clone(), users.clone(), keys.clone());
    let ledger = PaymentLedger::new(store.clone(), catalog, users, keys);

    let board = OrderBoardView::new();
    let mut processor = ProjectionProcessor::new(store);
    processor.register(Box::new(board.clone()));

    Setup {
        orders,
        ledger,
        processor,
        board,
        buyer,
        seller,
        staff,
        item_id,
    }
}

async fn place(s: &Setup, quantity: u32) -> AggregateId {
    s.orders
        .create_order(PlaceOrder::new(
            s.buyer,
            s.item_id,
            quantity,
            DeliveryInfo::new("15 Dune St", "+966500000005"),
        ))
        .await
        .unwrap()
        .aggregate
        .id()
        .unwrap()
}

#[tokio::test]
async fn test_board_follows_order_lifecycle() {
    let s = setup().await;
    let order_id = place(&s, 2).await;

    s.processor.run_catch_up().await.unwrap();
    let summary = s.board.get(order_id).await.unwrap();
    assert_eq!(summary.status, OrderStatus::Pending);
    assert_eq!(summary.total_price, Money::from_cents(8000));

    s.orders
        .accept(AcceptOrder::new(order_id, s.seller))
        .await
        .unwrap();
    s.orders
        .complete(CompleteOrder::new(order_id, s.seller))
        .await
        .unwrap();
    s.processor.run_catch_up().await.unwrap();

    let summary = s.board.get(order_id).await.unwrap();
    assert_eq!(summary.status, OrderStatus::Completed);
    assert_eq!(
        s.processor.checkpoint("OrderBoardView").await.unwrap(),
        Sequence::new(3)
    );

    let stats = s.board.stats(s.buyer).await;
    assert_eq!(stats.buying.completed, 1);
    assert_eq!(stats.buying.total_spent, Money::from_cents(8000));
}

#[tokio::test]
async fn test_board_tracks_payments() {
    let s = setup().await;
    let order_id = place(&s, 1).await;

    let payment = s
        .ledger
        .initiate(InitiatePayment::new(
            order_id,
            s.buyer,
            "+966533333333",
            Money::from_cents(4000),
            "XFER-1",
        ))
        .await
        .unwrap()
        .payment;
    s.processor.run_catch_up().await.unwrap();
    assert_eq!(
        s.board.get(order_id).await.unwrap().payment_status,
        PaymentStatus::Verifying
    );

    s.ledger
        .verify(VerifyPayment::new(order_id, payment.id, s.staff))
        .await
        .unwrap();
    s.processor.run_catch_up().await.unwrap();

    let summary = s.board.get(order_id).await.unwrap();
    assert_eq!(summary.payment_status, PaymentStatus::Paid);
    assert_eq!(summary.status, OrderStatus::Completed);
}

#[tokio::test]
async fn test_buyer_and_seller_listings() {
    let s = setup().await;
    let first = place(&s, 1).await;
    let second = place(&s, 1).await;
    let third = place(&s, 1).await;

    s.orders
        .reject(RejectOrder::new(first, s.seller))
        .await
        .unwrap();
    s.orders
        .cancel(CancelOrder::new(second, s.buyer))
        .await
        .unwrap();
    s.processor.run_catch_up().await.unwrap();

    assert_eq!(s.board.len().await, 3);
    let all = s.board.for_buyer(s.buyer, OrderFilter::default()).await;
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let pending = s
        .board
        .for_seller(s.seller, OrderFilter::status(OrderStatus::Pending))
        .await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].order_id, third);

    let stats = s.board.stats(s.seller).await;
    assert_eq!(stats.selling.total, 3);
    assert_eq!(stats.selling.pending, 1);
    assert_eq!(s.board.stats(s.buyer).await.buying.cancelled, 1);
}

#[tokio::test]
async fn test_rebuild_reproduces_board() {
    let s = setup().await;
    let order_id = place(&s, 1).await;
    s.orders
        .accept(AcceptOrder::new(order_id, s.seller))
        .await
        .unwrap();
    s.processor.run_catch_up().await.unwrap();
    let before = s.board.get(order_id).await.unwrap();

    s.processor.rebuild_all().await.unwrap();
    assert_eq!(s.board.get(order_id).await.unwrap(), before);
}
