//! End-to-end tests through the Marketplace facade.

use std::sync::Arc;

use common::{AggregateId, UserId};
use domain::{
    AcceptOrder, Aggregate, CancelOrder, CatalogItem, CompleteOrder, DeliveryInfo, ErrorKind,
    InMemoryItemCatalog, InMemoryUserDirectory, InitiatePayment, ItemId, ItemStatus, Language,
    Money, OrderStatus, PaymentStatus, PlaceOrder, RejectOrder, UserProfile, VerifyPayment,
};
use event_store::InMemoryEventStore;
use marketplace::{Collaborators, Config, Marketplace};
use notifications::{Channel, ChannelSet, NotificationFilter, NotificationType, RecordingChannels};
use projections::OrderFilter;
use tokio::sync::watch;

struct World {
    marketplace: Marketplace<InMemoryEventStore>,
    catalog: InMemoryItemCatalog,
    users: InMemoryUserDirectory,
    recording: Arc<RecordingChannels>,
    buyer: UserId,
    seller: UserId,
    staff: UserId,
    item_id: ItemId,
    _shutdown: watch::Sender<bool>,
}

async fn world(available: u32) -> World {
    let catalog = InMemoryItemCatalog::new();
    let users = InMemoryUserDirectory::new();
    let buyer = users
        .insert(
            UserProfile::member("Noura")
                .with_email("noura@example.com")
                .with_language(Language::En),
        )
        .await;
    let seller = users
        .insert(UserProfile::member("Faisal").with_phone("+966500000007"))
        .await;
    let staff = users.insert(UserProfile::staff("Payments desk")).await;
    let item_id = catalog
        .insert(CatalogItem::new(
            seller,
            "Standing desk",
            Money::from_cents(1000),
            available,
        ))
        .await;

    let recording = Arc::new(RecordingChannels::new());
    let collaborators = Collaborators::in_memory(Arc::new(catalog.clone()), Arc::new(users.clone()))
        .with_channels(ChannelSet::uniform(recording.clone()));
    let (shutdown, shutdown_rx) = watch::channel(false);
    let (marketplace, _dispatcher) = Marketplace::start(
        InMemoryEventStore::new(),
        collaborators,
        &Config::default(),
        shutdown_rx,
    );

    World {
        marketplace,
        catalog,
        users,
        recording,
        buyer,
        seller,
        staff,
        item_id,
        _shutdown: shutdown,
    }
}

async fn place(w: &World, quantity: u32) -> AggregateId {
    w.marketplace
        .create_order(PlaceOrder::new(
            w.buyer,
            w.item_id,
            quantity,
            DeliveryInfo::new("8 Olive St", "+966500000008"),
        ))
        .await
        .unwrap()
        .aggregate
        .id()
        .unwrap()
}

async fn types_for(w: &World, user: UserId) -> Vec<NotificationType> {
    let mut types: Vec<_> = w
        .marketplace
        .notifications()
        .list(user, NotificationFilter::default())
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.notification_type)
        .collect();
    types.sort_by_key(|t| t.as_str());
    types
}

#[tokio::test]
async fn test_accept_and_complete_scenario() {
    let w = world(5).await;
    let order_id = place(&w, 2).await;

    let order = w.marketplace.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.total_price(), Money::from_cents(2000));

    w.marketplace
        .accept(AcceptOrder::new(order_id, w.seller))
        .await
        .unwrap();
    let completed = w
        .marketplace
        .complete(CompleteOrder::new(order_id, w.seller))
        .await
        .unwrap();

    assert_eq!(completed.aggregate.status(), OrderStatus::Completed);
    assert_eq!(w.users.order_count(w.buyer).await, Some(1));
    assert_eq!(
        w.catalog.status(w.item_id).await,
        Some(ItemStatus::Available)
    );

    let summary = w.marketplace.board().get(order_id).await.unwrap();
    assert_eq!(summary.status, OrderStatus::Completed);
    assert_eq!(types_for(&w, w.seller).await, vec![NotificationType::NewOrder]);
    assert_eq!(
        types_for(&w, w.buyer).await,
        vec![NotificationType::OrderAccepted, NotificationType::OrderCompleted]
    );
}

#[tokio::test]
async fn test_payment_verification_completes_order_and_sells_item() {
    let w = world(1).await;
    let order_id = place(&w, 1).await;
    w.marketplace
        .accept(AcceptOrder::new(order_id, w.seller))
        .await
        .unwrap();

    let initiated = w
        .marketplace
        .initiate_payment(InitiatePayment::new(
            order_id,
            w.buyer,
            "+966500000008",
            Money::from_cents(1000),
            "TRX-0001",
        ))
        .await
        .unwrap();
    let payment_id = initiated.payment.id;
    assert_eq!(
        w.marketplace.board().get(order_id).await.unwrap().payment_status,
        PaymentStatus::Verifying
    );

    let verify = VerifyPayment::new(order_id, payment_id, w.staff);
    let first = w.marketplace.verify_payment(verify).await.unwrap();
    let second = w.marketplace.verify_payment(verify).await.unwrap();

    assert_eq!(first.order.status(), OrderStatus::Completed);
    assert_eq!(first.order.payment_status(), PaymentStatus::Paid);
    assert!(second.events.is_empty());
    assert_eq!(second.order.status(), OrderStatus::Completed);
    assert_eq!(w.catalog.status(w.item_id).await, Some(ItemStatus::Sold));

    let summary = w.marketplace.board().get(order_id).await.unwrap();
    assert_eq!(summary.status, OrderStatus::Completed);
    assert_eq!(summary.payment_status, PaymentStatus::Paid);
    assert_eq!(w.marketplace.payments_for(order_id).await.unwrap().len(), 1);

    let completions = w
        .marketplace
        .notifications()
        .list(w.buyer, NotificationFilter::of_type(NotificationType::OrderCompleted))
        .await
        .unwrap();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].sender, Some(w.staff));
}

#[tokio::test]
async fn test_rejected_order_cannot_be_cancelled() {
    let w = world(5).await;
    let order_id = place(&w, 1).await;
    w.marketplace
        .reject(RejectOrder::new(order_id, w.seller))
        .await
        .unwrap();

    let err = w
        .marketplace
        .cancel(CancelOrder::new(order_id, w.buyer))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let order = w.marketplace.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Rejected);
    assert_eq!(order.tracking().len(), 2);
}

#[tokio::test]
async fn test_errors_keep_their_kind() {
    let w = world(5).await;
    let order_id = place(&w, 1).await;

    let err = w
        .marketplace
        .accept(AcceptOrder::new(order_id, w.buyer))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    let err = w
        .marketplace
        .accept(AcceptOrder::new(AggregateId::new(), w.seller))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = w
        .marketplace
        .create_order(PlaceOrder::new(
            w.buyer,
            w.item_id,
            0,
            DeliveryInfo::new("8 Olive St", "+966500000008"),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_channel_delivery_follows_preferences() {
    let w = world(5).await;
    place(&w, 1).await;
    w.marketplace.flush_notifications().await.unwrap();

    // seller has a phone but SMS is off by default, and no email address
    assert_eq!(w.recording.sent_on(Channel::Push).await.len(), 1);
    assert!(w.recording.sent_on(Channel::Sms).await.is_empty());
    assert!(w.recording.sent_on(Channel::Email).await.is_empty());

    let listed = w
        .marketplace
        .board()
        .for_seller(w.seller, OrderFilter::default())
        .await;
    assert_eq!(listed.len(), 1);
}
