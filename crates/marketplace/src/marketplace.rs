//! The facade wiring the order lifecycle, the payment ledger, the
//! subscribers and notification dispatch together.

use std::sync::Arc;

use common::{AggregateId, UserId};
use domain::{
    AcceptOrder, AllowedActions, CancelOrder, CancelPayment, CommandResult, CompleteOrder,
    InitiatePayment, ItemCatalog, Order, OrderService, Payment, PaymentLedger, PaymentResult,
    PlaceOrder, RejectOrder, StartOrder, UpdateOrderDetails, UpdateOrderStatus, UserDirectory,
    VerifyPayment,
};
use event_store::{EventStore, InMemoryKeyRegistry, KeyRegistry};
use notifications::{
    ChannelSet, DispatchHandle, Dispatcher, InMemoryNotificationStore, InMemoryPreferenceStore,
    NotificationRouter, NotificationStore, OrderNotifications, PreferenceStore, TracingChannels,
};
use projections::{CheckpointStore, InMemoryCheckpointStore, OrderBoardView, ProjectionProcessor};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::Result;

/// Everything the core needs from its surroundings.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn ItemCatalog>,
    pub users: Arc<dyn UserDirectory>,
    pub keys: Arc<dyn KeyRegistry>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub notification_store: Arc<dyn NotificationStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub channels: ChannelSet,
}

impl Collaborators {
    /// In-memory storage and logging channel adapters around the given
    /// catalog and user directory.
    pub fn in_memory(catalog: Arc<dyn ItemCatalog>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            catalog,
            users,
            keys: Arc::new(InMemoryKeyRegistry::new()),
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            notification_store: Arc::new(InMemoryNotificationStore::new()),
            preferences: Arc::new(InMemoryPreferenceStore::new()),
            channels: ChannelSet::uniform(Arc::new(TracingChannels)),
        }
    }

    pub fn with_keys(mut self, keys: Arc<dyn KeyRegistry>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn with_notification_store(mut self, store: Arc<dyn NotificationStore>) -> Self {
        self.notification_store = store;
        self
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_channels(mut self, channels: ChannelSet) -> Self {
        self.channels = channels;
        self
    }
}

/// Entry point for callers of the marketplace core.
///
/// Every successful command is followed by a catch-up run, so the order
/// board and the notification inboxes reflect it when the call returns.
/// Channel sends still happen in the background.
pub struct Marketplace<S: EventStore + Clone + 'static> {
    orders: OrderService<S>,
    payments: PaymentLedger<S>,
    processor: Arc<ProjectionProcessor<S>>,
    board: OrderBoardView,
    notifications: NotificationRouter,
    dispatch: DispatchHandle,
}

impl<S: EventStore + Clone + 'static> Marketplace<S> {
    /// Builds the services and starts the dispatch worker, which stops when
    /// `shutdown` flips to true.
    pub fn start(
        store: S,
        collaborators: Collaborators,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let Collaborators {
            catalog,
            users,
            keys,
            checkpoints,
            notification_store,
            preferences,
            channels,
        } = collaborators;

        let orders = OrderService::with_config(
            store.clone(),
            catalog.clone(),
            users.clone(),
            keys.clone(),
            config.orders,
        );
        let payments =
            PaymentLedger::with_config(store.clone(), catalog, users.clone(), keys, config.orders);

        let (dispatch, worker) = Dispatcher::with_config(
            notification_store.clone(),
            channels,
            &config.notifications,
        )
        .spawn(shutdown);
        let notifications =
            NotificationRouter::new(notification_store, preferences, users, dispatch.clone())
                .with_config(config.notifications);

        let board = OrderBoardView::new();
        let mut processor = ProjectionProcessor::with_checkpoints(store.clone(), checkpoints)
            .with_config(config.projections);
        processor.register(Box::new(board.clone()));
        processor.register(Box::new(OrderNotifications::new(
            notifications.clone(),
            store,
        )));

        let marketplace = Self {
            orders,
            payments,
            processor: Arc::new(processor),
            board,
            notifications,
            dispatch,
        };
        (marketplace, worker)
    }

    /// Runs the subscribers on a poll loop until `shutdown` flips to true.
    pub fn spawn_processor(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.processor.clone().run(shutdown))
    }

    /// Delivers pending events to the subscribers.
    ///
    /// A failing subscriber is logged and left behind; the next run picks
    /// it up from its checkpoint.
    pub async fn sync(&self) {
        if let Err(e) = self.processor.run_catch_up().await {
            tracing::warn!(error = %e, "subscribers behind after command");
            metrics::counter!("marketplace_sync_failures_total").increment(1);
        }
    }

    /// Waits until every notification queued so far has been dispatched.
    pub async fn flush_notifications(&self) -> Result<()> {
        Ok(self.dispatch.flush().await?)
    }

    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    pub fn payments(&self) -> &PaymentLedger<S> {
        &self.payments
    }

    pub fn board(&self) -> &OrderBoardView {
        &self.board
    }

    pub fn notifications(&self) -> &NotificationRouter {
        &self.notifications
    }

    pub fn processor(&self) -> &Arc<ProjectionProcessor<S>> {
        &self.processor
    }

    pub async fn create_order(&self, cmd: PlaceOrder) -> Result<CommandResult<Order>> {
        let result = self.orders.create_order(cmd).await?;
        self.sync().await;
        Ok(result)
    }

    pub async fn accept(&self, cmd: AcceptOrder) -> Result<CommandResult<Order>> {
        let result = self.orders.accept(cmd).await?;
        self.sync().await;
        Ok(result)
    }

    pub async fn reject(&self, cmd: RejectOrder) -> Result<CommandResult<Order>> {
        let result = self.orders.reject(cmd).await?;
        self.sync().await;
        Ok(result)
    }

    pub async fn start_progress(&self, cmd: StartOrder) -> Result<CommandResult<Order>> {
        let result = self.orders.start_progress(cmd).await?;
        self.sync().await;
        Ok(result)
    }

    pub async fn complete(&self, cmd: CompleteOrder) -> Result<CommandResult<Order>> {
        let result = self.orders.complete(cmd).await?;
        self.sync().await;
        Ok(result)
    }

    pub async fn cancel(&self, cmd: CancelOrder) -> Result<CommandResult<Order>> {
        let result = self.orders.cancel(cmd).await?;
        self.sync().await;
        Ok(result)
    }

    pub async fn update_status(&self, cmd: UpdateOrderStatus) -> Result<CommandResult<Order>> {
        let result = self.orders.update_status(cmd).await?;
        self.sync().await;
        Ok(result)
    }

    pub async fn update_details(&self, cmd: UpdateOrderDetails) -> Result<CommandResult<Order>> {
        let result = self.orders.update_details(cmd).await?;
        self.sync().await;
        Ok(result)
    }

    pub async fn initiate_payment(&self, cmd: InitiatePayment) -> Result<PaymentResult> {
        let result = self.payments.initiate(cmd).await?;
        self.sync().await;
        Ok(result)
    }

    pub async fn verify_payment(&self, cmd: VerifyPayment) -> Result<PaymentResult> {
        let result = self.payments.verify(cmd).await?;
        if !result.events.is_empty() {
            self.sync().await;
        }
        Ok(result)
    }

    pub async fn cancel_payment(&self, cmd: CancelPayment) -> Result<PaymentResult> {
        let result = self.payments.cancel(cmd).await?;
        self.sync().await;
        Ok(result)
    }

    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>> {
        Ok(self.orders.get_order(order_id).await?)
    }

    pub async fn allowed_actions(
        &self,
        order_id: AggregateId,
        actor: UserId,
    ) -> Result<AllowedActions> {
        Ok(self.orders.allowed_actions(order_id, actor).await?)
    }

    pub async fn payments_for(&self, order_id: AggregateId) -> Result<Vec<Payment>> {
        Ok(self.payments.payments(order_id).await?)
    }
}
