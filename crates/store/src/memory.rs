use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PageRequest};
use domain::{
    Cart, CustomerId, Order, OrderStatus, Payment, PaymentId, PaymentStatus, Product, ProductId,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{
        CartStore, OrderStore, PaymentStore, ProductStore, Reservation, StockDemand,
        WebhookEventLog,
    },
};

#[derive(Default)]
struct State {
    carts: HashMap<CustomerId, Cart>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    reservations: BTreeMap<OrderId, Reservation>,
    processed_events: HashMap<String, (String, DateTime<Utc>)>,
}

/// In-memory store implementation for testing.
///
/// Every trait method takes the single state lock, so each call is atomic
/// with respect to every other call, matching the transactional guarantees
/// of the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    fail_order_writes: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores (or replaces) a customer's cart.
    pub async fn put_cart(&self, cart: Cart) {
        self.state
            .write()
            .await
            .carts
            .insert(cart.customer_id, cart);
    }

    /// Stores (or replaces) a catalog product.
    pub async fn put_product(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    /// Changes a product's catalog price.
    pub async fn set_price(&self, id: &ProductId, price: domain::Money) {
        if let Some(product) = self.state.write().await.products.get_mut(id) {
            product.price = price;
        }
    }

    /// Current stock of a product, if it exists.
    pub async fn stock_of(&self, id: &ProductId) -> Option<u32> {
        self.state.read().await.products.get(id).map(|p| p.stock)
    }

    /// Total number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Makes subsequent `create_order` calls fail, to exercise the
    /// reservation-without-order path.
    pub fn set_fail_on_order_write(&self, fail: bool) {
        self.fail_order_writes.store(fail, Ordering::SeqCst);
    }
}

fn paginate<T: Clone>(mut rows: Vec<T>, page: PageRequest) -> Page<T> {
    let total = rows.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    let items = if offset >= rows.len() {
        Vec::new()
    } else {
        rows.drain(offset..).take(limit).collect()
    };
    Page::new(items, total, page)
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_cart(&self, customer_id: CustomerId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&customer_id).cloned())
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(id).cloned())
    }

    async fn reserve_stock(
        &self,
        order_id: OrderId,
        demands: &[StockDemand],
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        if state.reservations.contains_key(&order_id) {
            return Err(StoreError::Duplicate {
                entity: "reservation",
                id: order_id.to_string(),
            });
        }

        // Check everything before touching anything.
        for demand in demands {
            let available = state
                .products
                .get(&demand.product_id)
                .map(|p| p.stock)
                .unwrap_or(0);
            if available < demand.quantity {
                return Err(StoreError::InsufficientStock {
                    product_id: demand.product_id.clone(),
                });
            }
        }

        for demand in demands {
            if let Some(product) = state.products.get_mut(&demand.product_id) {
                product.stock -= demand.quantity;
            }
        }

        state.reservations.insert(
            order_id,
            Reservation {
                order_id,
                items: demands.to_vec(),
                created_at: at,
            },
        );
        Ok(())
    }

    async fn settle_reservation(&self, order_id: OrderId) -> Result<bool> {
        Ok(self
            .state
            .write()
            .await
            .reservations
            .remove(&order_id)
            .is_some())
    }

    async fn release_reservation(&self, order_id: OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(reservation) = state.reservations.remove(&order_id) else {
            return Ok(false);
        };
        for demand in reservation.items {
            if let Some(product) = state.products.get_mut(&demand.product_id) {
                product.stock += demand.quantity;
            }
        }
        Ok(true)
    }

    async fn unsettled_reservations(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut reservations: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.created_at < created_before)
            .cloned()
            .collect();
        reservations.sort_by_key(|r| (r.created_at, r.order_id));
        Ok(reservations)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(&self, order: &Order) -> Result<()> {
        if self.fail_order_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order writes disabled".to_string()));
        }

        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders_by_customer(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(orders, page))
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_payment_intent(
        &self,
        id: OrderId,
        payment_id: &PaymentId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&id) {
            Some(order) if order.payment_intent_id.is_none() => {
                order.payment_intent_id = Some(payment_id.clone());
                order.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_payment_status_by_intent(
        &self,
        payment_id: &PaymentId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<OrderId>> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .values_mut()
            .find(|o| o.payment_intent_id.as_ref() == Some(payment_id))
            .filter(|o| o.payment_status == status || o.payment_status.can_reach(status));
        Ok(order.map(|order| {
            order.payment_status = status;
            order.updated_at = at;
            order.id
        }))
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.id) {
            return Err(StoreError::Duplicate {
                entity: "payment",
                id: payment.id.to_string(),
            });
        }
        state.payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        Ok(self.state.read().await.payments.get(id).cloned())
    }

    async fn list_payments_by_customer(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|p| p.customer_id == customer_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(paginate(payments, page))
    }

    async fn update_payment_status(
        &self,
        id: &PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
        event_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.payments.get_mut(id) {
            Some(payment) if payment.status == from => {
                payment.status = to;
                payment.last_event_at = event_at.max(payment.last_event_at);
                payment.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl WebhookEventLog for InMemoryStore {
    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .processed_events
            .contains_key(event_id))
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.processed_events.contains_key(event_id) {
            return Ok(false);
        }
        state
            .processed_events
            .insert(event_id.to_string(), (event_type.to_string(), at));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use domain::{Currency, Money, ShippingAddress};

    use super::*;

    fn widget(stock: u32) -> Product {
        Product::new("SKU-001", "Widget", Money::from_cents(1000), stock)
    }

    fn order_for(customer_id: CustomerId) -> Order {
        let cart = Cart::new(customer_id).with_line("SKU-001", 1, Money::from_cents(1000));
        let address = ShippingAddress::new("1 Main St", "Springfield", "IL", "62701", "US");
        Order::from_cart(&cart, address, Utc::now()).unwrap()
    }

    fn payment(id: &str, customer_id: CustomerId) -> Payment {
        Payment::pending(
            PaymentId::new(id),
            customer_id,
            Money::from_cents(1000),
            Currency::parse("usd").unwrap(),
            "test",
            "card",
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_reserve_stock_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store.put_product(widget(5)).await;
        store
            .put_product(Product::new("SKU-002", "Gadget", Money::from_cents(500), 1))
            .await;

        let demands = vec![StockDemand::new("SKU-001", 2), StockDemand::new("SKU-002", 2)];
        let err = store
            .reserve_stock(OrderId::new(), &demands, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InsufficientStock { ref product_id } if product_id.as_str() == "SKU-002"));
        assert_eq!(store.stock_of(&ProductId::new("SKU-001")).await, Some(5));
        assert!(store.unsettled_reservations(Utc::now() + Duration::seconds(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_returns_stock() {
        let store = InMemoryStore::new();
        store.put_product(widget(5)).await;
        let order_id = OrderId::new();

        store
            .reserve_stock(order_id, &[StockDemand::new("SKU-001", 4)], Utc::now())
            .await
            .unwrap();
        assert_eq!(store.stock_of(&ProductId::new("SKU-001")).await, Some(1));

        assert!(store.release_reservation(order_id).await.unwrap());
        assert_eq!(store.stock_of(&ProductId::new("SKU-001")).await, Some(5));
        assert!(!store.release_reservation(order_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_settle_keeps_stock_taken() {
        let store = InMemoryStore::new();
        store.put_product(widget(5)).await;
        let order_id = OrderId::new();

        store
            .reserve_stock(order_id, &[StockDemand::new("SKU-001", 4)], Utc::now())
            .await
            .unwrap();
        assert!(store.settle_reservation(order_id).await.unwrap());
        assert!(!store.release_reservation(order_id).await.unwrap());
        assert_eq!(store.stock_of(&ProductId::new("SKU-001")).await, Some(1));
    }

    #[tokio::test]
    async fn test_unsettled_reservations_respect_cutoff() {
        let store = InMemoryStore::new();
        store.put_product(widget(10)).await;
        let now = Utc::now();
        let old = OrderId::new();
        let fresh = OrderId::new();

        store
            .reserve_stock(old, &[StockDemand::new("SKU-001", 1)], now - Duration::minutes(30))
            .await
            .unwrap();
        store
            .reserve_stock(fresh, &[StockDemand::new("SKU-001", 1)], now)
            .await
            .unwrap();

        let stale = store
            .unsettled_reservations(now - Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].order_id, old);
    }

    #[tokio::test]
    async fn test_order_status_compare_and_set() {
        let store = InMemoryStore::new();
        let order = order_for(CustomerId::new());
        store.create_order(&order).await.unwrap();

        assert!(store
            .update_order_status(order.id, OrderStatus::Pending, OrderStatus::Confirmed, Utc::now())
            .await
            .unwrap());
        assert!(!store
            .update_order_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled, Utc::now())
            .await
            .unwrap());

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_duplicate_order_is_rejected() {
        let store = InMemoryStore::new();
        let order = order_for(CustomerId::new());
        store.create_order(&order).await.unwrap();
        assert!(matches!(
            store.create_order(&order).await,
            Err(StoreError::Duplicate { entity: "order", .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_order_writes() {
        let store = InMemoryStore::new();
        store.set_fail_on_order_write(true);
        let result = store.create_order(&order_for(CustomerId::new())).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_orders_paginates_per_customer() {
        let store = InMemoryStore::new();
        let customer = CustomerId::new();
        for _ in 0..3 {
            store.create_order(&order_for(customer)).await.unwrap();
        }
        store.create_order(&order_for(CustomerId::new())).await.unwrap();

        let page = store
            .list_orders_by_customer(customer, PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);

        let beyond = store
            .list_orders_by_customer(customer, PageRequest::new(5, 2))
            .await
            .unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 3);
    }

    #[tokio::test]
    async fn test_payment_intent_is_linked_once() {
        let store = InMemoryStore::new();
        let order = order_for(CustomerId::new());
        store.create_order(&order).await.unwrap();

        assert!(store
            .set_payment_intent(order.id, &PaymentId::new("pi_1"), Utc::now())
            .await
            .unwrap());
        assert!(!store
            .set_payment_intent(order.id, &PaymentId::new("pi_2"), Utc::now())
            .await
            .unwrap());

        let updated = store
            .update_payment_status_by_intent(&PaymentId::new("pi_1"), PaymentStatus::Succeeded, Utc::now())
            .await
            .unwrap();
        assert_eq!(updated, Some(order.id));
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_order_payment_mirror_never_moves_backwards() {
        let store = InMemoryStore::new();
        let order = order_for(CustomerId::new());
        store.create_order(&order).await.unwrap();
        let intent = PaymentId::new("pi_1");
        store.set_payment_intent(order.id, &intent, Utc::now()).await.unwrap();

        let mirror = |status| {
            let store = store.clone();
            let intent = intent.clone();
            async move {
                store
                    .update_payment_status_by_intent(&intent, status, Utc::now())
                    .await
                    .unwrap()
            }
        };

        assert_eq!(mirror(PaymentStatus::Refunded).await, Some(order.id));
        assert_eq!(mirror(PaymentStatus::Succeeded).await, None);
        assert_eq!(mirror(PaymentStatus::Failed).await, None);
        assert_eq!(mirror(PaymentStatus::Refunded).await, Some(order.id));

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_payment_status_compare_and_set_tracks_event_time() {
        let store = InMemoryStore::new();
        let payment = payment("pi_9", CustomerId::new());
        store.create_payment(&payment).await.unwrap();
        let event_at = Utc::now();

        assert!(store
            .update_payment_status(&payment.id, PaymentStatus::Pending, PaymentStatus::Succeeded, Some(event_at), Utc::now())
            .await
            .unwrap());
        assert!(!store
            .update_payment_status(&payment.id, PaymentStatus::Pending, PaymentStatus::Failed, None, Utc::now())
            .await
            .unwrap());
        assert!(!store
            .update_payment_status(&PaymentId::new("pi_missing"), PaymentStatus::Pending, PaymentStatus::Failed, None, Utc::now())
            .await
            .unwrap());

        let stored = store.get_payment(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Succeeded);
        assert_eq!(stored.last_event_at, Some(event_at));
    }

    #[tokio::test]
    async fn test_mark_processed_once() {
        let store = InMemoryStore::new();
        assert!(!store.is_processed("evt_1").await.unwrap());
        assert!(store.mark_processed("evt_1", "charge.refunded", Utc::now()).await.unwrap());
        assert!(!store.mark_processed("evt_1", "charge.refunded", Utc::now()).await.unwrap());
        assert!(store.is_processed("evt_1").await.unwrap());
    }
}
