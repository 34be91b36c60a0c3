//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{OrderId, PageRequest};
use domain::{
    Cart, Currency, CustomerId, Money, Order, OrderStatus, Payment, PaymentId, PaymentStatus,
    ProductId, ProductStatus, ShippingAddress,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    CartStore, OrderStore, PaymentStore, PostgresStore, ProductStore, StockDemand, StoreError,
    WebhookEventLog,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_fulfillment_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(25)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_items, orders, payments, stock_reservations, \
         processed_webhook_events, cart_items, carts, products",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

async fn seed_product(store: &PostgresStore, id: &str, price_cents: i64, stock: i64) {
    sqlx::query("INSERT INTO products (id, name, price_cents, stock) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(format!("Product {id}"))
        .bind(price_cents)
        .bind(stock)
        .execute(store.pool())
        .await
        .unwrap();
}

async fn stock_of(store: &PostgresStore, id: &str) -> u32 {
    store
        .get_product(&ProductId::new(id))
        .await
        .unwrap()
        .unwrap()
        .stock
}

fn address() -> ShippingAddress {
    ShippingAddress::new("1 Main St", "Springfield", "IL", "62701", "US")
}

fn order_for(customer_id: CustomerId) -> Order {
    let cart = Cart::new(customer_id)
        .with_line("SKU-A", 2, Money::from_cents(1000))
        .with_line("SKU-B", 1, Money::from_cents(2500));
    Order::from_cart(&cart, address(), Utc::now()).unwrap()
}

fn payment(id: &str, customer_id: CustomerId) -> Payment {
    Payment::pending(
        PaymentId::new(id),
        customer_id,
        Money::from_cents(4500),
        Currency::parse("usd").unwrap(),
        "Order payment",
        "card",
        Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn product_round_trip() {
    let store = get_test_store().await;
    seed_product(&store, "SKU-A", 1000, 5).await;

    let product = store
        .get_product(&ProductId::new("SKU-A"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.price, Money::from_cents(1000));
    assert_eq!(product.stock, 5);
    assert_eq!(product.status, ProductStatus::Active);

    assert!(store.get_product(&ProductId::new("missing")).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn cart_is_read_with_line_totals() {
    let store = get_test_store().await;
    let customer = CustomerId::new();

    assert!(store.get_cart(customer).await.unwrap().is_none());

    sqlx::query("INSERT INTO carts (customer_id) VALUES ($1)")
        .bind(customer.as_uuid())
        .execute(store.pool())
        .await
        .unwrap();
    let empty = store.get_cart(customer).await.unwrap().unwrap();
    assert!(empty.is_empty());

    sqlx::query(
        "INSERT INTO cart_items (customer_id, product_id, quantity, unit_price_cents) \
         VALUES ($1, 'SKU-A', 2, 1000), ($1, 'SKU-B', 1, 2500)",
    )
    .bind(customer.as_uuid())
    .execute(store.pool())
    .await
    .unwrap();

    let cart = store.get_cart(customer).await.unwrap().unwrap();
    assert_eq!(cart.len(), 2);
    assert_eq!(cart.total(), Money::from_cents(4500));
}

#[tokio::test]
#[serial]
async fn payment_status_mirror_only_moves_forward() {
    let store = get_test_store().await;
    let order = order_for(CustomerId::new());
    store.create_order(&order).await.unwrap();
    let intent = PaymentId::new("pi_mirror");
    assert!(store.set_payment_intent(order.id, &intent, Utc::now()).await.unwrap());

    let refunded = store
        .update_payment_status_by_intent(&intent, PaymentStatus::Refunded, Utc::now())
        .await
        .unwrap();
    assert_eq!(refunded, Some(order.id));

    // A late success mirror must not undo the refund.
    let late = store
        .update_payment_status_by_intent(&intent, PaymentStatus::Succeeded, Utc::now())
        .await
        .unwrap();
    assert_eq!(late, None);

    let again = store
        .update_payment_status_by_intent(&intent, PaymentStatus::Refunded, Utc::now())
        .await
        .unwrap();
    assert_eq!(again, Some(order.id));

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
#[serial]
async fn reserve_stock_rolls_back_on_shortfall() {
    let store = get_test_store().await;
    seed_product(&store, "SKU-A", 1000, 5).await;
    seed_product(&store, "SKU-B", 2500, 1).await;

    let err = store
        .reserve_stock(
            OrderId::new(),
            &[StockDemand::new("SKU-A", 2), StockDemand::new("SKU-B", 2)],
            Utc::now(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::InsufficientStock { ref product_id } if product_id.as_str() == "SKU-B"));
    assert_eq!(stock_of(&store, "SKU-A").await, 5);
    assert_eq!(stock_of(&store, "SKU-B").await, 1);
    assert!(store
        .unsettled_reservations(Utc::now() + Duration::minutes(1))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[serial]
async fn concurrent_reservations_never_over_reserve() {
    let store = get_test_store().await;
    seed_product(&store, "SKU-HOT", 1000, 10).await;

    // 20 requests of 3 units against 10 in stock: floor(10 / 3) = 3 succeed.
    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .reserve_stock(OrderId::new(), &[StockDemand::new("SKU-HOT", 3)], Utc::now())
                    .await
            })
        })
        .collect();

    let results = futures_util::future::join_all(tasks).await;
    let succeeded = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(()))))
        .count();

    assert_eq!(succeeded, 3);
    assert_eq!(stock_of(&store, "SKU-HOT").await, 1);
}

#[tokio::test]
#[serial]
async fn release_and_settle_reservations() {
    let store = get_test_store().await;
    seed_product(&store, "SKU-A", 1000, 10).await;
    seed_product(&store, "SKU-B", 2500, 10).await;
    let released = OrderId::new();
    let settled = OrderId::new();
    let demands = [StockDemand::new("SKU-A", 2), StockDemand::new("SKU-B", 1)];

    store
        .reserve_stock(released, &demands, Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    store.reserve_stock(settled, &demands, Utc::now()).await.unwrap();
    assert_eq!(stock_of(&store, "SKU-A").await, 6);

    let stale = store
        .unsettled_reservations(Utc::now() - Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].order_id, released);
    assert_eq!(stale[0].items.len(), 2);

    assert!(store.release_reservation(released).await.unwrap());
    assert!(store.settle_reservation(settled).await.unwrap());
    assert!(!store.release_reservation(settled).await.unwrap());

    assert_eq!(stock_of(&store, "SKU-A").await, 8);
    assert_eq!(stock_of(&store, "SKU-B").await, 9);
}

#[tokio::test]
#[serial]
async fn order_round_trip_preserves_items_in_order() {
    let store = get_test_store().await;
    let order = order_for(CustomerId::new());
    store.create_order(&order).await.unwrap();

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, order.id);
    assert_eq!(loaded.total_amount, Money::from_cents(4500));
    assert_eq!(loaded.total_amount, loaded.items_total());
    assert_eq!(loaded.shipping_address, order.shipping_address);
    let products: Vec<_> = loaded.items.iter().map(|i| i.product_id.as_str()).collect();
    assert_eq!(products, vec!["SKU-A", "SKU-B"]);

    assert!(matches!(
        store.create_order(&order).await,
        Err(StoreError::Duplicate { entity: "order", .. })
    ));
}

#[tokio::test]
#[serial]
async fn order_status_is_compare_and_set() {
    let store = get_test_store().await;
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
    assert!(!store
        .update_order_status(OrderId::new(), OrderStatus::Pending, OrderStatus::Confirmed, Utc::now())
        .await
        .unwrap());

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Confirmed);
}

#[tokio::test]
#[serial]
async fn list_orders_pages_newest_first() {
    let store = get_test_store().await;
    let customer = CustomerId::new();
    let mut ids = Vec::new();
    for i in 0..3 {
        let mut order = order_for(customer);
        order.created_at = Utc::now() - Duration::minutes(10 - i);
        store.create_order(&order).await.unwrap();
        ids.push(order.id);
    }

    let first = store
        .list_orders_by_customer(customer, PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].id, ids[2]);
    assert!(first.items.iter().all(|o| o.items.len() == 2));

    let second = store
        .list_orders_by_customer(customer, PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].id, ids[0]);
}

#[tokio::test]
#[serial]
async fn payment_link_and_status_mirroring() {
    let store = get_test_store().await;
    let customer = CustomerId::new();
    let order = order_for(customer);
    store.create_order(&order).await.unwrap();
    let payment = payment("pi_link", customer);
    store.create_payment(&payment).await.unwrap();

    assert!(store
        .set_payment_intent(order.id, &payment.id, Utc::now())
        .await
        .unwrap());
    assert!(!store
        .set_payment_intent(order.id, &PaymentId::new("pi_other"), Utc::now())
        .await
        .unwrap());

    let updated = store
        .update_payment_status_by_intent(&payment.id, PaymentStatus::Succeeded, Utc::now())
        .await
        .unwrap();
    assert_eq!(updated, Some(order.id));
    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.payment_status, PaymentStatus::Succeeded);
    assert_eq!(loaded.payment_intent_id, Some(payment.id.clone()));

    assert_eq!(
        store
            .update_payment_status_by_intent(&PaymentId::new("pi_none"), PaymentStatus::Failed, Utc::now())
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
#[serial]
async fn payment_status_keeps_newest_event_time() {
    let store = get_test_store().await;
    let customer = CustomerId::new();
    let payment = payment("pi_cas", customer);
    store.create_payment(&payment).await.unwrap();
    assert!(matches!(
        store.create_payment(&payment).await,
        Err(StoreError::Duplicate { entity: "payment", .. })
    ));

    let newer = Utc::now();
    assert!(store
        .update_payment_status(&payment.id, PaymentStatus::Pending, PaymentStatus::Succeeded, Some(newer), Utc::now())
        .await
        .unwrap());
    assert!(store
        .update_payment_status(
            &payment.id,
            PaymentStatus::Succeeded,
            PaymentStatus::Refunded,
            Some(newer - Duration::seconds(30)),
            Utc::now()
        )
        .await
        .unwrap());
    assert!(!store
        .update_payment_status(&payment.id, PaymentStatus::Pending, PaymentStatus::Failed, None, Utc::now())
        .await
        .unwrap());

    let loaded = store.get_payment(&payment.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, PaymentStatus::Refunded);
    let stored_at = loaded.last_event_at.unwrap();
    assert!((stored_at - newer).num_milliseconds().abs() < 1);

    let page = store
        .list_payments_by_customer(customer, PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
#[serial]
async fn webhook_events_are_recorded_once() {
    let store = get_test_store().await;
    assert!(!store.is_processed("evt_1").await.unwrap());
    assert!(store
        .mark_processed("evt_1", "payment_intent.succeeded", Utc::now())
        .await
        .unwrap());
    assert!(!store
        .mark_processed("evt_1", "payment_intent.succeeded", Utc::now())
        .await
        .unwrap());
    assert!(store.is_processed("evt_1").await.unwrap());
}
