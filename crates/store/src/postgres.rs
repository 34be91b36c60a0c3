use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PageRequest};
use domain::{
    Cart, Currency, CustomerId, DomainError, Money, Order, OrderItem, OrderItemId, OrderStatus,
    Payment, PaymentId, PaymentStatus, Product, ProductId, ShippingAddress,
};
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{
        CartStore, OrderStore, PaymentStore, ProductStore, Reservation, StockDemand,
        WebhookEventLog,
    },
};

const ORDER_COLUMNS: &str = "id, customer_id, status, payment_status, total_cents, payment_intent_id, \
     ship_street, ship_city, ship_state, ship_postal_code, ship_country, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, customer_id, amount_cents, currency, description, payment_method, \
     status, last_event_at, created_at, updated_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: to_u32(row.try_get("stock")?, "stock")?,
            status: parse_status(row.try_get("status")?)?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get("id")?),
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: to_u32(row.try_get("quantity")?, "quantity")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: PgRow, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
            status: parse_status(row.try_get("status")?)?,
            payment_status: parse_status(row.try_get("payment_status")?)?,
            total_amount: Money::from_cents(row.try_get("total_cents")?),
            payment_intent_id: row
                .try_get::<Option<String>, _>("payment_intent_id")?
                .map(PaymentId::new),
            shipping_address: ShippingAddress {
                street: row.try_get("ship_street")?,
                city: row.try_get("ship_city")?,
                state: row.try_get("ship_state")?,
                postal_code: row.try_get("ship_postal_code")?,
                country: row.try_get("ship_country")?,
            },
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let currency: String = row.try_get("currency")?;
        Ok(Payment {
            id: PaymentId::new(row.try_get::<String, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: Currency::parse(&currency).map_err(corrupt)?,
            description: row.try_get("description")?,
            payment_method: row.try_get("payment_method")?,
            status: parse_status(row.try_get("status")?)?,
            last_event_at: row.try_get("last_event_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Loads the items of several orders, keyed by order id, each in position order.
    async fn load_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price_cents, created_at
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let item = Self::row_to_item(row)?;
            items.entry(item.order_id.as_uuid()).or_default().push(item);
        }
        Ok(items)
    }
}

fn corrupt(err: DomainError) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn parse_status<T: FromStr<Err = DomainError>>(value: String) -> Result<T> {
    value.parse().map_err(corrupt)
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn page_bounds(page: PageRequest) -> (i64, i64) {
    (
        i64::try_from(page.limit()).unwrap_or(i64::MAX),
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    )
}

fn map_unique_violation(e: sqlx::Error, entity: &'static str, id: String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Duplicate { entity, id };
    }
    StoreError::Database(e)
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_cart(&self, customer_id: CustomerId) -> Result<Option<Cart>> {
        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT customer_id FROM carts WHERE customer_id = $1")
                .bind(customer_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity, unit_price_cents
            FROM cart_items
            WHERE customer_id = $1
            ORDER BY product_id ASC
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut cart = Cart::new(customer_id);
        for row in rows {
            cart.add_line(
                row.try_get::<String, _>("product_id")?,
                to_u32(row.try_get("quantity")?, "quantity")?,
                Money::from_cents(row.try_get("unit_price_cents")?),
            );
        }
        Ok(Some(cart))
    }
}

#[async_trait]
impl ProductStore for PostgresStore {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, price_cents, stock, status FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn reserve_stock(
        &self,
        order_id: OrderId,
        demands: &[StockDemand],
        at: DateTime<Utc>,
    ) -> Result<()> {
        // Lock rows in a stable order so concurrent reservations cannot deadlock.
        let mut demands = demands.to_vec();
        demands.sort_by(|a, b| a.product_id.cmp(&b.product_id));

        let mut tx = self.pool.begin().await?;

        for demand in &demands {
            let result = sqlx::query(
                r#"
                UPDATE products
                SET stock = stock - $2, updated_at = NOW()
                WHERE id = $1 AND stock >= $2
                "#,
            )
            .bind(demand.product_id.as_str())
            .bind(i64::from(demand.quantity))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tracing::debug!(%order_id, product_id = %demand.product_id, "Conditional stock decrement matched no row");
                tx.rollback().await?;
                return Err(StoreError::InsufficientStock {
                    product_id: demand.product_id.clone(),
                });
            }

            sqlx::query(
                r#"
                INSERT INTO stock_reservations (order_id, product_id, quantity, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(demand.product_id.as_str())
            .bind(i64::from(demand.quantity))
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique_violation(e, "reservation", order_id.to_string()))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn settle_reservation(&self, order_id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM stock_reservations WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_reservation(&self, order_id: OrderId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "DELETE FROM stock_reservations WHERE order_id = $1 RETURNING product_id, quantity",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?;

        for row in &rows {
            sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
                .bind(row.try_get::<String, _>("product_id")?)
                .bind(row.try_get::<i64, _>("quantity")?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(!rows.is_empty())
    }

    async fn unsettled_reservations(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, created_at
            FROM stock_reservations
            WHERE created_at < $1
            ORDER BY created_at ASC, order_id ASC, product_id ASC
            "#,
        )
        .bind(created_before)
        .fetch_all(&self.pool)
        .await?;

        let mut reservations: Vec<Reservation> = Vec::new();
        let mut index: HashMap<OrderId, usize> = HashMap::new();
        for row in rows {
            let order_id = OrderId::from_uuid(row.try_get("order_id")?);
            let demand = StockDemand::new(
                row.try_get::<String, _>("product_id")?,
                to_u32(row.try_get("quantity")?, "quantity")?,
            );
            match index.get(&order_id) {
                Some(&i) => reservations[i].items.push(demand),
                None => {
                    index.insert(order_id, reservations.len());
                    reservations.push(Reservation {
                        order_id,
                        items: vec![demand],
                        created_at: row.try_get("created_at")?,
                    });
                }
            }
        }
        Ok(reservations)
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn create_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, payment_status, total_cents, payment_intent_id,
                                ship_street, ship_city, ship_state, ship_postal_code, ship_country,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.total_amount.cents())
        .bind(order.payment_intent_id.as_ref().map(|p| p.as_str().to_string()))
        .bind(&order.shipping_address.street)
        .bind(&order.shipping_address.city)
        .bind(&order.shipping_address.state)
        .bind(&order.shipping_address.postal_code)
        .bind(&order.shipping_address.country)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "order", order.id.to_string()))?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, quantity, unit_price_cents, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(item.product_id.as_str())
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut items = self.load_items(&[id.as_uuid()]).await?;
        let items = items.remove(&id.as_uuid()).unwrap_or_default();
        Self::row_to_order(row, items).map(Some)
    }

    async fn list_orders_by_customer(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE customer_id = $1")
            .bind(customer_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        let (limit, offset) = page_bounds(page);
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 \
             ORDER BY created_at DESC, id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(customer_id.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.load_items(&ids).await?;

        let orders = rows
            .into_iter()
            .zip(ids)
            .map(|(row, id)| Self::row_to_order(row, items.remove(&id).unwrap_or_default()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(orders, u64::try_from(total).unwrap_or(0), page))
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2",
        )
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_payment_intent(
        &self,
        id: OrderId,
        payment_id: &PaymentId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET payment_intent_id = $2, updated_at = $3
            WHERE id = $1 AND payment_intent_id IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(payment_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "payment link", payment_id.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_payment_status_by_intent(
        &self,
        payment_id: &PaymentId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<OrderId>> {
        let sources: Vec<&str> = PaymentStatus::leading_to(status)
            .into_iter()
            .map(|s| s.as_str())
            .collect();
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE orders SET payment_status = $2, updated_at = $3
            WHERE payment_intent_id = $1 AND payment_status = ANY($4)
            RETURNING id
            "#,
        )
        .bind(payment_id.as_str())
        .bind(status.as_str())
        .bind(at)
        .bind(sources)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(OrderId::from_uuid))
    }
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, customer_id, amount_cents, currency, description, payment_method,
                                  status, last_event_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id.as_str())
        .bind(payment.customer_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(payment.currency.as_str())
        .bind(&payment.description)
        .bind(&payment.payment_method)
        .bind(payment.status.as_str())
        .bind(payment.last_event_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "payment", payment.id.to_string()))?;

        Ok(())
    }

    async fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn list_payments_by_customer(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE customer_id = $1")
                .bind(customer_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        let (limit, offset) = page_bounds(page);
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE customer_id = $1 \
             ORDER BY created_at DESC, id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(customer_id.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let payments = rows
            .into_iter()
            .map(Self::row_to_payment)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(payments, u64::try_from(total).unwrap_or(0), page))
    }

    async fn update_payment_status(
        &self,
        id: &PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
        event_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3, last_event_at = GREATEST(last_event_at, $4), updated_at = $5
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id.as_str())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(event_at)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl WebhookEventLog for PostgresStore {
    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        let found: Option<String> = sqlx::query_scalar(
            "SELECT event_id FROM processed_webhook_events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
