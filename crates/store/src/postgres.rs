use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartLineId, HistoryId, Money, OrderId, OrderItemId, OrderStatus, PaymentId, PaymentStatus,
    ProductId, UserId,
};
use sqlx::{
    PgConnection, PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    CartLine, NewOrderAggregate, Order, OrderItem, OrderQuery, Page, PageRequest, Payment,
    PaymentLink, Product, Result, ShippingAddress, StatusHistoryEntry, StoreError,
    records::quantity_column,
    store::{Catalog, Store, UnitOfWork},
};

/// How long a unit of work waits for a row lock before failing as transient.
const LOCK_TIMEOUT: &str = "5s";

const PRODUCT_COLUMNS: &str = "id, name, price_cents, stock, is_active";

const CART_COLUMNS: &str = "id, user_id, product_id, quantity, created_at, updated_at";

const ORDER_COLUMNS: &str = r#"
    id, user_id, order_number, status, subtotal_cents, shipping_cost_cents,
    total_amount_cents, address, city, province, postal_code, notes, payment_id,
    payment_status, created_at, updated_at, deleted_at
"#;

const ITEM_COLUMNS: &str =
    "id, order_id, product_id, quantity, unit_price_cents, line_subtotal_cents, created_at";

const HISTORY_COLUMNS: &str = "id, order_id, from_status, to_status, note, actor_id, created_at";

const PAYMENT_COLUMNS: &str = r#"
    id, order_id, user_id, amount_cents, method, status, external_reference,
    payment_url, expires_at, paid_at, created_at, updated_at
"#;

/// PostgreSQL-backed store implementation.
///
/// Units of work are database transactions. Rows returned by the `lock_*`
/// methods are held with `SELECT ... FOR UPDATE`, and stock changes use a
/// conditional update so two transactions can never both take the last unit.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn parse_status<T: FromStr>(value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::Corrupt(e.to_string()))
}

fn quantity_from_row(row: &PgRow) -> Result<u32> {
    let quantity: i32 = row.try_get("quantity")?;
    u32::try_from(quantity)
        .map_err(|_| StoreError::Corrupt(format!("negative quantity {quantity}")))
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: row.try_get("stock")?,
        is_active: row.try_get("is_active")?,
    })
}

fn row_to_cart_line(row: PgRow) -> Result<CartLine> {
    Ok(CartLine {
        id: CartLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: quantity_from_row(&row)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let payment = match row.try_get::<Option<Uuid>, _>("payment_id")? {
        Some(id) => PaymentLink::Linked(PaymentId::from_uuid(id)),
        None => PaymentLink::Unlinked,
    };

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        order_number: row.try_get("order_number")?,
        status: parse_status(row.try_get::<&str, _>("status")?)?,
        subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
        shipping_cost: Money::from_cents(row.try_get("shipping_cost_cents")?),
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        shipping: ShippingAddress {
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            province: row.try_get("province")?,
            postal_code: row.try_get("postal_code")?,
        },
        notes: row.try_get("notes")?,
        payment,
        payment_status: parse_status(row.try_get::<&str, _>("payment_status")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn row_to_item(row: PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: quantity_from_row(&row)?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        line_subtotal: Money::from_cents(row.try_get("line_subtotal_cents")?),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_history(row: PgRow) -> Result<StatusHistoryEntry> {
    let from_status = row
        .try_get::<Option<&str>, _>("from_status")?
        .map(parse_status::<OrderStatus>)
        .transpose()?;

    Ok(StatusHistoryEntry {
        id: HistoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        from_status,
        to_status: parse_status(row.try_get::<&str, _>("to_status")?)?,
        note: row.try_get("note")?,
        actor_id: row
            .try_get::<Option<Uuid>, _>("actor_id")?
            .map(UserId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        method: row.try_get("method")?,
        status: parse_status::<PaymentStatus>(row.try_get::<&str, _>("status")?)?,
        external_reference: row.try_get("external_reference")?,
        payment_url: row.try_get("payment_url")?,
        expires_at: row.try_get("expires_at")?,
        paid_at: row.try_get("paid_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// Queries shared by the pool-level API and units of work.

async fn fetch_product(conn: &mut PgConnection, product_id: ProductId) -> Result<Option<Product>> {
    sqlx::query(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(product_id.as_uuid())
    .fetch_optional(conn)
    .await?
    .map(row_to_product)
    .transpose()
}

async fn adjust_stock_on(conn: &mut PgConnection, product_id: ProductId, delta: i64) -> Result<i64> {
    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET stock = stock + $2, updated_at = NOW()
        WHERE id = $1 AND stock + $2 >= 0
        RETURNING stock
        "#,
    )
    .bind(product_id.as_uuid())
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(stock) = updated {
        return Ok(stock);
    }

    match fetch_product(conn, product_id).await? {
        Some(product) => Err(StoreError::InsufficientStock {
            product_id,
            requested: delta.saturating_neg(),
            available: product.stock,
        }),
        None => Err(StoreError::not_found("product", product_id)),
    }
}

async fn fetch_payment_for_order(
    conn: &mut PgConnection,
    order_id: OrderId,
    for_update: bool,
) -> Result<Option<Payment>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1{lock}"
    ))
    .bind(order_id.as_uuid())
    .fetch_optional(conn)
    .await?
    .map(row_to_payment)
    .transpose()
}

async fn fetch_order_items(conn: &mut PgConnection, order_id: OrderId) -> Result<Vec<OrderItem>> {
    sqlx::query(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY created_at ASC, id ASC"
    ))
    .bind(order_id.as_uuid())
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(row_to_item)
    .collect()
}

#[async_trait]
impl Catalog for PostgresStore {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, product_id).await
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.stock)
        .bind(product.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        adjust_stock_on(&mut conn, product_id, delta).await
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("SET LOCAL lock_timeout = '{LOCK_TIMEOUT}'"))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PostgresUnitOfWork { tx: Some(tx) }))
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO carts (id, user_id, product_id, quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (user_id, product_id) DO UPDATE SET
                quantity = carts.quantity + EXCLUDED.quantity,
                updated_at = EXCLUDED.updated_at
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(CartLineId::new().as_uuid())
        .bind(user_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(quantity_column(quantity)?)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row_to_cart_line(row)
    }

    async fn get_cart(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(row_to_cart_line)
        .collect()
    }

    async fn update_cart_line(
        &self,
        line_id: CartLineId,
        user_id: UserId,
        quantity: u32,
    ) -> Result<Option<CartLine>> {
        sqlx::query(&format!(
            r#"
            UPDATE carts SET quantity = $3, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(line_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(quantity_column(quantity)?)
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_cart_line)
        .transpose()
    }

    async fn remove_cart_line(&self, line_id: CartLineId, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE id = $1 AND user_id = $2")
            .bind(line_id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_order)
        .transpose()
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_items(&mut conn, order_id).await
    }

    async fn get_status_history(&self, order_id: OrderId) -> Result<Vec<StatusHistoryEntry>> {
        sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM order_status_histories WHERE order_id = $1 ORDER BY seq ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(row_to_history)
        .collect()
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>> {
        let user_id = query.user_id.map(|id| id.as_uuid());
        let status = query.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE deleted_at IS NULL
              AND ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE deleted_at IS NULL
              AND ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, order_number DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(status)
        .bind(i64::from(query.page.limit))
        .bind(query.page.offset() as i64)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(row_to_order)
        .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total as u64,
            page: query.page.page,
            limit: query.page.limit,
        })
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(payment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_payment)
        .transpose()
    }

    async fn get_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let mut conn = self.pool.acquire().await?;
        fetch_payment_for_order(&mut conn, order_id, false).await
    }

    async fn list_user_payments(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(row_to_payment)
        .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total as u64,
            page: page.page,
            limit: page.limit,
        })
    }

    async fn find_overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT o.id FROM payments p
            JOIN orders o ON o.id = p.order_id
            WHERE p.status = 'pending'
              AND p.expires_at < $1
              AND o.status = 'pending'
              AND o.deleted_at IS NULL
            ORDER BY p.expires_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(OrderId::from_uuid).collect())
    }
}

/// A unit of work backed by a single database transaction.
///
/// Dropping the transaction without committing rolls it back.
pub struct PostgresUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresUnitOfWork {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(StoreError::TransactionClosed),
        }
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(self.conn()?)
        .await?
        .map(row_to_order)
        .transpose()
    }

    async fn lock_payment_by_reference(
        &mut self,
        external_reference: &str,
    ) -> Result<Option<(Order, Payment)>> {
        let conn = self.conn()?;

        // Orders are always locked before their payment row.
        let order_id: Option<Uuid> =
            sqlx::query_scalar("SELECT order_id FROM payments WHERE external_reference = $1")
                .bind(external_reference)
                .fetch_optional(&mut *conn)
                .await?;
        let Some(order_id) = order_id.map(OrderId::from_uuid) else {
            return Ok(None);
        };

        let order = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
        .map(row_to_order)
        .transpose()?
        .ok_or_else(|| StoreError::not_found("order", order_id))?;

        let payment = fetch_payment_for_order(conn, order_id, true).await?;
        Ok(payment
            .filter(|p| p.external_reference.as_deref() == Some(external_reference))
            .map(|p| (order, p)))
    }

    async fn payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        fetch_payment_for_order(self.conn()?, order_id, true).await
    }

    async fn cart_lines(
        &mut self,
        user_id: UserId,
        line_ids: Option<&[CartLineId]>,
    ) -> Result<Vec<CartLine>> {
        let line_ids: Option<Vec<Uuid>> =
            line_ids.map(|ids| ids.iter().map(|id| id.as_uuid()).collect());

        sqlx::query(&format!(
            r#"
            SELECT {CART_COLUMNS} FROM carts
            WHERE user_id = $1 AND ($2::uuid[] IS NULL OR id = ANY($2))
            ORDER BY created_at ASC, id ASC
            FOR UPDATE
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(line_ids)
        .fetch_all(self.conn()?)
        .await?
        .into_iter()
        .map(row_to_cart_line)
        .collect()
    }

    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        fetch_product(self.conn()?, product_id).await
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        fetch_order_items(self.conn()?, order_id).await
    }

    async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<i64> {
        adjust_stock_on(self.conn()?, product_id, delta).await
    }

    async fn insert_order_aggregate(&mut self, aggregate: &NewOrderAggregate) -> Result<()> {
        let conn = self.conn()?;
        let order = &aggregate.order;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, order_number, status, subtotal_cents, shipping_cost_cents,
                total_amount_cents, address, city, province, postal_code, notes, payment_id,
                payment_status, created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(&order.order_number)
        .bind(order.status.as_str())
        .bind(order.subtotal.cents())
        .bind(order.shipping_cost.cents())
        .bind(order.total_amount.cents())
        .bind(&order.shipping.address)
        .bind(&order.shipping.city)
        .bind(&order.shipping.province)
        .bind(&order.shipping.postal_code)
        .bind(&order.notes)
        .bind(order.payment.payment_id().map(|id| id.as_uuid()))
        .bind(order.payment_status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.deleted_at)
        .execute(&mut *conn)
        .await?;

        for item in &aggregate.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_cents, line_subtotal_cents, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(quantity_column(item.quantity)?)
            .bind(item.unit_price.cents())
            .bind(item.line_subtotal.cents())
            .bind(item.created_at)
            .execute(&mut *conn)
            .await?;
        }

        insert_history(&mut *conn, &aggregate.history).await?;

        let payment = &aggregate.payment;
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, user_id, amount_cents, method, status, external_reference,
                payment_url, expires_at, paid_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(&payment.method)
        .bind(payment.status.as_str())
        .bind(&payment.external_reference)
        .bind(&payment.payment_url)
        .bind(payment.expires_at)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *conn)
        .await?;

        let consumed: Vec<Uuid> = aggregate
            .consumed_cart_lines
            .iter()
            .map(|id| id.as_uuid())
            .collect();
        sqlx::query("DELETE FROM carts WHERE id = ANY($1)")
            .bind(consumed)
            .execute(conn)
            .await?;

        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(status.as_str())
            .bind(at)
            .execute(self.conn()?)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order_id));
        }
        Ok(())
    }

    async fn append_history(&mut self, entry: &StatusHistoryEntry) -> Result<()> {
        insert_history(self.conn()?, entry).await
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let conn = self.conn()?;

        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $2,
                external_reference = $3,
                payment_url = $4,
                paid_at = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(&payment.external_reference)
        .bind(&payment.payment_url)
        .bind(payment.paid_at)
        .bind(payment.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("payment", payment.id));
        }

        sqlx::query("UPDATE orders SET payment_status = $2, updated_at = $3 WHERE id = $1")
            .bind(payment.order_id.as_uuid())
            .bind(payment.status.as_str())
            .bind(payment.updated_at)
            .execute(conn)
            .await?;

        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }
}

async fn insert_history(conn: &mut PgConnection, entry: &StatusHistoryEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO order_status_histories (id, order_id, from_status, to_status, note, actor_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.order_id.as_uuid())
    .bind(entry.from_status.map(|s| s.as_str()))
    .bind(entry.to_status.as_str())
    .bind(&entry.note)
    .bind(entry.actor_id.map(|id| id.as_uuid()))
    .bind(entry.created_at)
    .execute(conn)
    .await?;

    Ok(())
}
