use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DetailId, OrderId, UserId};
use domain::{OrderStatus, StatusHistoryEntry};
use sqlx::{PgExecutor, PgPool, Row, postgres::PgRow};

use crate::{
    CheckoutWrite, HistoryQuery, NewOutboxMessage, OrderDetailRecord, OrderHistoryRecord,
    OrderRecord, OutboxMessage, Result, SavedCheckout, StatusChange, StatusOutboxFactory,
    StoreError,
    record::status_from_code,
    store::{IdempotencyGuard, OrderStore, OutboxStore},
};

const TOKEN_CONSTRAINT: &str = "order_request_logs_token_key";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: &PgRow) -> Result<OrderRecord> {
        let id = OrderId::new(row.try_get("id")?);
        Ok(OrderRecord {
            id,
            user_id: UserId::new(row.try_get("user_id")?),
            amount: row.try_get("amount")?,
            total_qty: row.try_get("total_qty")?,
            payment_method: row.try_get("payment_method")?,
            shipping_address: row.try_get("shipping_address")?,
            status: status_from_code(id, row.try_get("status")?)?,
            order_detail_id: DetailId::new(row.try_get("order_detail_id")?),
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
        })
    }

    fn row_to_detail(row: &PgRow, id_column: &str) -> Result<OrderDetailRecord> {
        Ok(OrderDetailRecord {
            id: DetailId::new(row.try_get(id_column)?),
            products: row.try_get("products")?,
            order_history: row.try_get("order_history")?,
            schema_version: row.try_get("schema_version")?,
        })
    }

    fn row_to_outbox(row: &PgRow) -> Result<OutboxMessage> {
        Ok(OutboxMessage {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            topic: row.try_get("topic")?,
            partition_key: row.try_get("partition_key")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            published_at: row.try_get("published_at")?,
            attempts: row.try_get("attempts")?,
        })
    }
}

async fn insert_token<'e, E: PgExecutor<'e>>(executor: E, token: &str) -> Result<()> {
    sqlx::query("INSERT INTO order_request_logs (idempotency_token) VALUES ($1)")
        .bind(token)
        .execute(executor)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(TOKEN_CONSTRAINT)
            {
                return StoreError::DuplicateToken(token.to_string());
            }
            StoreError::Database(e)
        })?;
    Ok(())
}

async fn insert_outbox<'e, E: PgExecutor<'e>>(
    executor: E,
    message: &NewOutboxMessage,
) -> Result<OutboxMessage> {
    let row = sqlx::query(
        r#"
        INSERT INTO order_outbox (event_id, topic, partition_key, payload)
        VALUES ($1, $2, $3, $4)
        RETURNING id, event_id, topic, partition_key, payload, created_at, published_at, attempts
        "#,
    )
    .bind(message.event_id)
    .bind(&message.topic)
    .bind(&message.partition_key)
    .bind(&message.payload)
    .fetch_one(executor)
    .await?;
    PostgresOrderStore::row_to_outbox(&row)
}

#[async_trait]
impl IdempotencyGuard for PostgresOrderStore {
    #[tracing::instrument(skip(self))]
    async fn check_token(&self, token: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM order_request_logs WHERE idempotency_token = $1)",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[tracing::instrument(skip(self))]
    async fn record_token(&self, token: &str) -> Result<()> {
        insert_token(&self.pool, token).await
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, write), fields(user_id = %write.order.user_id))]
    async fn save_checkout(&self, write: CheckoutWrite) -> Result<SavedCheckout> {
        let CheckoutWrite {
            order,
            detail,
            idempotency_token,
            outbox,
        } = write;

        // Start a transaction
        let mut tx = self.pool.begin().await?;

        if let Some(token) = idempotency_token.as_deref() {
            insert_token(&mut *tx, token).await?;
        }

        let detail_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_details (products, order_history, schema_version)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&detail.products)
        .bind(&detail.order_history)
        .bind(detail.schema_version)
        .fetch_one(&mut *tx)
        .await?;

        let order_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (user_id, amount, total_qty, payment_method, shipping_address, status, order_detail_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(order.user_id.as_i64())
        .bind(order.amount)
        .bind(order.total_qty)
        .bind(&order.payment_method)
        .bind(&order.shipping_address)
        .bind(order.status.code())
        .bind(detail_id)
        .fetch_one(&mut *tx)
        .await?;
        let order_id = OrderId::new(order_id);

        let outbox_message = match outbox {
            Some(factory) => {
                let message = factory(order_id)?;
                Some(insert_outbox(&mut *tx, &message).await?)
            }
            None => None,
        };

        tx.commit().await?;
        metrics::counter!("order_store_checkouts_saved_total").increment(1);

        Ok(SavedCheckout {
            order_id,
            detail_id: DetailId::new(detail_id),
            outbox_message,
        })
    }

    #[tracing::instrument(skip(self, outbox), fields(with_outbox = outbox.is_some()))]
    async fn change_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        outbox: Option<StatusOutboxFactory>,
    ) -> Result<StatusChange> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i16, i64)> = sqlx::query_as(
            "SELECT status, order_detail_id FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;

        let (code, detail_id) = row.ok_or(StoreError::OrderNotFound(order_id))?;
        let current = status_from_code(order_id, code)?;

        if !current.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                order_id,
                from: current,
                to: status,
            });
        }

        let now = Utc::now();
        sqlx::query("UPDATE orders SET status = $1, update_time = $2 WHERE id = $3")
            .bind(status.code())
            .bind(now)
            .bind(order_id.as_i64())
            .execute(&mut *tx)
            .await?;

        let (products, history, version): (String, String, i16) = sqlx::query_as(
            "SELECT products, order_history, schema_version FROM order_details WHERE id = $1 FOR UPDATE",
        )
        .bind(detail_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::DetailNotFound(DetailId::new(detail_id)))?;

        let history =
            domain::append_history(&history, version, StatusHistoryEntry::new(status, now))
                .map_err(|e| StoreError::corrupt(format_args!("order {order_id}"), e))?;

        sqlx::query("UPDATE order_details SET order_history = $1 WHERE id = $2")
            .bind(history)
            .bind(detail_id)
            .execute(&mut *tx)
            .await?;

        let outbox_message = match outbox {
            Some(factory) => {
                let items = domain::decode_products(&products, version)
                    .map_err(|e| StoreError::corrupt(format_args!("order {order_id}"), e))?;
                let message = factory(order_id, items)?;
                Some(insert_outbox(&mut *tx, &message).await?)
            }
            None => None,
        };

        tx.commit().await?;
        Ok(StatusChange {
            previous: current,
            outbox_message,
        })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, user_id, amount, total_qty, payment_method, shipping_address, status,
                   order_detail_id, create_time, update_time
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn get_detail(&self, detail_id: DetailId) -> Result<Option<OrderDetailRecord>> {
        let row: Option<PgRow> = sqlx::query(
            "SELECT id, products, order_history, schema_version FROM order_details WHERE id = $1",
        )
        .bind(detail_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(|row| Self::row_to_detail(row, "id"))
            .transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_history(&self, query: HistoryQuery) -> Result<Vec<OrderHistoryRecord>> {
        let mut sql = String::from(
            r#"
            SELECT o.id, o.user_id, o.amount, o.total_qty, o.payment_method, o.shipping_address,
                   o.status, o.order_detail_id, o.create_time, o.update_time,
                   d.products, d.order_history, d.schema_version
            FROM orders o
            JOIN order_details d ON d.id = o.order_detail_id
            WHERE o.user_id = $1
            "#,
        );
        let mut param_count = 1;

        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.status = ${param_count}"));
        }

        sql.push_str(" ORDER BY o.id DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql).bind(query.user_id.as_i64());
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.code());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let order = Self::row_to_order(row)?;
                let detail = Self::row_to_detail(row, "order_detail_id")?;
                OrderHistoryRecord::from_parts(&order, &detail)
            })
            .collect()
    }
}

#[async_trait]
impl OutboxStore for PostgresOrderStore {
    async fn list_unpublished(
        &self,
        limit: usize,
        older_than: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, topic, partition_key, payload, created_at, published_at, attempts
            FROM order_outbox
            WHERE published_at IS NULL AND created_at <= $1 AND attempts < $3
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(older_than)
        .bind(limit as i64)
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_outbox).collect()
    }

    async fn mark_published(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE order_outbox SET published_at = COALESCE(published_at, NOW()) WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OutboxMessageNotFound(id));
        }
        Ok(())
    }

    async fn record_publish_attempt(&self, id: i64) -> Result<i32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            "UPDATE order_outbox SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        attempts.ok_or(StoreError::OutboxMessageNotFound(id))
    }
}
