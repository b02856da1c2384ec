use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, Entity as Order, Model as OrderModel, OrderStatus,
    PaymentStatus,
};
use crate::errors::ServiceError;

use super::{escape_like, BaseRepository, Repository};

/// Columns matched by free-text search
const SEARCH_COLUMNS: [Column; 5] = [
    Column::OrderId,
    Column::ShipFirstName,
    Column::ShipLastName,
    Column::ShipState,
    Column::ShipCity,
];

/// Mutable fields of an order; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderChanges {
    pub order_status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DailyOrderCount {
    /// UTC calendar day, `YYYY-MM-DD`
    #[schema(example = "2024-03-14")]
    pub date: String,
    pub total_orders: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusOrderCount {
    pub status: OrderStatus,
    pub total_orders: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonthlyOrderSummary {
    pub delivered_orders: u64,
    /// Every order that is not yet delivered
    pub pending_orders: u64,
    pub total_orders: u64,
}

fn db_failure(operation: &'static str) -> impl Fn(DbErr) -> ServiceError {
    move |e| {
        error!(error = %e, operation, "Order store query failed");
        ServiceError::DatabaseError(e)
    }
}

/// Persistence for orders and the read-side queries over them
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    #[instrument(skip(self, order))]
    pub async fn insert(&self, order: OrderActiveModel) -> Result<OrderModel, ServiceError> {
        order
            .insert(self.get_db())
            .await
            .map_err(db_failure("insert"))
    }

    /// Find an order by its internal key
    pub async fn find_by_key(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Order::find_by_id(id)
            .one(self.get_db())
            .await
            .map_err(db_failure("find_by_key"))
    }

    /// Find an order by the public order id shared with customers
    pub async fn find_by_order_id(&self, order_id: &str) -> Result<Option<OrderModel>, ServiceError> {
        Order::find()
            .filter(Column::OrderId.eq(order_id))
            .one(self.get_db())
            .await
            .map_err(db_failure("find_by_order_id"))
    }

    /// Writes only the changed columns and returns the stored record.
    #[instrument(skip(self))]
    pub async fn update(&self, id: Uuid, changes: OrderChanges) -> Result<OrderModel, ServiceError> {
        let mut order = OrderActiveModel {
            id: Unchanged(id),
            ..Default::default()
        };
        if let Some(status) = changes.order_status {
            order.order_status = Set(status);
        }
        if let Some(status) = changes.payment_status {
            order.payment_status = Set(status);
        }
        if let Some(payment_id) = changes.payment_id {
            order.payment_id = Set(Some(payment_id));
        }
        order.updated_at = Set(Utc::now());

        order.update(self.get_db()).await.map_err(|e| match e {
            DbErr::RecordNotUpdated | DbErr::RecordNotFound(_) => {
                ServiceError::NotFound(format!("Order {} not found", id))
            }
            other => db_failure("update")(other),
        })
    }

    /// Newest first; `page` is 1-based.
    pub async fn list(&self, page: u64, limit: u64) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .order_by_desc(Column::CreatedAt)
            .paginate(self.get_db(), limit);

        let total = paginator.num_items().await.map_err(db_failure("list"))?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(db_failure("list"))?;

        Ok((orders, total))
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<OrderModel>, ServiceError> {
        Order::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::CreatedAt)
            .all(self.get_db())
            .await
            .map_err(db_failure("list_by_user"))
    }

    /// Case-insensitive prefix match on the order id and address fields, OR-combined.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<OrderModel>, ServiceError> {
        let pattern = format!("{}%", escape_like(&query.to_lowercase()));

        let condition = SEARCH_COLUMNS
            .iter()
            .fold(Condition::any(), |condition, column| {
                condition.add(
                    Expr::expr(Func::lower(Expr::col(*column)))
                        .like(LikeExpr::new(pattern.clone()).escape('\\')),
                )
            });

        Order::find()
            .filter(condition)
            .order_by_desc(Column::CreatedAt)
            .all(self.get_db())
            .await
            .map_err(db_failure("search"))
    }

    /// `None` returns every order.
    pub async fn filter_by_status(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderModel>, ServiceError> {
        Order::find()
            .apply_if(status, |query, status| {
                query.filter(Column::OrderStatus.eq(status))
            })
            .order_by_desc(Column::CreatedAt)
            .all(self.get_db())
            .await
            .map_err(db_failure("filter_by_status"))
    }

    /// Orders per UTC day created at or after `since`, ascending by date.
    pub async fn daily_counts(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyOrderCount>, ServiceError> {
        let created: Vec<DateTime<Utc>> = Order::find()
            .select_only()
            .column(Column::CreatedAt)
            .filter(Column::CreatedAt.gte(since))
            .into_tuple()
            .all(self.get_db())
            .await
            .map_err(db_failure("daily_counts"))?;

        let mut buckets: BTreeMap<String, u64> = BTreeMap::new();
        for timestamp in created {
            *buckets
                .entry(timestamp.format("%Y-%m-%d").to_string())
                .or_default() += 1;
        }

        Ok(buckets
            .into_iter()
            .map(|(date, total_orders)| DailyOrderCount { date, total_orders })
            .collect())
    }

    /// Orders per status, optionally bounded by creation time, sorted by label.
    pub async fn status_counts(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StatusOrderCount>, ServiceError> {
        let rows: Vec<(OrderStatus, i64)> = Order::find()
            .select_only()
            .column(Column::OrderStatus)
            .column_as(Expr::col(Column::Id).count(), "total_orders")
            .apply_if(since, |query, since| {
                query.filter(Column::CreatedAt.gte(since))
            })
            .group_by(Column::OrderStatus)
            .into_tuple()
            .all(self.get_db())
            .await
            .map_err(db_failure("status_counts"))?;

        let mut counts: Vec<StatusOrderCount> = rows
            .into_iter()
            .map(|(status, total)| StatusOrderCount {
                status,
                total_orders: u64::try_from(total).unwrap_or_default(),
            })
            .collect();
        counts.sort_by(|a, b| a.status.label().cmp(b.status.label()));
        Ok(counts)
    }

    pub async fn monthly_summary(
        &self,
        month_start: DateTime<Utc>,
    ) -> Result<MonthlyOrderSummary, ServiceError> {
        let total_orders = Order::find()
            .filter(Column::CreatedAt.gte(month_start))
            .count(self.get_db())
            .await
            .map_err(db_failure("monthly_summary"))?;

        let delivered_orders = Order::find()
            .filter(Column::CreatedAt.gte(month_start))
            .filter(Column::OrderStatus.eq(OrderStatus::Delivered))
            .count(self.get_db())
            .await
            .map_err(db_failure("monthly_summary"))?;

        Ok(MonthlyOrderSummary {
            delivered_orders,
            pending_orders: total_orders.saturating_sub(delivered_orders),
            total_orders,
        })
    }
}

impl Repository for OrderRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
