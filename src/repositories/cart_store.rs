use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::entities::cart_item::{self, Entity as CartItem};
use crate::errors::ServiceError;

/// Shopping cart owned by the catalog side; orders only ever empty it.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Removes every cart line of the user, returning how many were removed.
    async fn clear_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmCartStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCartStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CartStore for SeaOrmCartStore {
    async fn clear_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "Failed to clear cart");
                ServiceError::DatabaseError(e)
            })?;

        debug!(user_id = %user_id, removed = result.rows_affected, "Cart cleared");
        Ok(result.rows_affected)
    }
}
