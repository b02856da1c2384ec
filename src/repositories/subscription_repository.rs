use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::entities::subscription::{self, Entity as Subscription};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    base: BaseRepository,
}

impl SubscriptionRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn find_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<subscription::Model>, ServiceError> {
        Subscription::find()
            .filter(subscription::Column::UserId.eq(user_id))
            .one(self.get_db())
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "Failed to load subscription");
                ServiceError::DatabaseError(e)
            })
    }

    /// Inserts the user's billing customer. When another request stored one
    /// first, the existing record is returned instead.
    pub async fn insert_or_existing(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<subscription::Model, ServiceError> {
        let now = Utc::now();
        let insert = subscription::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            customer_id: Set(customer_id.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.get_db())
        .await;

        match insert {
            Ok(model) => Ok(model),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                warn!(user_id = %user_id, "Subscription already recorded, using existing customer");
                self.find_by_user(user_id).await?.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "Subscription for user {} vanished after conflict",
                        user_id
                    ))
                })
            }
            Err(e) => {
                error!(error = %e, user_id = %user_id, "Failed to store subscription");
                Err(ServiceError::DatabaseError(e))
            }
        }
    }
}

impl Repository for SubscriptionRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
