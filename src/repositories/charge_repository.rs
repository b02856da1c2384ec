use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::entities::charge::{self, Entity as Charge};
use crate::errors::ServiceError;
use crate::services::pricing::ChargeSchedule;

use super::{BaseRepository, Repository};

/// Read access to the configured checkout surcharges
#[derive(Debug, Clone)]
pub struct ChargeRepository {
    base: BaseRepository,
}

impl ChargeRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn load_schedule(&self) -> Result<ChargeSchedule, ServiceError> {
        let charges = Charge::find().all(self.get_db()).await.map_err(|e| {
            error!(error = %e, "Failed to load charge schedule");
            ServiceError::DatabaseError(e)
        })?;

        Ok(ChargeSchedule::new(
            charges
                .into_iter()
                .map(|charge| (charge.name, charge.charge_percent)),
        ))
    }

    /// Creates the named charge or replaces its percent.
    pub async fn set_percent(
        &self,
        name: &str,
        percent: Decimal,
    ) -> Result<charge::Model, ServiceError> {
        let existing = Charge::find()
            .filter(charge::Column::Name.eq(name))
            .one(self.get_db())
            .await?;

        let now = Utc::now();
        let saved = match existing {
            Some(model) => {
                let mut active: charge::ActiveModel = model.into();
                active.charge_percent = Set(percent);
                active.updated_at = Set(now);
                active.update(self.get_db()).await?
            }
            None => {
                charge::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    name: Set(name.to_string()),
                    charge_percent: Set(percent),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(self.get_db())
                .await?
            }
        };

        info!(charge = %name, percent = %percent, "Charge percent saved");
        Ok(saved)
    }
}

impl Repository for ChargeRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
