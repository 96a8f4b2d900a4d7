use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};

use crate::clock::Clock;
use crate::entity::oauth2_code;
use crate::store::{CODE_TTL, CodeStore};

#[derive(Clone)]
pub struct DbCodeStore {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
}

impl DbCodeStore {
    pub fn new(db: Arc<DatabaseConnection>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl CodeStore for DbCodeStore {
    #[tracing::instrument(skip(self, code, email))]
    async fn create(&self, client_id: &str, code: &str, email: &str) -> Result<(), DbErr> {
        let now = self.clock.now();
        oauth2_code::ActiveModel {
            id: Set(code.to_string()),
            client_id: Set(client_id.to_string()),
            email: Set(email.to_string()),
            created_at: Set(now),
            expires_at: Set(now + CODE_TTL),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// The client id is part of the predicate: a code presented by any other
    /// client is indistinguishable from an unknown one and stays redeemable by
    /// its owner.
    #[tracing::instrument(skip(self, code))]
    async fn consume(&self, client_id: &str, code: &str) -> Result<Option<String>, DbErr> {
        let mut deleted = oauth2_code::Entity::delete_many()
            .filter(oauth2_code::Column::Id.eq(code))
            .filter(oauth2_code::Column::ClientId.eq(client_id))
            .filter(oauth2_code::Column::ExpiresAt.gt(self.clock.now()))
            .exec_with_returning(self.db.as_ref())
            .await?;
        Ok(deleted.pop().map(|row| row.email))
    }

    #[tracing::instrument(skip_all)]
    async fn purge_expired(&self) -> Result<u64, DbErr> {
        let result = oauth2_code::Entity::delete_many()
            .filter(oauth2_code::Column::ExpiresAt.lte(self.clock.now()))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
