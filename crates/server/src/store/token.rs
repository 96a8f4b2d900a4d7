use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};

use crate::clock::Clock;
use crate::codec::SecretCodec;
use crate::entity::user_token;
use crate::store::{TOKEN_TTL, TokenStore};

/// Bearer tokens keyed by their storage hash. A leaked table yields no usable token.
#[derive(Clone)]
pub struct DbTokenStore {
    db: Arc<DatabaseConnection>,
    codec: Arc<dyn SecretCodec>,
    clock: Arc<dyn Clock>,
}

impl DbTokenStore {
    pub fn new(
        db: Arc<DatabaseConnection>,
        codec: Arc<dyn SecretCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { db, codec, clock }
    }
}

#[async_trait]
impl TokenStore for DbTokenStore {
    #[tracing::instrument(skip(self))]
    async fn issue(&self, email: &str) -> Result<String, DbErr> {
        let raw_token = self.codec.generate_token();
        let now = self.clock.now();
        user_token::ActiveModel {
            token: Set(self.codec.hash_for_storage(&raw_token)),
            email: Set(email.to_string()),
            created_at: Set(now),
            expires_at: Set(now + TOKEN_TTL),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(raw_token)
    }

    #[tracing::instrument(skip_all)]
    async fn revoke_by_raw_token(&self, raw_token: &str) -> Result<(), DbErr> {
        let result = user_token::Entity::delete_by_id(self.codec.hash_for_storage(raw_token))
            .exec(self.db.as_ref())
            .await?;
        tracing::debug!(revoked = result.rows_affected, "token revocation");
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn lookup_by_raw_token(&self, raw_token: &str) -> Result<Option<String>, DbErr> {
        let now = self.clock.now();
        let found = user_token::Entity::find_by_id(self.codec.hash_for_storage(raw_token))
            .one(self.db.as_ref())
            .await?;
        Ok(found
            .filter(|token| !token.is_expired_at(now))
            .map(|token| token.email))
    }

    #[tracing::instrument(skip_all)]
    async fn purge_expired(&self) -> Result<u64, DbErr> {
        let result = user_token::Entity::delete_many()
            .filter(user_token::Column::ExpiresAt.lte(self.clock.now()))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
