use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};

use crate::clock::Clock;
use crate::codec::SecretCodec;
use crate::entity::oauth2_session;
use crate::store::{PendingSession, SESSION_TTL, SessionStore};

#[derive(Clone)]
pub struct DbSessionStore {
    db: Arc<DatabaseConnection>,
    codec: Arc<dyn SecretCodec>,
    clock: Arc<dyn Clock>,
}

impl DbSessionStore {
    pub fn new(
        db: Arc<DatabaseConnection>,
        codec: Arc<dyn SecretCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { db, codec, clock }
    }
}

impl From<oauth2_session::Model> for PendingSession {
    fn from(model: oauth2_session::Model) -> Self {
        Self {
            client_id: model.client_id,
            state: model.state,
            callback_state: model.callback_state,
            callback_url: model.callback_url,
        }
    }
}

#[async_trait]
impl SessionStore for DbSessionStore {
    #[tracing::instrument(skip_all, fields(client_id = %session.client_id))]
    async fn create(&self, session: &PendingSession) -> Result<String, DbErr> {
        let id = self.codec.generate_session_id();
        let now = self.clock.now();
        oauth2_session::ActiveModel {
            id: Set(id.clone()),
            client_id: Set(session.client_id.clone()),
            state: Set(session.state.clone()),
            callback_state: Set(session.callback_state.clone()),
            callback_url: Set(session.callback_url.clone()),
            created_at: Set(now),
            expires_at: Set(now + SESSION_TTL),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(id)
    }

    #[tracing::instrument(skip_all)]
    async fn consume(&self, session_id: &str) -> Result<Option<PendingSession>, DbErr> {
        let mut deleted = oauth2_session::Entity::delete_many()
            .filter(oauth2_session::Column::Id.eq(session_id))
            .filter(oauth2_session::Column::ExpiresAt.gt(self.clock.now()))
            .exec_with_returning(self.db.as_ref())
            .await?;
        Ok(deleted.pop().map(PendingSession::from))
    }

    #[tracing::instrument(skip_all)]
    async fn purge_expired(&self) -> Result<u64, DbErr> {
        let result = oauth2_session::Entity::delete_many()
            .filter(oauth2_session::Column::ExpiresAt.lte(self.clock.now()))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
