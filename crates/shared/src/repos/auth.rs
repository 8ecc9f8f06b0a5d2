use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{IdentityResolver, Store, StoreError, StoreFuture};

pub fn hash_access_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

impl Store {
    pub async fn create_session(
        &self,
        user_id: Uuid,
        access_token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.ensure_user(user_id).await?;

        sqlx::query(
            "INSERT INTO auth_sessions (user_id, access_token_hash, expires_at)
             VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(access_token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn resolve_session_user(
        &self,
        access_token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError> {
        let user_id = sqlx::query_scalar(
            "SELECT user_id
             FROM auth_sessions
             WHERE access_token_hash = $1
               AND revoked_at IS NULL
               AND expires_at > $2",
        )
        .bind(access_token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }
}

impl IdentityResolver for Store {
    fn resolve_user<'a>(&'a self, bearer_token: &'a str) -> StoreFuture<'a, Option<Uuid>> {
        Box::pin(async move {
            let token_hash = hash_access_token(bearer_token);
            self.resolve_session_user(&token_hash, Utc::now()).await
        })
    }
}
