use kwave_core::model::{AuthUser, Role, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, ser};
use crate::repository::{AuthRecord, AuthTokenRepository, StorageError};

#[async_trait::async_trait]
impl AuthTokenRepository for SqliteRepository {
    async fn load_auth(&self) -> Result<Option<AuthRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT access_token, user_id, user_name, user_role, saved_at
            FROM auth_state WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user_id: i64 = row.try_get("user_id").map_err(ser)?;
        let user_id = u64::try_from(user_id)
            .map_err(|_| StorageError::Serialization(format!("invalid user_id: {user_id}")))?;
        let role: Role = row
            .try_get::<String, _>("user_role")
            .map_err(ser)?
            .parse()
            .map_err(ser)?;

        Ok(Some(AuthRecord {
            access_token: row.try_get("access_token").map_err(ser)?,
            user: AuthUser {
                id: UserId::new(user_id),
                name: row.try_get("user_name").map_err(ser)?,
                role,
            },
            saved_at: row.try_get("saved_at").map_err(ser)?,
        }))
    }

    async fn save_auth(&self, record: &AuthRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO auth_state (id, access_token, user_id, user_name, user_role, saved_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                user_id = excluded.user_id,
                user_name = excluded.user_name,
                user_role = excluded.user_role,
                saved_at = excluded.saved_at
            ",
        )
        .bind(record.access_token.as_str())
        .bind(id_to_i64("user_id", record.user.id.value())?)
        .bind(record.user.name.as_str())
        .bind(record.user.role.as_str())
        .bind(record.saved_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn clear_auth(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM auth_state")
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
