use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::pin::PinChannel;

/// Fixed at registration by the entry point used, never client-supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "PascalCase")]
pub enum Role {
    Admin,
    Librarian,
    Member,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub verification_pin_hash: Option<String>,
    pub verification_pin_expires_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset_pin_hash: Option<String>,
    pub reset_pin_expires_at: Option<OffsetDateTime>,
    pub password_changed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, email_verified, \
     verification_pin_hash, verification_pin_expires_at, \
     reset_pin_hash, reset_pin_expires_at, password_changed_at, created_at";

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(db)
        .await
    }

    /// Store a new challenge on one channel, replacing any prior one. The
    /// hash and expiry always move together.
    pub async fn set_pin(
        db: &PgPool,
        id: Uuid,
        channel: PinChannel,
        pin_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        let sql = match channel {
            PinChannel::Verification => {
                "UPDATE users SET verification_pin_hash = $2, verification_pin_expires_at = $3
                 WHERE id = $1"
            }
            PinChannel::Reset => {
                "UPDATE users SET reset_pin_hash = $2, reset_pin_expires_at = $3 WHERE id = $1"
            }
        };
        sqlx::query(sql)
            .bind(id)
            .bind(pin_hash)
            .bind(expires_at)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn clear_pin(db: &PgPool, id: Uuid, channel: PinChannel) -> Result<(), sqlx::Error> {
        let sql = match channel {
            PinChannel::Verification => {
                "UPDATE users SET verification_pin_hash = NULL,
                 verification_pin_expires_at = NULL WHERE id = $1"
            }
            PinChannel::Reset => {
                "UPDATE users SET reset_pin_hash = NULL, reset_pin_expires_at = NULL
                 WHERE id = $1"
            }
        };
        sqlx::query(sql).bind(id).execute(db).await?;
        Ok(())
    }

    /// A successful verification consumes the PIN and marks the email
    /// verified in one statement.
    pub async fn consume_verification_pin(db: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET email_verified = TRUE,
             verification_pin_hash = NULL, verification_pin_expires_at = NULL
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// A successful reset rotates the password, stamps `password_changed_at`
    /// (invalidating earlier tokens) and consumes the reset PIN atomically.
    pub async fn update_password(
        db: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, password_changed_at = now(),
             reset_pin_hash = NULL, reset_pin_expires_at = NULL
             WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_as_enumerated_name() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"Admin\"");
        assert_eq!(
            serde_json::to_string(&Role::Librarian).unwrap(),
            "\"Librarian\""
        );
        assert_eq!(serde_json::to_string(&Role::Member).unwrap(), "\"Member\"");
    }

    #[test]
    fn secrets_never_serialize() {
        let user = User {
            id: Uuid::new_v4(),
            name: "A".into(),
            email: "a@x.com".into(),
            password_hash: "argon2-digest".into(),
            role: Role::Member,
            email_verified: false,
            verification_pin_hash: Some("pin-digest".into()),
            verification_pin_expires_at: None,
            reset_pin_hash: Some("reset-digest".into()),
            reset_pin_expires_at: None,
            password_changed_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2-digest"));
        assert!(!json.contains("pin-digest"));
        assert!(!json.contains("reset-digest"));
    }
}
