//! User repository for database operations

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString},
};
use common::error::DatabaseResult;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{error, info};

use crate::{
    error::{AuthError, AuthResult},
    models::{NewUser, User},
};

const USER_COLUMNS: &str =
    "id, name, email, avatar_url, password_hash, google_id, created_at, updated_at";

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        avatar_url: row.get("avatar_url"),
        password_hash: row.get("password_hash"),
        google_id: row.get("google_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(hashing_error)
}

fn hashing_error(e: password_hash::Error) -> AuthError {
    error!("Password hashing failed: {}", e);
    AuthError::Internal(format!("Failed to hash password: {}", e))
}

/// Check a password against a stored hash; unparsable hashes never verify
pub fn verify_password(user: &User, password: &str) -> bool {
    let Some(stored) = user.password_hash.as_deref() else {
        return false;
    };

    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user
    pub async fn create(&self, new_user: &NewUser) -> DatabaseResult<User> {
        info!("Creating new user: {}", new_user.email);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (name, email, avatar_url, password_hash, google_id)
            VALUES ($1, lower($2), $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.avatar_url)
        .bind(&new_user.password_hash)
        .bind(&new_user.google_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user_from_row(&row))
    }

    /// Find a user by email, case-insensitively
    pub async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Find the account for a Google profile and create it when none matches.
    ///
    /// An account already bound to the Google id wins. Only when there is
    /// none is the profile linked to an account with the same e-mail.
    pub async fn upsert_google_user(
        &self,
        google_id: &str,
        email: &str,
        name: &str,
        avatar_url: Option<&str>,
    ) -> DatabaseResult<User> {
        let by_google_id = sqlx::query(&format!(
            r#"
            UPDATE users
            SET name = COALESCE(NULLIF(name, ''), $2),
                avatar_url = COALESCE($3, avatar_url),
                updated_at = NOW()
            WHERE google_id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(google_id)
        .bind(name)
        .bind(avatar_url)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = by_google_id {
            return Ok(user_from_row(&row));
        }

        let by_email = sqlx::query(&format!(
            r#"
            UPDATE users
            SET google_id = $1,
                name = COALESCE(NULLIF(name, ''), $3),
                avatar_url = COALESCE($4, avatar_url),
                updated_at = NOW()
            WHERE email = lower($2)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(google_id)
        .bind(email)
        .bind(name)
        .bind(avatar_url)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = by_email {
            info!("Linked Google account to existing user: {}", email);
            return Ok(user_from_row(&row));
        }

        self.create(&NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: None,
            google_id: Some(google_id.to_string()),
            avatar_url: avatar_url.map(str::to_string),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::database::{DatabaseConfig, init_pool};
    use uuid::Uuid;

    fn user_with_hash(hash: Option<String>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Anna".to_string(),
            email: "anna@example.com".to_string(),
            avatar_url: None,
            password_hash: hash,
            google_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("Correct-Horse-9").unwrap();
        let user = user_with_hash(Some(hash));

        assert!(verify_password(&user, "Correct-Horse-9"));
        assert!(!verify_password(&user, "wrong"));
    }

    #[test]
    fn test_google_only_account_has_no_password() {
        assert!(!verify_password(&user_with_hash(None), "anything"));
        assert!(!verify_password(
            &user_with_hash(Some("not-a-phc-string".to_string())),
            "anything"
        ));
    }

    #[test]
    fn test_hashing_failure_is_an_internal_error() {
        let err = hashing_error(password_hash::Error::Password);
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL at DATABASE_URL with migrations applied"]
    async fn test_google_id_match_wins_over_email_match() -> Result<(), Box<dyn std::error::Error>>
    {
        let pool = init_pool(&DatabaseConfig::from_env()?).await?;
        let users = UserRepository::new(pool);
        let tag = Uuid::new_v4().simple().to_string();

        let password_user = users
            .create(&NewUser {
                name: "Password".to_string(),
                email: format!("pw-{tag}@example.com"),
                password_hash: Some(hash_password("Correct-Horse-9")?),
                google_id: None,
                avatar_url: None,
            })
            .await?;
        let google_user = users
            .create(&NewUser {
                name: "Google".to_string(),
                email: format!("g-{tag}@example.com"),
                password_hash: None,
                google_id: Some(format!("gid-{tag}")),
                avatar_url: None,
            })
            .await?;

        // Google now reports the address owned by the password account
        let found = users
            .upsert_google_user(&format!("gid-{tag}"), &password_user.email, "Google", None)
            .await?;
        assert_eq!(found.id, google_user.id);

        let untouched = users.find_by_email(&password_user.email).await?.unwrap();
        assert_eq!(untouched.google_id, None);

        // A fresh Google id links to the matching e-mail account
        let linked = users
            .upsert_google_user(&format!("gid2-{tag}"), &password_user.email, "Other", None)
            .await?;
        assert_eq!(linked.id, password_user.id);
        assert_eq!(linked.google_id, Some(format!("gid2-{tag}")));
        assert_eq!(linked.name, "Password");

        Ok(())
    }
}
