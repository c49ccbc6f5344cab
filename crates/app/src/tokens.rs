use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use jobboard_core::messages;
use jobboard_core::types::{FanoutTask, TokenPurpose};
use jobboard_storage::{Database, TokenRecord};

use crate::dispatcher::TaskDispatcher;

const TOKEN_LENGTH: usize = 48;
const VERIFY_EMAIL_TTL_HOURS: i64 = 24;
const PASSWORD_RESET_TTL_HOURS: i64 = 1;

/// A freshly issued token, echoed back to the caller.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
}

/// Result of redeeming a token.
#[derive(Debug, Clone)]
pub struct ConsumedToken {
    pub user_id: String,
    pub purpose: TokenPurpose,
}

/// Issues and redeems single-use account tokens and queues the emails that
/// carry them.
#[derive(Clone)]
pub struct TokenService {
    database: Database,
    dispatcher: TaskDispatcher,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    public_base_url: String,
}

impl TokenService {
    pub fn new(
        database: Database,
        dispatcher: TaskDispatcher,
        clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
        public_base_url: String,
    ) -> Self {
        Self {
            database,
            dispatcher,
            clock,
            public_base_url,
        }
    }

    /// Issues a token for the user and queues the email that delivers it.
    pub async fn issue(
        &self,
        user_id: &str,
        purpose: TokenPurpose,
    ) -> Result<IssuedToken, TokenError> {
        let user = self
            .database
            .users()
            .fetch(user_id)
            .await?
            .ok_or(TokenError::UserNotFound)?;

        let now = (self.clock)();
        let ttl_hours = match purpose {
            TokenPurpose::VerifyEmail => VERIFY_EMAIL_TTL_HOURS,
            TokenPurpose::PasswordReset => PASSWORD_RESET_TTL_HOURS,
        };
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        let record = TokenRecord {
            id: Uuid::new_v4().to_string(),
            token: token.clone(),
            user_id: user_id.to_string(),
            purpose: purpose.as_str().to_string(),
            expires_at: now + Duration::hours(ttl_hours),
            created_at: now,
        };
        self.database.tokens().insert(&record).await?;

        let link = format!("{}/tokens/{token}", self.public_base_url);
        let (subject, body) = match purpose {
            TokenPurpose::VerifyEmail => {
                ("Verify your email", messages::verify_email_body(&link))
            }
            TokenPurpose::PasswordReset => {
                ("Reset your password", messages::password_reset_body(&link))
            }
        };
        self.dispatcher.enqueue(FanoutTask::EmailRequested {
            to: user.email,
            subject: subject.to_string(),
            body,
        });

        info!(
            stage = "tokens",
            %user_id,
            purpose = purpose.as_str(),
            "token issued"
        );
        Ok(IssuedToken {
            token,
            purpose,
            expires_at: record.expires_at,
        })
    }

    /// Redeems a token. Tokens are single use: a successful redemption
    /// deletes the row, and redeeming an expired token deletes it too.
    pub async fn consume(&self, token: &str) -> Result<ConsumedToken, TokenError> {
        let record = self
            .database
            .tokens()
            .fetch_by_token(token)
            .await?
            .ok_or(TokenError::Invalid)?;

        let now = (self.clock)();
        if record.expires_at <= now {
            self.database.tokens().delete(&record.id).await?;
            return Err(TokenError::Expired);
        }

        let purpose = record.purpose();
        if purpose == TokenPurpose::VerifyEmail {
            self.database
                .users()
                .set_email_verified(&record.user_id, now)
                .await?;
        }
        self.database.tokens().delete(&record.id).await?;

        info!(
            stage = "tokens",
            user_id = %record.user_id,
            purpose = purpose.as_str(),
            "token consumed"
        );
        Ok(ConsumedToken {
            user_id: record.user_id,
            purpose,
        })
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("user not found")]
    UserNotFound,
    #[error("unknown token")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn setup(name: &str) -> (TokenService, Database, UnboundedReceiver<FanoutTask>) {
        let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");

        sqlx::query(
            "INSERT INTO users (id, email, role, email_verified, is_active, created_at, updated_at) \
             VALUES ('usr-1', 'usr-1@example.com', 'JOB_SEEKER', 0, 1, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
        )
        .execute(db.pool())
        .await
        .expect("insert user");

        let (dispatcher, receiver) = TaskDispatcher::channel();
        let service = TokenService::new(
            db.clone(),
            dispatcher,
            Arc::new(Utc::now),
            "http://localhost:8080".to_string(),
        );
        (service, db, receiver)
    }

    #[tokio::test]
    async fn issue_queues_verification_email_with_link() {
        let (service, _db, mut rx) = setup("tok_issue").await;

        let issued = service
            .issue("usr-1", TokenPurpose::VerifyEmail)
            .await
            .expect("issue");
        assert_eq!(issued.token.len(), TOKEN_LENGTH);

        let task = rx.recv().await.expect("email task");
        match task {
            FanoutTask::EmailRequested { to, subject, body } => {
                assert_eq!(to, "usr-1@example.com");
                assert_eq!(subject, "Verify your email");
                assert!(body.contains(&issued.token));
            }
            other => panic!("unexpected task {other:?}"),
        }
    }

    #[tokio::test]
    async fn consume_verifies_email_and_is_single_use() {
        let (service, db, _rx) = setup("tok_consume").await;

        let issued = service
            .issue("usr-1", TokenPurpose::VerifyEmail)
            .await
            .expect("issue");

        let consumed = service.consume(&issued.token).await.expect("consume");
        assert_eq!(consumed.user_id, "usr-1");
        assert_eq!(consumed.purpose, TokenPurpose::VerifyEmail);

        let user = db
            .users()
            .fetch("usr-1")
            .await
            .expect("fetch")
            .expect("user exists");
        assert!(user.email_verified);

        let err = service
            .consume(&issued.token)
            .await
            .expect_err("second redemption");
        assert!(matches!(err, TokenError::Invalid));
    }

    #[tokio::test]
    async fn expired_token_is_rejected_and_removed() {
        let (service, db, _rx) = setup("tok_expired").await;

        let now = Utc::now();
        db.tokens()
            .insert(&TokenRecord {
                id: "tok-1".to_string(),
                token: "stale".to_string(),
                user_id: "usr-1".to_string(),
                purpose: "PASSWORD_RESET".to_string(),
                expires_at: now - Duration::hours(1),
                created_at: now - Duration::hours(2),
            })
            .await
            .expect("insert token");

        let err = service.consume("stale").await.expect_err("expired");
        assert!(matches!(err, TokenError::Expired));

        let gone = db.tokens().fetch_by_token("stale").await.expect("fetch");
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let (service, _db, _rx) = setup("tok_user").await;
        let err = service
            .issue("usr-missing", TokenPurpose::VerifyEmail)
            .await
            .expect_err("missing user");
        assert!(matches!(err, TokenError::UserNotFound));
    }
}
