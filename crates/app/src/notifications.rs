use thiserror::Error;
use tracing::info;

use jobboard_core::types::Notification;
use jobboard_storage::{Database, NotificationFilter, Page};

/// Read and acknowledgement surface over a user's notification inbox.
#[derive(Clone)]
pub struct NotificationService {
    database: Database,
}

impl NotificationService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        filter: &NotificationFilter,
        page: Page,
    ) -> Result<Vec<Notification>, NotificationError> {
        let notifications = self
            .database
            .notifications()
            .list_for_user(user_id, filter, page)
            .await?;
        Ok(notifications)
    }

    /// Marks one notification read. Acknowledging an already-read
    /// notification succeeds and leaves it read.
    pub async fn mark_read(
        &self,
        notification_id: &str,
        acting_user_id: &str,
    ) -> Result<Notification, NotificationError> {
        let mut notification = self
            .database
            .notifications()
            .fetch(notification_id)
            .await?
            .ok_or(NotificationError::NotFound)?;

        if notification.recipient_id != acting_user_id {
            return Err(NotificationError::Forbidden);
        }

        self.database
            .notifications()
            .mark_read(notification_id)
            .await?;
        notification.is_read = true;
        Ok(notification)
    }

    /// Marks every notification of the user read in one statement. The
    /// returned count covers all of the user's notifications, read or not,
    /// so repeating the call reports the same number.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, NotificationError> {
        let updated = self.database.notifications().mark_all_read(user_id).await?;
        if updated == 0 {
            return Err(NotificationError::NoNotifications);
        }

        info!(stage = "notifications", %user_id, updated, "inbox marked read");
        Ok(updated)
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification not found")]
    NotFound,
    #[error("notification belongs to another user")]
    Forbidden,
    #[error("no notifications to mark read")]
    NoNotifications,
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jobboard_core::types::NotificationKind;

    async fn setup(name: &str) -> (NotificationService, Database) {
        let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");

        for id in ["usr-1", "usr-2"] {
            sqlx::query(
                "INSERT INTO users (id, email, role, email_verified, is_active, created_at, updated_at) \
                 VALUES (?, ?, 'JOB_SEEKER', 1, 1, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
            )
            .bind(id)
            .bind(format!("{id}@example.com"))
            .execute(db.pool())
            .await
            .expect("insert user");
        }

        (NotificationService::new(db.clone()), db)
    }

    async fn seed_notification(db: &Database, id: &str, recipient: &str, offset_secs: i64) {
        db.notifications()
            .insert(&Notification {
                id: id.to_string(),
                recipient_id: recipient.to_string(),
                message: "hello".to_string(),
                kind: NotificationKind::System,
                related_object_id: "obj-1".to_string(),
                is_read: false,
                created_at: Utc::now() + Duration::seconds(offset_secs),
            })
            .await
            .expect("insert notification");
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_recipient_and_idempotent() {
        let (service, db) = setup("notif_mark_read").await;
        seed_notification(&db, "n-1", "usr-1", 0).await;

        let err = service
            .mark_read("n-1", "usr-2")
            .await
            .expect_err("foreign recipient rejected");
        assert!(matches!(err, NotificationError::Forbidden));

        let read = service.mark_read("n-1", "usr-1").await.expect("mark read");
        assert!(read.is_read);

        let again = service.mark_read("n-1", "usr-1").await.expect("repeat");
        assert!(again.is_read);
    }

    #[tokio::test]
    async fn mark_read_unknown_id_is_not_found() {
        let (service, _db) = setup("notif_missing").await;
        let err = service
            .mark_read("n-missing", "usr-1")
            .await
            .expect_err("missing notification");
        assert!(matches!(err, NotificationError::NotFound));
    }

    #[tokio::test]
    async fn mark_all_read_reports_no_notifications_for_empty_inbox() {
        let (service, db) = setup("notif_mark_all").await;

        let err = service
            .mark_all_read("usr-1")
            .await
            .expect_err("empty inbox");
        assert!(matches!(err, NotificationError::NoNotifications));

        seed_notification(&db, "n-1", "usr-1", 0).await;
        seed_notification(&db, "n-2", "usr-1", 1).await;
        seed_notification(&db, "n-3", "usr-2", 2).await;

        let updated = service.mark_all_read("usr-1").await.expect("mark all");
        assert_eq!(updated, 2);

        let other_inbox = service
            .list_for_user(
                "usr-2",
                &NotificationFilter {
                    kind: None,
                    is_read: Some(false),
                },
                Page::default(),
            )
            .await
            .expect("list");
        assert_eq!(other_inbox.len(), 1, "other users' inboxes are untouched");
    }
}
