use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use uuid::Uuid;

use jobboard_core::messages;
use jobboard_core::types::{ApplicationStatus, FanoutTask, Notification, NotificationKind};
use jobboard_storage::Database;

use crate::mailer::{Mailer, MailerError};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 200;

/// Consumer side of the fan-out queue.
///
/// One worker drains the channel serially. A failing task is retried a
/// bounded number of times with a growing delay and then dropped with an
/// error log; fan-out work is best effort by contract and must never wedge
/// the queue behind a poison task.
#[derive(Clone)]
pub struct FanoutWorker {
    database: Database,
    mailer: Mailer,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl FanoutWorker {
    pub fn new(database: Database, mailer: Mailer) -> Self {
        Self {
            database,
            mailer,
            clock: Arc::new(Utc::now),
        }
    }

    /// Runs the drain loop in the background until the channel closes.
    pub fn spawn(self, receiver: UnboundedReceiver<FanoutTask>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(receiver).await;
        })
    }

    async fn run(self, mut receiver: UnboundedReceiver<FanoutTask>) {
        while let Some(task) = receiver.recv().await {
            self.process_with_retries(task).await;
        }
        info!(stage = "fanout", "dispatcher closed, fan-out worker exiting");
    }

    async fn process_with_retries(&self, task: FanoutTask) {
        let kind = task.kind();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.handle(&task).await {
                Ok(()) => {
                    counter!("fanout_tasks_total", "kind" => kind, "result" => "ok").increment(1);
                    return;
                }
                Err(err) if attempt < MAX_ATTEMPTS => {
                    counter!("fanout_retries_total").increment(1);
                    warn!(stage = "fanout", %kind, attempt, error = %err, "task failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(
                        RETRY_BASE_DELAY_MS * u64::from(attempt),
                    ))
                    .await;
                }
                Err(err) => {
                    counter!("fanout_tasks_total", "kind" => kind, "result" => "failed")
                        .increment(1);
                    error!(stage = "fanout", %kind, error = %err, "task dropped after retries");
                }
            }
        }
    }

    /// Executes one task. Public for tests; the loop above adds retries.
    pub async fn handle(&self, task: &FanoutTask) -> Result<(), FanoutError> {
        match task {
            FanoutTask::PostingPublished {
                posting_id,
                title,
                company_id,
            } => self.announce_posting(posting_id, title, company_id).await,
            FanoutTask::StatusChanged {
                application_id,
                posting_title,
                new_status,
            } => {
                self.announce_status(application_id, posting_title, *new_status)
                    .await
            }
            FanoutTask::EmailRequested { to, subject, body } => {
                self.mailer.send(to, subject, body).await?;
                Ok(())
            }
        }
    }

    /// Notifies every seeker who ever applied to one of the company's
    /// postings. The audience query is already deduplicated, so a seeker
    /// with several applications hears about the vacancy once.
    async fn announce_posting(
        &self,
        posting_id: &str,
        title: &str,
        company_id: &str,
    ) -> Result<(), FanoutError> {
        let Some(company) = self.database.companies().fetch(company_id).await? else {
            warn!(stage = "fanout", %company_id, "company vanished before announcement");
            return Ok(());
        };

        let audience = self
            .database
            .applications()
            .distinct_applicant_users(company_id)
            .await?;
        let message = messages::new_posting_notification(title, &company.name);

        let mut delivered = 0usize;
        for recipient_id in &audience {
            let notification = Notification {
                id: Uuid::new_v4().to_string(),
                recipient_id: recipient_id.clone(),
                message: message.clone(),
                kind: NotificationKind::JobPosting,
                related_object_id: posting_id.to_string(),
                is_read: false,
                created_at: (self.clock)(),
            };
            // One bad recipient must not starve the rest of the audience.
            match self.database.notifications().insert(&notification).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(stage = "fanout", %recipient_id, error = %err, "notification write failed");
                }
            }
        }

        counter!("notifications_created_total", "kind" => NotificationKind::JobPosting.as_str())
            .increment(delivered as u64);
        info!(
            stage = "fanout",
            %posting_id,
            audience = audience.len(),
            delivered,
            "posting announced"
        );
        Ok(())
    }

    async fn announce_status(
        &self,
        application_id: &str,
        posting_title: &str,
        new_status: ApplicationStatus,
    ) -> Result<(), FanoutError> {
        let Some(context) = self
            .database
            .applications()
            .fetch_context(application_id)
            .await?
        else {
            // Withdrawn between the status write and the fan-out pass.
            info!(stage = "fanout", %application_id, "application gone, skipping notification");
            return Ok(());
        };

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            recipient_id: context.seeker_user_id,
            message: messages::status_change_notification(posting_title, new_status),
            kind: NotificationKind::ApplicationStatusChange,
            related_object_id: application_id.to_string(),
            is_read: false,
            created_at: (self.clock)(),
        };
        self.database.notifications().insert(&notification).await?;

        counter!(
            "notifications_created_total",
            "kind" => NotificationKind::ApplicationStatusChange.as_str()
        )
        .increment(1);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Mail(#[from] MailerError),
}
