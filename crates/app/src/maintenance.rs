use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use metrics::counter;
use sqlx::Error as SqlxError;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use jobboard_storage::Database;

/// Background worker for the time-driven sweeps: posting deactivation and
/// token expiry.
#[derive(Clone)]
pub struct MaintenanceWorker {
    database: Database,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    interval: Duration,
}

impl MaintenanceWorker {
    pub fn new(database: Database, interval: Duration) -> Self {
        Self {
            database,
            clock: Arc::new(Utc::now),
            interval,
        }
    }

    /// Overrides the clock used to decide what counts as expired.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs the worker loop in the background.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    async fn run_loop(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once().await {
                error!(stage = "maintenance", error = %err, "maintenance run failed");
            }
        }
    }

    /// Executes one maintenance cycle. Each sweep is a single batch UPDATE or
    /// DELETE, so a second run over the same data affects zero rows.
    pub async fn run_once(&self) -> Result<(), MaintenanceError> {
        let now = (self.clock)();
        let today = now.date_naive();

        let deactivated = self
            .database
            .postings()
            .deactivate_expired(today, now)
            .await
            .map_err(|source| MaintenanceError::Sweep {
                op: "deactivate_postings",
                source,
            })?;
        counter!("maintenance_rows_total", "op" => "deactivate_postings").increment(deactivated);
        info!(
            stage = "maintenance",
            deactivated,
            today = %today,
            "expired postings deactivated"
        );

        // Unverified accounts go first so their tokens fall with the cascade
        // and are not double counted by the plain expiry sweep.
        let removed_users = self
            .database
            .tokens()
            .delete_unverified_users_with_expired_tokens(now)
            .await
            .map_err(|source| MaintenanceError::Sweep {
                op: "delete_unverified_users",
                source,
            })?;
        counter!("maintenance_rows_total", "op" => "delete_unverified_users")
            .increment(removed_users);

        let removed_tokens = self
            .database
            .tokens()
            .delete_expired(now)
            .await
            .map_err(|source| MaintenanceError::Sweep {
                op: "delete_tokens",
                source,
            })?;
        counter!("maintenance_rows_total", "op" => "delete_tokens").increment(removed_tokens);
        info!(
            stage = "maintenance",
            removed_users,
            removed_tokens,
            "token expiry sweep completed"
        );

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("maintenance sweep {op} failed")]
    Sweep {
        op: &'static str,
        #[source]
        source: SqlxError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use jobboard_core::types::{EducationLevel, ExperienceLevel, JobPosting, JobType};
    use jobboard_storage::TokenRecord;

    async fn setup(name: &str) -> Database {
        let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");

        sqlx::query(
            "INSERT INTO users (id, email, role, email_verified, is_active, created_at, updated_at) \
             VALUES ('emp-1', 'emp-1@example.com', 'EMPLOYER', 1, 1, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
        )
        .execute(db.pool())
        .await
        .expect("insert user");
        sqlx::query("INSERT INTO companies (id, user_id, name, is_active) VALUES ('co-1', 'emp-1', 'Acme', 1)")
            .execute(db.pool())
            .await
            .expect("insert company");
        db
    }

    fn posting(id: &str, deadline: chrono::NaiveDate) -> JobPosting {
        let now = Utc::now();
        JobPosting {
            id: id.to_string(),
            company_id: "co-1".to_string(),
            title: "Backend Engineer".to_string(),
            description: "Build things".to_string(),
            requirements: String::new(),
            responsibilities: String::new(),
            location: "Remote".to_string(),
            job_type: JobType::FullTime,
            experience_level: ExperienceLevel::Middle,
            education_required: EducationLevel::Bachelors,
            salary_min: 1_000,
            salary_max: 2_000,
            is_active: true,
            posted_at: now,
            updated_at: now,
            deadline,
            views_count: 0,
        }
    }

    #[tokio::test]
    async fn run_once_deactivates_expired_postings_and_sweeps_tokens() {
        let db = setup("maint_run_once").await;
        let now = Utc::now();
        let today = now.date_naive();

        db.postings()
            .insert(&posting("post-stale", today - ChronoDuration::days(2)))
            .await
            .expect("stale posting");
        db.postings()
            .insert(&posting("post-live", today + ChronoDuration::days(14)))
            .await
            .expect("live posting");

        sqlx::query(
            "INSERT INTO users (id, email, role, email_verified, is_active, created_at, updated_at) \
             VALUES ('usr-ghost', 'ghost@example.com', 'JOB_SEEKER', 0, 1, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
        )
        .execute(db.pool())
        .await
        .expect("insert ghost user");
        db.tokens()
            .insert(&TokenRecord {
                id: "tok-1".to_string(),
                token: "stale-verify".to_string(),
                user_id: "usr-ghost".to_string(),
                purpose: "VERIFY_EMAIL".to_string(),
                expires_at: now - ChronoDuration::hours(1),
                created_at: now - ChronoDuration::hours(25),
            })
            .await
            .expect("insert token");

        let clock = Arc::new(move || now);
        let worker =
            MaintenanceWorker::new(db.clone(), Duration::from_secs(60)).with_clock(clock);
        worker.run_once().await.expect("run_once");

        let stale = db
            .postings()
            .fetch("post-stale")
            .await
            .expect("fetch")
            .expect("exists");
        assert!(!stale.posting.is_active);
        let live = db
            .postings()
            .fetch("post-live")
            .await
            .expect("fetch")
            .expect("exists");
        assert!(live.posting.is_active);

        let ghost = db.users().fetch("usr-ghost").await.expect("fetch");
        assert!(ghost.is_none());
        let token = db.tokens().fetch_by_token("stale-verify").await.expect("fetch");
        assert!(token.is_none());

        // Second cycle over the same data is a no-op.
        worker.run_once().await.expect("second run");
    }
}
