use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use jobboard_core::lifecycle::{self, RuleViolation};
use jobboard_core::types::{ApplicationStatus, FanoutTask, JobApplication, ResumeUpload};
use jobboard_storage::{ApplicationContext, ApplicationInsertOutcome, Database};

use crate::dispatcher::TaskDispatcher;

/// Request payload for submitting a new application.
#[derive(Debug, Clone)]
pub struct SubmitApplication {
    pub job_posting_id: String,
    pub job_seeker_id: String,
    pub cover_letter: String,
    pub resume: ResumeUpload,
}

/// Request payload for editing an application's seeker-owned content.
#[derive(Debug, Clone)]
pub struct EditApplication {
    pub application_id: String,
    pub acting_user_id: String,
    pub cover_letter: Option<String>,
    pub resume: Option<ResumeUpload>,
    /// Whether the caller tried to touch the status field. The edit path
    /// rejects this outright; status moves only through `update_status`.
    pub attempts_status_edit: bool,
}

/// Orchestrates the application lifecycle: rule checks first, then the
/// storage write, then fan-out for anything the applicant should hear about.
#[derive(Clone)]
pub struct ApplicationService {
    database: Database,
    dispatcher: TaskDispatcher,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl ApplicationService {
    pub fn new(
        database: Database,
        dispatcher: TaskDispatcher,
        clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Self {
        Self {
            database,
            dispatcher,
            clock,
        }
    }

    /// Submits a new application for a posting. The unique index on the
    /// (posting, seeker) pair is the final arbiter under concurrency; a lost
    /// race surfaces as [`ApplicationError::Duplicate`].
    pub async fn submit(
        &self,
        request: SubmitApplication,
    ) -> Result<JobApplication, ApplicationError> {
        let seeker = self
            .database
            .seekers()
            .fetch(&request.job_seeker_id)
            .await?
            .ok_or(ApplicationError::NotFound("job seeker"))?;

        let posting = self
            .database
            .postings()
            .fetch(&request.job_posting_id)
            .await?
            .ok_or(ApplicationError::NotFound("job posting"))?;

        let status =
            lifecycle::validate_submission(&seeker.user_id, &posting.owner_user_id, &request.resume)?;

        let now = (self.clock)();
        let application = JobApplication {
            id: Uuid::new_v4().to_string(),
            job_posting_id: request.job_posting_id,
            job_seeker_id: request.job_seeker_id,
            cover_letter: request.cover_letter,
            resume_filename: request.resume.filename,
            status,
            applied_at: now,
            updated_at: now,
        };

        match self.database.applications().insert(&application).await? {
            ApplicationInsertOutcome::Inserted => {}
            ApplicationInsertOutcome::Duplicate => {
                counter!("applications_submitted_total", "outcome" => "duplicate").increment(1);
                return Err(ApplicationError::Duplicate);
            }
        }

        counter!("applications_submitted_total", "outcome" => "accepted").increment(1);
        info!(
            stage = "lifecycle",
            application_id = %application.id,
            posting_id = %application.job_posting_id,
            "application submitted"
        );
        Ok(application)
    }

    /// Moves an application's status. Only the employer owning the posting
    /// may do so; the applicant is notified through the fan-out queue after
    /// the write lands.
    pub async fn update_status(
        &self,
        application_id: &str,
        acting_user_id: &str,
        new_status: ApplicationStatus,
    ) -> Result<JobApplication, ApplicationError> {
        let context = self.fetch_context(application_id).await?;

        lifecycle::authorize_status_change(&context.posting_owner_user_id, acting_user_id)?;

        let now = (self.clock)();
        self.database
            .applications()
            .set_status(application_id, new_status, now)
            .await?;

        counter!("application_status_updates_total").increment(1);
        info!(
            stage = "lifecycle",
            application_id = %application_id,
            status = new_status.as_str(),
            "application status updated"
        );

        self.dispatcher.enqueue(FanoutTask::StatusChanged {
            application_id: application_id.to_string(),
            posting_title: context.posting_title,
            new_status,
        });

        let mut application = context.application;
        application.status = new_status;
        application.updated_at = now;
        Ok(application)
    }

    /// Updates the cover letter and/or resume of an application. The status
    /// field is employer-exclusive and cannot be changed through this path.
    pub async fn edit_content(
        &self,
        request: EditApplication,
    ) -> Result<JobApplication, ApplicationError> {
        let context = self.fetch_context(&request.application_id).await?;

        lifecycle::authorize_content_edit(
            &context.seeker_user_id,
            &request.acting_user_id,
            request.attempts_status_edit,
        )?;
        if let Some(resume) = &request.resume {
            lifecycle::validate_resume(resume)?;
        }

        let now = (self.clock)();
        let resume_filename = request.resume.as_ref().map(|upload| upload.filename.as_str());
        self.database
            .applications()
            .update_content(
                &request.application_id,
                request.cover_letter.as_deref(),
                resume_filename,
                now,
            )
            .await?;

        let mut application = context.application;
        if let Some(cover_letter) = request.cover_letter {
            application.cover_letter = cover_letter;
        }
        if let Some(resume) = request.resume {
            application.resume_filename = resume.filename;
        }
        application.updated_at = now;
        Ok(application)
    }

    /// Removes an application entirely. Reserved for the owning job seeker.
    pub async fn withdraw(
        &self,
        application_id: &str,
        acting_user_id: &str,
    ) -> Result<(), ApplicationError> {
        let context = self.fetch_context(application_id).await?;

        lifecycle::authorize_withdraw(&context.seeker_user_id, acting_user_id)?;

        self.database.applications().delete(application_id).await?;
        info!(
            stage = "lifecycle",
            application_id = %application_id,
            "application withdrawn"
        );
        Ok(())
    }

    async fn fetch_context(
        &self,
        application_id: &str,
    ) -> Result<ApplicationContext, ApplicationError> {
        self.database
            .applications()
            .fetch_context(application_id)
            .await?
            .ok_or(ApplicationError::NotFound("application"))
    }
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("an application for this posting already exists")]
    Duplicate,
    #[error(transparent)]
    Rule(#[from] RuleViolation),
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jobboard_core::types::{EducationLevel, ExperienceLevel, JobPosting, JobType};
    use jobboard_storage::Database;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn setup(name: &str) -> (ApplicationService, Database, UnboundedReceiver<FanoutTask>) {
        let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");

        seed_user(&db, "emp-1", "EMPLOYER").await;
        seed_user(&db, "usr-1", "JOB_SEEKER").await;
        sqlx::query("INSERT INTO companies (id, user_id, name, is_active) VALUES ('co-1', 'emp-1', 'Acme', 1)")
            .execute(db.pool())
            .await
            .expect("insert company");
        sqlx::query(
            "INSERT INTO job_seekers (id, user_id, full_name, location) \
             VALUES ('js-1', 'usr-1', 'Sam Seeker', 'Tashkent')",
        )
        .execute(db.pool())
        .await
        .expect("insert seeker");

        let deadline = Utc::now().date_naive() + Duration::days(30);
        let now = Utc::now();
        db.postings()
            .insert(&JobPosting {
                id: "post-1".to_string(),
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
            })
            .await
            .expect("insert posting");

        let (dispatcher, receiver) = TaskDispatcher::channel();
        let service = ApplicationService::new(db.clone(), dispatcher, Arc::new(Utc::now));
        (service, db, receiver)
    }

    async fn seed_user(db: &Database, id: &str, role: &str) {
        sqlx::query(
            "INSERT INTO users (id, email, role, email_verified, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, 1, 1, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
        )
        .bind(id)
        .bind(format!("{id}@example.com"))
        .bind(role)
        .execute(db.pool())
        .await
        .expect("insert user");
    }

    fn submission() -> SubmitApplication {
        SubmitApplication {
            job_posting_id: "post-1".to_string(),
            job_seeker_id: "js-1".to_string(),
            cover_letter: "Hello".to_string(),
            resume: ResumeUpload {
                filename: "cv.pdf".to_string(),
                size_bytes: 1024,
            },
        }
    }

    #[tokio::test]
    async fn submit_creates_application_under_review() {
        let (service, _db, _rx) = setup("app_submit").await;

        let application = service.submit(submission()).await.expect("submit");
        assert_eq!(application.status, ApplicationStatus::UnderReview);
        assert_eq!(application.job_posting_id, "post-1");
    }

    #[tokio::test]
    async fn second_submission_for_same_pair_is_duplicate() {
        let (service, _db, _rx) = setup("app_duplicate").await;

        service.submit(submission()).await.expect("first submit");
        let err = service.submit(submission()).await.expect_err("second submit");
        assert!(matches!(err, ApplicationError::Duplicate));
    }

    #[tokio::test]
    async fn submit_rejects_oversized_resume() {
        let (service, _db, _rx) = setup("app_resume").await;

        let mut request = submission();
        request.resume.size_bytes = 6 * 1024 * 1024;
        let err = service.submit(request).await.expect_err("oversized");
        assert!(matches!(
            err,
            ApplicationError::Rule(RuleViolation::AttachmentTooLarge)
        ));
    }

    #[tokio::test]
    async fn status_update_requires_posting_owner_and_enqueues_fanout() {
        let (service, _db, mut rx) = setup("app_status").await;
        let application = service.submit(submission()).await.expect("submit");

        let err = service
            .update_status(&application.id, "usr-1", ApplicationStatus::Shortlisted)
            .await
            .expect_err("seeker cannot move status");
        assert!(matches!(
            err,
            ApplicationError::Rule(RuleViolation::NotPostingOwner)
        ));

        let updated = service
            .update_status(&application.id, "emp-1", ApplicationStatus::Shortlisted)
            .await
            .expect("owner updates status");
        assert_eq!(updated.status, ApplicationStatus::Shortlisted);

        let task = rx.recv().await.expect("fan-out task");
        match task {
            FanoutTask::StatusChanged {
                application_id,
                posting_title,
                new_status,
            } => {
                assert_eq!(application_id, application.id);
                assert_eq!(posting_title, "Backend Engineer");
                assert_eq!(new_status, ApplicationStatus::Shortlisted);
            }
            other => panic!("unexpected task {other:?}"),
        }
    }

    #[tokio::test]
    async fn edit_rejects_status_field_and_foreign_editor() {
        let (service, _db, _rx) = setup("app_edit").await;
        let application = service.submit(submission()).await.expect("submit");

        let err = service
            .edit_content(EditApplication {
                application_id: application.id.clone(),
                acting_user_id: "usr-1".to_string(),
                cover_letter: None,
                resume: None,
                attempts_status_edit: true,
            })
            .await
            .expect_err("status edit rejected");
        assert!(matches!(
            err,
            ApplicationError::Rule(RuleViolation::StatusEditNotAllowed)
        ));

        let err = service
            .edit_content(EditApplication {
                application_id: application.id.clone(),
                acting_user_id: "emp-1".to_string(),
                cover_letter: Some("new".to_string()),
                resume: None,
                attempts_status_edit: false,
            })
            .await
            .expect_err("foreign editor rejected");
        assert!(matches!(
            err,
            ApplicationError::Rule(RuleViolation::NotApplicationOwner)
        ));

        let updated = service
            .edit_content(EditApplication {
                application_id: application.id.clone(),
                acting_user_id: "usr-1".to_string(),
                cover_letter: Some("Updated letter".to_string()),
                resume: None,
                attempts_status_edit: false,
            })
            .await
            .expect("owner edits content");
        assert_eq!(updated.cover_letter, "Updated letter");
        assert_eq!(updated.resume_filename, "cv.pdf");
    }

    #[tokio::test]
    async fn withdraw_removes_the_application() {
        let (service, db, _rx) = setup("app_withdraw").await;
        let application = service.submit(submission()).await.expect("submit");

        let err = service
            .withdraw(&application.id, "emp-1")
            .await
            .expect_err("employer cannot withdraw");
        assert!(matches!(
            err,
            ApplicationError::Rule(RuleViolation::NotApplicationOwner)
        ));

        service
            .withdraw(&application.id, "usr-1")
            .await
            .expect("owner withdraws");

        let gone = db
            .applications()
            .fetch_context(&application.id)
            .await
            .expect("fetch");
        assert!(gone.is_none());
    }
}
