use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use jobboard_core::lifecycle::{self, RuleViolation};
use jobboard_core::types::{
    EducationLevel, ExperienceLevel, FanoutTask, JobPosting, JobType, SavedJob,
};
use jobboard_storage::{Database, PostingWithOwner, SavedJobInsertOutcome};

use crate::dispatcher::TaskDispatcher;

/// Request payload for publishing a new posting.
#[derive(Debug, Clone)]
pub struct PublishPosting {
    pub company_id: String,
    pub title: String,
    pub description: String,
    pub requirements: String,
    pub responsibilities: String,
    pub location: String,
    pub job_type: JobType,
    pub experience_level: ExperienceLevel,
    pub education_required: EducationLevel,
    pub salary_min: i64,
    pub salary_max: i64,
    pub deadline: NaiveDate,
}

/// Publishing, retrieval and bookmarking of job postings.
#[derive(Clone)]
pub struct PostingService {
    database: Database,
    dispatcher: TaskDispatcher,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl PostingService {
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

    /// Publishes a vacancy and queues the announcement to past applicants of
    /// the company.
    pub async fn publish(&self, request: PublishPosting) -> Result<JobPosting, PostingError> {
        let company = self
            .database
            .companies()
            .fetch(&request.company_id)
            .await?
            .ok_or(PostingError::NotFound("company"))?;

        let now = (self.clock)();
        lifecycle::validate_posting_draft(
            company.is_active,
            request.salary_min,
            request.salary_max,
            request.deadline,
            now.date_naive(),
        )?;

        let posting = JobPosting {
            id: Uuid::new_v4().to_string(),
            company_id: request.company_id,
            title: request.title,
            description: request.description,
            requirements: request.requirements,
            responsibilities: request.responsibilities,
            location: request.location,
            job_type: request.job_type,
            experience_level: request.experience_level,
            education_required: request.education_required,
            salary_min: request.salary_min,
            salary_max: request.salary_max,
            is_active: true,
            posted_at: now,
            updated_at: now,
            deadline: request.deadline,
            views_count: 0,
        };
        self.database.postings().insert(&posting).await?;

        info!(
            stage = "postings",
            posting_id = %posting.id,
            company_id = %posting.company_id,
            "posting published"
        );
        self.dispatcher.enqueue(FanoutTask::PostingPublished {
            posting_id: posting.id.clone(),
            title: posting.title.clone(),
            company_id: posting.company_id.clone(),
        });

        Ok(posting)
    }

    /// Fetches a posting and counts the view. The bump happens in a single
    /// UPDATE so concurrent readers cannot lose increments.
    pub async fn get(&self, posting_id: &str) -> Result<PostingWithOwner, PostingError> {
        let views = self
            .database
            .postings()
            .increment_views(posting_id)
            .await?
            .ok_or(PostingError::NotFound("job posting"))?;

        let mut found = self
            .database
            .postings()
            .fetch(posting_id)
            .await?
            .ok_or(PostingError::NotFound("job posting"))?;
        found.posting.views_count = views;
        Ok(found)
    }

    /// Bookmarks a posting for a seeker. Saving the same posting twice is
    /// rejected by the unique pair index.
    pub async fn save_job(
        &self,
        job_seeker_id: &str,
        job_posting_id: &str,
    ) -> Result<SavedJob, PostingError> {
        self.database
            .postings()
            .fetch(job_posting_id)
            .await?
            .ok_or(PostingError::NotFound("job posting"))?;

        let saved = SavedJob {
            id: Uuid::new_v4().to_string(),
            job_seeker_id: job_seeker_id.to_string(),
            job_posting_id: job_posting_id.to_string(),
            saved_at: (self.clock)(),
        };
        match self.database.saved_jobs().insert(&saved).await? {
            SavedJobInsertOutcome::Inserted => Ok(saved),
            SavedJobInsertOutcome::Duplicate => Err(PostingError::AlreadySaved),
        }
    }

    /// Removes a bookmark. Only the seeker who saved it may remove it.
    pub async fn unsave_job(
        &self,
        saved_job_id: &str,
        acting_seeker_id: &str,
    ) -> Result<(), PostingError> {
        let saved = self
            .database
            .saved_jobs()
            .fetch(saved_job_id)
            .await?
            .ok_or(PostingError::NotFound("saved job"))?;
        if saved.job_seeker_id != acting_seeker_id {
            return Err(PostingError::Forbidden);
        }

        self.database.saved_jobs().delete(saved_job_id).await?;
        Ok(())
    }

    pub async fn list_saved(&self, job_seeker_id: &str) -> Result<Vec<SavedJob>, PostingError> {
        let saved = self
            .database
            .saved_jobs()
            .list_for_seeker(job_seeker_id)
            .await?;
        Ok(saved)
    }
}

#[derive(Debug, Error)]
pub enum PostingError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("posting is already saved")]
    AlreadySaved,
    #[error("saved job belongs to another seeker")]
    Forbidden,
    #[error(transparent)]
    Rule(#[from] RuleViolation),
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),
}
