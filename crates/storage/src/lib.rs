use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, Row, SqlitePool};
use thiserror::Error;

use jobboard_core::types::{
    ApplicationStatus, JobApplication, JobPosting, Notification, NotificationKind, SavedJob,
    TokenPurpose, UserRole,
};

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to query user accounts.
    pub fn users(&self) -> UserRepository {
        UserRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to query job seeker profiles.
    pub fn seekers(&self) -> SeekerRepository {
        SeekerRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to query company profiles.
    pub fn companies(&self) -> CompanyRepository {
        CompanyRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to operate on job postings.
    pub fn postings(&self) -> PostingRepository {
        PostingRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to operate on job applications.
    pub fn applications(&self) -> ApplicationRepository {
        ApplicationRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to operate on notifications.
    pub fn notifications(&self) -> NotificationRepository {
        NotificationRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to operate on saved jobs.
    pub fn saved_jobs(&self) -> SavedJobRepository {
        SavedJobRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to operate on single-use tokens.
    pub fn tokens(&self) -> TokenRepository {
        TokenRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_date_str(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("2067"),
        _ => false,
    }
}

/// User account row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub role: String,
    pub email_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Returns the typed role, defaulting unknown values to job seeker.
    pub fn role(&self) -> UserRole {
        self.role.parse().unwrap_or(UserRole::JobSeeker)
    }
}

/// Repository for user accounts.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub async fn fetch(&self, user_id: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, role, email_verified, is_active, created_at, updated_at \
             FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn set_email_verified(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET email_verified = 1, updated_at = ? WHERE id = ?")
            .bind(to_rfc3339(now))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Job seeker profile row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobSeekerRecord {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub location: String,
}

/// Repository for job seeker profiles.
#[derive(Clone)]
pub struct SeekerRepository {
    pool: SqlitePool,
}

impl SeekerRepository {
    pub async fn fetch(&self, seeker_id: &str) -> Result<Option<JobSeekerRecord>, sqlx::Error> {
        sqlx::query_as::<_, JobSeekerRecord>(
            "SELECT id, user_id, full_name, location FROM job_seekers WHERE id = ?",
        )
        .bind(seeker_id)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Company profile row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompanyRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub is_active: bool,
}

/// Repository for company profiles.
#[derive(Clone)]
pub struct CompanyRepository {
    pool: SqlitePool,
}

impl CompanyRepository {
    pub async fn fetch(&self, company_id: &str) -> Result<Option<CompanyRecord>, sqlx::Error> {
        sqlx::query_as::<_, CompanyRecord>(
            "SELECT id, user_id, name, is_active FROM companies WHERE id = ?",
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn fetch_by_user(&self, user_id: &str) -> Result<Option<CompanyRecord>, sqlx::Error> {
        sqlx::query_as::<_, CompanyRecord>(
            "SELECT id, user_id, name, is_active FROM companies WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Job posting row joined with its owning company.
#[derive(Debug, sqlx::FromRow)]
struct PostingRow {
    id: String,
    company_id: String,
    title: String,
    description: String,
    requirements: String,
    responsibilities: String,
    location: String,
    job_type: String,
    experience_level: String,
    education_required: String,
    salary_min: i64,
    salary_max: i64,
    is_active: bool,
    posted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deadline: NaiveDate,
    views_count: i64,
    company_name: String,
    owner_user_id: String,
}

impl PostingRow {
    fn into_domain(self) -> PostingWithOwner {
        use jobboard_core::types::{EducationLevel, ExperienceLevel, JobType};

        PostingWithOwner {
            posting: JobPosting {
                id: self.id,
                company_id: self.company_id,
                title: self.title,
                description: self.description,
                requirements: self.requirements,
                responsibilities: self.responsibilities,
                location: self.location,
                job_type: self.job_type.parse().unwrap_or(JobType::FullTime),
                experience_level: self
                    .experience_level
                    .parse()
                    .unwrap_or(ExperienceLevel::Entry),
                education_required: self
                    .education_required
                    .parse()
                    .unwrap_or(EducationLevel::HighSchool),
                salary_min: self.salary_min,
                salary_max: self.salary_max,
                is_active: self.is_active,
                posted_at: self.posted_at,
                updated_at: self.updated_at,
                deadline: self.deadline,
                views_count: self.views_count as u32,
            },
            company_name: self.company_name,
            owner_user_id: self.owner_user_id,
        }
    }
}

/// A posting together with ownership data needed for authorization.
#[derive(Debug, Clone)]
pub struct PostingWithOwner {
    pub posting: JobPosting,
    pub company_name: String,
    pub owner_user_id: String,
}

const POSTING_SELECT: &str = "SELECT p.id, p.company_id, p.title, p.description, \
    p.requirements, p.responsibilities, p.location, p.job_type, p.experience_level, \
    p.education_required, p.salary_min, p.salary_max, p.is_active, p.posted_at, \
    p.updated_at, p.deadline, p.views_count, c.name AS company_name, \
    c.user_id AS owner_user_id \
    FROM job_postings AS p JOIN companies AS c ON c.id = p.company_id";

/// Repository for job postings.
#[derive(Clone)]
pub struct PostingRepository {
    pool: SqlitePool,
}

impl PostingRepository {
    pub async fn insert(&self, posting: &JobPosting) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO job_postings \
             (id, company_id, title, description, requirements, responsibilities, location, \
              job_type, experience_level, education_required, salary_min, salary_max, \
              is_active, posted_at, updated_at, deadline, views_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&posting.id)
        .bind(&posting.company_id)
        .bind(&posting.title)
        .bind(&posting.description)
        .bind(&posting.requirements)
        .bind(&posting.responsibilities)
        .bind(&posting.location)
        .bind(posting.job_type.as_str())
        .bind(posting.experience_level.as_str())
        .bind(posting.education_required.as_str())
        .bind(posting.salary_min)
        .bind(posting.salary_max)
        .bind(posting.is_active)
        .bind(to_rfc3339(posting.posted_at))
        .bind(to_rfc3339(posting.updated_at))
        .bind(to_date_str(posting.deadline))
        .bind(posting.views_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch(&self, posting_id: &str) -> Result<Option<PostingWithOwner>, sqlx::Error> {
        let row = sqlx::query_as::<_, PostingRow>(&format!("{POSTING_SELECT} WHERE p.id = ?"))
            .bind(posting_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(PostingRow::into_domain))
    }

    /// Atomically bumps the view counter and returns the new value, or `None`
    /// when the posting does not exist.
    pub async fn increment_views(&self, posting_id: &str) -> Result<Option<u32>, sqlx::Error> {
        let row = sqlx::query(
            "UPDATE job_postings SET views_count = views_count + 1 \
             WHERE id = ? RETURNING views_count",
        )
        .bind(posting_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let count: i64 = row.get("views_count");
            count as u32
        }))
    }

    /// Flips every active posting whose deadline has passed to inactive in one
    /// batch. Returns the number of postings deactivated; running it again
    /// without new expiries returns zero.
    pub async fn deactivate_expired(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE job_postings SET is_active = 0, updated_at = ? \
             WHERE deadline <= ? AND is_active = 1",
        )
        .bind(to_rfc3339(now))
        .bind(to_date_str(today))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Result of attempting to insert a job application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationInsertOutcome {
    Inserted,
    /// The (job_posting, job_seeker) pair already has an application; the
    /// unique constraint decided the race.
    Duplicate,
}

impl ApplicationInsertOutcome {
    pub fn is_duplicate(self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Application row joined with everything needed for authorization and fan-out.
#[derive(Debug, sqlx::FromRow)]
struct ApplicationContextRow {
    id: String,
    job_posting_id: String,
    job_seeker_id: String,
    cover_letter: String,
    resume_filename: String,
    status: String,
    applied_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    posting_title: String,
    company_id: String,
    posting_owner_user_id: String,
    seeker_user_id: String,
}

impl ApplicationContextRow {
    fn into_domain(self) -> ApplicationContext {
        ApplicationContext {
            application: JobApplication {
                id: self.id,
                job_posting_id: self.job_posting_id,
                job_seeker_id: self.job_seeker_id,
                cover_letter: self.cover_letter,
                resume_filename: self.resume_filename,
                status: self
                    .status
                    .parse()
                    .unwrap_or(ApplicationStatus::UnderReview),
                applied_at: self.applied_at,
                updated_at: self.updated_at,
            },
            posting_title: self.posting_title,
            company_id: self.company_id,
            posting_owner_user_id: self.posting_owner_user_id,
            seeker_user_id: self.seeker_user_id,
        }
    }
}

/// An application plus the ownership context of its posting and seeker.
#[derive(Debug, Clone)]
pub struct ApplicationContext {
    pub application: JobApplication,
    pub posting_title: String,
    pub company_id: String,
    pub posting_owner_user_id: String,
    pub seeker_user_id: String,
}

/// Repository for job applications.
#[derive(Clone)]
pub struct ApplicationRepository {
    pool: SqlitePool,
}

impl ApplicationRepository {
    /// Inserts a new application. A unique-constraint conflict on the
    /// (posting, seeker) pair is reported as a typed outcome, not an error.
    pub async fn insert(
        &self,
        application: &JobApplication,
    ) -> Result<ApplicationInsertOutcome, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO job_applications \
             (id, job_posting_id, job_seeker_id, cover_letter, resume_filename, status, \
              applied_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&application.id)
        .bind(&application.job_posting_id)
        .bind(&application.job_seeker_id)
        .bind(&application.cover_letter)
        .bind(&application.resume_filename)
        .bind(application.status.as_str())
        .bind(to_rfc3339(application.applied_at))
        .bind(to_rfc3339(application.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(ApplicationInsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(ApplicationInsertOutcome::Duplicate),
            Err(err) => Err(err),
        }
    }

    pub async fn fetch_context(
        &self,
        application_id: &str,
    ) -> Result<Option<ApplicationContext>, sqlx::Error> {
        let row = sqlx::query_as::<_, ApplicationContextRow>(
            "SELECT a.id, a.job_posting_id, a.job_seeker_id, a.cover_letter, \
                    a.resume_filename, a.status, a.applied_at, a.updated_at, \
                    p.title AS posting_title, p.company_id AS company_id, \
                    c.user_id AS posting_owner_user_id, js.user_id AS seeker_user_id \
               FROM job_applications AS a \
               JOIN job_postings AS p ON p.id = a.job_posting_id \
               JOIN companies AS c ON c.id = p.company_id \
               JOIN job_seekers AS js ON js.id = a.job_seeker_id \
              WHERE a.id = ?",
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ApplicationContextRow::into_domain))
    }

    pub async fn set_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE job_applications SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(to_rfc3339(updated_at))
            .bind(application_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Updates seeker-editable fields, leaving absent ones untouched.
    pub async fn update_content(
        &self,
        application_id: &str,
        cover_letter: Option<&str>,
        resume_filename: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE job_applications \
             SET cover_letter = COALESCE(?, cover_letter), \
                 resume_filename = COALESCE(?, resume_filename), \
                 updated_at = ? \
             WHERE id = ?",
        )
        .bind(cover_letter)
        .bind(resume_filename)
        .bind(to_rfc3339(updated_at))
        .bind(application_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, application_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM job_applications WHERE id = ?")
            .bind(application_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Distinct user ids of every job seeker who has applied to any posting of
    /// the company. The DISTINCT keeps seekers with several applications from
    /// appearing more than once in a fan-out audience.
    pub async fn distinct_applicant_users(
        &self,
        company_id: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT DISTINCT js.user_id \
               FROM job_applications AS a \
               JOIN job_postings AS p ON p.id = a.job_posting_id \
               JOIN job_seekers AS js ON js.id = a.job_seeker_id \
              WHERE p.company_id = ? \
              ORDER BY js.user_id",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("user_id")).collect())
    }
}

/// Notification row.
#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    message: String,
    kind: String,
    related_object_id: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_domain(self) -> Notification {
        Notification {
            id: self.id,
            recipient_id: self.recipient_id,
            message: self.message,
            kind: self.kind.parse().unwrap_or(NotificationKind::System),
            related_object_id: self.related_object_id,
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

/// Attribute filters accepted when listing a user's notifications.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub kind: Option<NotificationKind>,
    pub is_read: Option<bool>,
}

/// A clamped pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    number: u32,
    size: u32,
}

impl Page {
    pub const DEFAULT_SIZE: u32 = 10;
    pub const MAX_SIZE: u32 = 100;

    /// Builds a window from 1-based page number and requested size, clamping
    /// the size into `1..=MAX_SIZE`.
    pub fn clamped(number: Option<u32>, size: Option<u32>) -> Self {
        let number = number.unwrap_or(1).max(1);
        let size = size
            .unwrap_or(Self::DEFAULT_SIZE)
            .clamp(1, Self::MAX_SIZE);
        Self { number, size }
    }

    fn limit(self) -> i64 {
        i64::from(self.size)
    }

    fn offset(self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::clamped(None, None)
    }
}

/// Repository for notifications.
#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub async fn insert(&self, notification: &Notification) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO notifications \
             (id, recipient_id, message, kind, related_object_id, is_read, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id)
        .bind(&notification.recipient_id)
        .bind(&notification.message)
        .bind(notification.kind.as_str())
        .bind(&notification.related_object_id)
        .bind(notification.is_read)
        .bind(to_rfc3339(notification.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch(&self, notification_id: &str) -> Result<Option<Notification>, sqlx::Error> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, recipient_id, message, kind, related_object_id, is_read, created_at \
             FROM notifications WHERE id = ?",
        )
        .bind(notification_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(NotificationRow::into_domain))
    }

    /// Lists a user's notifications ordered by creation time ascending,
    /// optionally filtered by kind and read state.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        filter: &NotificationFilter,
        page: Page,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let kind = filter.kind.map(NotificationKind::as_str);
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, recipient_id, message, kind, related_object_id, is_read, created_at \
               FROM notifications \
              WHERE recipient_id = ? \
                AND (? IS NULL OR kind = ?) \
                AND (? IS NULL OR is_read = ?) \
              ORDER BY created_at ASC \
              LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(kind)
        .bind(kind)
        .bind(filter.is_read)
        .bind(filter.is_read)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(NotificationRow::into_domain).collect())
    }

    pub async fn mark_read(&self, notification_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
            .bind(notification_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Marks every notification of the user read in one statement and returns
    /// the number of rows the statement matched. SQLite counts a matched row
    /// even when it was already read, so the count covers all of the user's
    /// notifications and re-invocation reports the same number. Rows created
    /// concurrently with the update simply stay unread.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE recipient_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Result of attempting to insert a saved job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedJobInsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, sqlx::FromRow)]
struct SavedJobRow {
    id: String,
    job_seeker_id: String,
    job_posting_id: String,
    saved_at: DateTime<Utc>,
}

impl SavedJobRow {
    fn into_domain(self) -> SavedJob {
        SavedJob {
            id: self.id,
            job_seeker_id: self.job_seeker_id,
            job_posting_id: self.job_posting_id,
            saved_at: self.saved_at,
        }
    }
}

/// Repository for saved jobs.
#[derive(Clone)]
pub struct SavedJobRepository {
    pool: SqlitePool,
}

impl SavedJobRepository {
    pub async fn insert(&self, saved: &SavedJob) -> Result<SavedJobInsertOutcome, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO saved_jobs (id, job_seeker_id, job_posting_id, saved_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&saved.id)
        .bind(&saved.job_seeker_id)
        .bind(&saved.job_posting_id)
        .bind(to_rfc3339(saved.saved_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(SavedJobInsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(SavedJobInsertOutcome::Duplicate),
            Err(err) => Err(err),
        }
    }

    pub async fn fetch(&self, saved_job_id: &str) -> Result<Option<SavedJob>, sqlx::Error> {
        let row = sqlx::query_as::<_, SavedJobRow>(
            "SELECT id, job_seeker_id, job_posting_id, saved_at FROM saved_jobs WHERE id = ?",
        )
        .bind(saved_job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SavedJobRow::into_domain))
    }

    pub async fn delete(&self, saved_job_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM saved_jobs WHERE id = ?")
            .bind(saved_job_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_for_seeker(&self, job_seeker_id: &str) -> Result<Vec<SavedJob>, sqlx::Error> {
        let rows = sqlx::query_as::<_, SavedJobRow>(
            "SELECT id, job_seeker_id, job_posting_id, saved_at \
             FROM saved_jobs WHERE job_seeker_id = ? ORDER BY saved_at ASC",
        )
        .bind(job_seeker_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SavedJobRow::into_domain).collect())
    }
}

/// Single-use token row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TokenRecord {
    pub id: String,
    pub token: String,
    pub user_id: String,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Returns the typed purpose, defaulting unknown values to email
    /// verification.
    pub fn purpose(&self) -> TokenPurpose {
        self.purpose.parse().unwrap_or(TokenPurpose::VerifyEmail)
    }
}

/// Repository for single-use account tokens.
#[derive(Clone)]
pub struct TokenRepository {
    pool: SqlitePool,
}

impl TokenRepository {
    pub async fn insert(&self, record: &TokenRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO tokens (id, token, user_id, purpose, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.token)
        .bind(&record.user_id)
        .bind(&record.purpose)
        .bind(to_rfc3339(record.expires_at))
        .bind(to_rfc3339(record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch_by_token(&self, token: &str) -> Result<Option<TokenRecord>, sqlx::Error> {
        sqlx::query_as::<_, TokenRecord>(
            "SELECT id, token, user_id, purpose, expires_at, created_at \
             FROM tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete(&self, token_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM tokens WHERE id = ?")
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes every token past its expiry. Returns the number deleted.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at <= ?")
            .bind(to_rfc3339(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Removes accounts that never verified their email before the
    /// verification token expired. The cascade also drops their tokens.
    pub async fn delete_unverified_users_with_expired_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM users \
              WHERE email_verified = 0 \
                AND id IN (SELECT user_id FROM tokens \
                            WHERE purpose = 'VERIFY_EMAIL' AND expires_at <= ?)",
        )
        .bind(to_rfc3339(now))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
