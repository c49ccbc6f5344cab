use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Role attached to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    JobSeeker,
    Employer,
}

impl UserRole {
    /// Returns the canonical database representation for the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JobSeeker => "JOB_SEEKER",
            Self::Employer => "EMPLOYER",
        }
    }
}

impl FromStr for UserRole {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "JOB_SEEKER" => Ok(Self::JobSeeker),
            "EMPLOYER" => Ok(Self::Employer),
            _ => Err(()),
        }
    }
}

/// Lifecycle status of a job application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Applied,
    UnderReview,
    Shortlisted,
    Rejected,
    Offered,
    Hired,
}

impl ApplicationStatus {
    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "APPLIED",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Shortlisted => "SHORTLISTED",
            Self::Rejected => "REJECTED",
            Self::Offered => "OFFERED",
            Self::Hired => "HIRED",
        }
    }

    /// Human-readable label used in notification messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Applied => "Applied",
            Self::UnderReview => "Under review",
            Self::Shortlisted => "Shortlisted",
            Self::Rejected => "Rejected",
            Self::Offered => "Offered",
            Self::Hired => "Hired",
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "APPLIED" => Ok(Self::Applied),
            "UNDER_REVIEW" => Ok(Self::UnderReview),
            "SHORTLISTED" => Ok(Self::Shortlisted),
            "REJECTED" => Ok(Self::Rejected),
            "OFFERED" => Ok(Self::Offered),
            "HIRED" => Ok(Self::Hired),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Employment arrangement advertised by a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Internship,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullTime => "FULL_TIME",
            Self::PartTime => "PART_TIME",
            Self::Contract => "CONTRACT",
            Self::Internship => "INTERNSHIP",
        }
    }
}

impl FromStr for JobType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "FULL_TIME" => Ok(Self::FullTime),
            "PART_TIME" => Ok(Self::PartTime),
            "CONTRACT" => Ok(Self::Contract),
            "INTERNSHIP" => Ok(Self::Internship),
            _ => Err(()),
        }
    }
}

/// Seniority expected by a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperienceLevel {
    Entry,
    Middle,
    Senior,
    Executive,
}

impl ExperienceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Middle => "MIDDLE",
            Self::Senior => "SENIOR",
            Self::Executive => "EXECUTIVE",
        }
    }
}

impl FromStr for ExperienceLevel {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ENTRY" => Ok(Self::Entry),
            "MIDDLE" => Ok(Self::Middle),
            "SENIOR" => Ok(Self::Senior),
            "EXECUTIVE" => Ok(Self::Executive),
            _ => Err(()),
        }
    }
}

/// Minimum education requested by a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EducationLevel {
    HighSchool,
    Bachelors,
    Masters,
    Phd,
}

impl EducationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighSchool => "HIGH_SCHOOL",
            Self::Bachelors => "BACHELORS",
            Self::Masters => "MASTERS",
            Self::Phd => "PHD",
        }
    }
}

impl FromStr for EducationLevel {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "HIGH_SCHOOL" => Ok(Self::HighSchool),
            "BACHELORS" => Ok(Self::Bachelors),
            "MASTERS" => Ok(Self::Masters),
            "PHD" => Ok(Self::Phd),
            _ => Err(()),
        }
    }
}

/// Category of an inbox notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ApplicationStatusChange,
    JobPosting,
    Message,
    System,
}

impl NotificationKind {
    /// Returns the canonical database representation for the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApplicationStatusChange => "APPLICATION_STATUS_CHANGE",
            Self::JobPosting => "JOB_POSTING",
            Self::Message => "MESSAGE",
            Self::System => "SYSTEM",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "APPLICATION_STATUS_CHANGE" => Ok(Self::ApplicationStatusChange),
            "JOB_POSTING" => Ok(Self::JobPosting),
            "MESSAGE" => Ok(Self::Message),
            "SYSTEM" => Ok(Self::System),
            _ => Err(()),
        }
    }
}

/// Purpose of a single-use account token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenPurpose {
    VerifyEmail,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VerifyEmail => "VERIFY_EMAIL",
            Self::PasswordReset => "PASSWORD_RESET",
        }
    }
}

impl FromStr for TokenPurpose {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "VERIFY_EMAIL" => Ok(Self::VerifyEmail),
            "PASSWORD_RESET" => Ok(Self::PasswordReset),
            _ => Err(()),
        }
    }
}

/// A job application as persisted for a seeker/posting pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobApplication {
    pub id: String,
    pub job_posting_id: String,
    pub job_seeker_id: String,
    pub cover_letter: String,
    pub resume_filename: String,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A vacancy published by a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
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
    pub is_active: bool,
    pub posted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deadline: NaiveDate,
    pub views_count: u32,
}

/// An inbox entry owned by its recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub message: String,
    pub kind: NotificationKind,
    /// Opaque reference into the id space of the originating entity; no
    /// referential integrity is enforced.
    pub related_object_id: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A bookmarked posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedJob {
    pub id: String,
    pub job_seeker_id: String,
    pub job_posting_id: String,
    pub saved_at: DateTime<Utc>,
}

/// Resume metadata supplied with a submission or edit. Binary transport is
/// handled upstream; the pipeline only sees the name and byte count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeUpload {
    pub filename: String,
    pub size_bytes: u64,
}

/// Fire-and-forget work handed to the task dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FanoutTask {
    #[serde(rename_all = "snake_case")]
    PostingPublished {
        posting_id: String,
        title: String,
        company_id: String,
    },
    #[serde(rename_all = "snake_case")]
    StatusChanged {
        application_id: String,
        posting_title: String,
        new_status: ApplicationStatus,
    },
    #[serde(rename_all = "snake_case")]
    EmailRequested {
        to: String,
        subject: String,
        body: String,
    },
}

impl FanoutTask {
    /// Returns the metrics label associated with the task.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PostingPublished { .. } => "posting.published",
            Self::StatusChanged { .. } => "status.changed",
            Self::EmailRequested { .. } => "email.requested",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_canonical_strings() {
        for status in [
            ApplicationStatus::Applied,
            ApplicationStatus::UnderReview,
            ApplicationStatus::Shortlisted,
            ApplicationStatus::Rejected,
            ApplicationStatus::Offered,
            ApplicationStatus::Hired,
        ] {
            assert_eq!(status.as_str().parse::<ApplicationStatus>(), Ok(status));
        }
        assert!("REVIEWED".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn status_label_is_human_readable() {
        assert_eq!(ApplicationStatus::UnderReview.label(), "Under review");
        assert_eq!(ApplicationStatus::UnderReview.to_string(), "Under review");
    }

    #[test]
    fn user_role_parses_canonical_strings() {
        for role in [UserRole::JobSeeker, UserRole::Employer] {
            assert_eq!(role.as_str().parse::<UserRole>(), Ok(role));
        }
        assert!("ADMIN".parse::<UserRole>().is_err());
    }

    #[test]
    fn notification_kind_parses_canonical_strings() {
        assert_eq!(
            "JOB_POSTING".parse::<NotificationKind>(),
            Ok(NotificationKind::JobPosting)
        );
        assert!("EMAIL".parse::<NotificationKind>().is_err());
    }

    #[test]
    fn fanout_task_exposes_metric_kind() {
        let task = FanoutTask::StatusChanged {
            application_id: "app-1".to_string(),
            posting_title: "Backend Engineer".to_string(),
            new_status: ApplicationStatus::Rejected,
        };
        assert_eq!(task.kind(), "status.changed");
    }

    #[test]
    fn fanout_task_serializes_with_type_tag() {
        let task = FanoutTask::PostingPublished {
            posting_id: "post-1".to_string(),
            title: "Backend Engineer".to_string(),
            company_id: "co-1".to_string(),
        };
        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["type"], "posting_published");
        assert_eq!(value["posting_id"], "post-1");
    }
}
