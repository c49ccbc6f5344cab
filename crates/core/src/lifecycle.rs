use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{ApplicationStatus, ResumeUpload};

/// Maximum accepted resume size.
pub const MAX_RESUME_BYTES: u64 = 5 * 1024 * 1024;

const ALLOWED_RESUME_EXTENSIONS: [&str; 2] = ["pdf", "docx"];

/// A lifecycle rule rejected the requested operation.
///
/// Every variant maps onto exactly one kind of the error taxonomy so callers
/// can distinguish "not yours" from "bad attachment" without string matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("job seekers may not apply to their own company's posting")]
    SelfApplication,
    #[error("resume must be a .pdf or .docx file")]
    AttachmentType,
    #[error("resume exceeds the 5 MiB size limit")]
    AttachmentTooLarge,
    #[error("only the employer owning the posting may change application status")]
    NotPostingOwner,
    #[error("application status is employer-exclusive and cannot be edited here")]
    StatusEditNotAllowed,
    #[error("only the owning job seeker may modify this application")]
    NotApplicationOwner,
    #[error("salary_min must not exceed salary_max")]
    SalaryRangeInverted,
    #[error("deadline must lie in the future")]
    DeadlinePassed,
    #[error("company profile has not been verified")]
    CompanyInactive,
}

/// Entry state for a freshly submitted application.
pub const fn initial_status() -> ApplicationStatus {
    ApplicationStatus::UnderReview
}

/// Validates the attachment metadata for a submission or content edit.
pub fn validate_resume(upload: &ResumeUpload) -> Result<(), RuleViolation> {
    let extension = upload
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if ALLOWED_RESUME_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => return Err(RuleViolation::AttachmentType),
    }

    if upload.size_bytes > MAX_RESUME_BYTES {
        return Err(RuleViolation::AttachmentTooLarge);
    }

    Ok(())
}

/// Checks a submission before anything is persisted and yields the entry
/// status. Rejects seekers applying to a posting owned by their own account.
pub fn validate_submission(
    seeker_user_id: &str,
    posting_owner_user_id: &str,
    resume: &ResumeUpload,
) -> Result<ApplicationStatus, RuleViolation> {
    if seeker_user_id == posting_owner_user_id {
        return Err(RuleViolation::SelfApplication);
    }
    validate_resume(resume)?;
    Ok(initial_status())
}

/// Only the employer owning the posting may move the status. Any state may
/// transition to any other state; terminal states are not distinguished.
pub fn authorize_status_change(
    posting_owner_user_id: &str,
    acting_user_id: &str,
) -> Result<(), RuleViolation> {
    if posting_owner_user_id != acting_user_id {
        return Err(RuleViolation::NotPostingOwner);
    }
    Ok(())
}

/// Content edits belong to the owning job seeker; the status field never does.
pub fn authorize_content_edit(
    application_owner_user_id: &str,
    acting_user_id: &str,
    edits_status: bool,
) -> Result<(), RuleViolation> {
    if application_owner_user_id != acting_user_id {
        return Err(RuleViolation::NotApplicationOwner);
    }
    if edits_status {
        return Err(RuleViolation::StatusEditNotAllowed);
    }
    Ok(())
}

/// Withdrawal is reserved for the owning job seeker.
pub fn authorize_withdraw(
    application_owner_user_id: &str,
    acting_user_id: &str,
) -> Result<(), RuleViolation> {
    if application_owner_user_id != acting_user_id {
        return Err(RuleViolation::NotApplicationOwner);
    }
    Ok(())
}

/// Validates a posting draft before it is published.
pub fn validate_posting_draft(
    company_active: bool,
    salary_min: i64,
    salary_max: i64,
    deadline: NaiveDate,
    today: NaiveDate,
) -> Result<(), RuleViolation> {
    if !company_active {
        return Err(RuleViolation::CompanyInactive);
    }
    if salary_min > salary_max {
        return Err(RuleViolation::SalaryRangeInverted);
    }
    if deadline <= today {
        return Err(RuleViolation::DeadlinePassed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resume(filename: &str, size_bytes: u64) -> ResumeUpload {
        ResumeUpload {
            filename: filename.to_string(),
            size_bytes,
        }
    }

    #[test]
    fn accepts_pdf_and_docx_resumes() {
        assert!(validate_resume(&resume("cv.pdf", 2 * 1024 * 1024)).is_ok());
        assert!(validate_resume(&resume("cv.docx", 100)).is_ok());
        assert!(validate_resume(&resume("CV.PDF", 100)).is_ok());
    }

    #[test]
    fn rejects_wrong_extension() {
        assert_eq!(
            validate_resume(&resume("cv.exe", 100)),
            Err(RuleViolation::AttachmentType)
        );
        assert_eq!(
            validate_resume(&resume("resume", 100)),
            Err(RuleViolation::AttachmentType)
        );
    }

    #[test]
    fn rejects_oversized_resume() {
        assert_eq!(
            validate_resume(&resume("cv.pdf", MAX_RESUME_BYTES + 1)),
            Err(RuleViolation::AttachmentTooLarge)
        );
        assert!(validate_resume(&resume("cv.pdf", MAX_RESUME_BYTES)).is_ok());
    }

    #[test]
    fn submission_rejects_self_application() {
        let err = validate_submission("user-1", "user-1", &resume("cv.pdf", 100)).unwrap_err();
        assert_eq!(err, RuleViolation::SelfApplication);
    }

    #[test]
    fn submission_yields_under_review() {
        let status = validate_submission("user-1", "user-2", &resume("cv.pdf", 100))
            .expect("submission valid");
        assert_eq!(status, ApplicationStatus::UnderReview);
    }

    #[test]
    fn status_change_restricted_to_posting_owner() {
        assert!(authorize_status_change("owner", "owner").is_ok());
        assert_eq!(
            authorize_status_change("owner", "intruder"),
            Err(RuleViolation::NotPostingOwner)
        );
    }

    #[test]
    fn content_edit_rejects_status_field() {
        assert!(authorize_content_edit("seeker", "seeker", false).is_ok());
        assert_eq!(
            authorize_content_edit("seeker", "seeker", true),
            Err(RuleViolation::StatusEditNotAllowed)
        );
        assert_eq!(
            authorize_content_edit("seeker", "other", false),
            Err(RuleViolation::NotApplicationOwner)
        );
    }

    #[test]
    fn withdraw_restricted_to_owner() {
        assert!(authorize_withdraw("seeker", "seeker").is_ok());
        assert_eq!(
            authorize_withdraw("seeker", "other"),
            Err(RuleViolation::NotApplicationOwner)
        );
    }

    #[test]
    fn posting_draft_validation() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).expect("date");
        let future = NaiveDate::from_ymd_opt(2024, 7, 1).expect("date");

        assert!(validate_posting_draft(true, 1000, 2000, future, today).is_ok());
        assert_eq!(
            validate_posting_draft(false, 1000, 2000, future, today),
            Err(RuleViolation::CompanyInactive)
        );
        assert_eq!(
            validate_posting_draft(true, 3000, 2000, future, today),
            Err(RuleViolation::SalaryRangeInverted)
        );
        assert_eq!(
            validate_posting_draft(true, 1000, 2000, today, today),
            Err(RuleViolation::DeadlinePassed)
        );
    }
}
