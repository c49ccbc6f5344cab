//! User-facing message catalogue.
//!
//! A pure mapping from operation to message replaces the string literals the
//! response layer would otherwise scatter across handlers. Notification body
//! builders live here too so every message the system emits has one home.

use crate::types::ApplicationStatus;

/// Operations whose successful outcome carries a human message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SubmitApplication,
    UpdateApplicationStatus,
    EditApplication,
    WithdrawApplication,
    ListNotifications,
    MarkNotificationRead,
    MarkAllNotificationsRead,
    PublishPosting,
    GetPosting,
    SaveJob,
    UnsaveJob,
    ListSavedJobs,
    IssueToken,
    ConsumeToken,
}

/// Returns the success message for an operation.
pub fn success(operation: Operation) -> &'static str {
    match operation {
        Operation::SubmitApplication => "Application submitted successfully.",
        Operation::UpdateApplicationStatus => "Application status updated successfully.",
        Operation::EditApplication => "Application updated successfully.",
        Operation::WithdrawApplication => "Application withdrawn successfully.",
        Operation::ListNotifications => "Notifications retrieved successfully.",
        Operation::MarkNotificationRead => "Notification marked as read.",
        Operation::MarkAllNotificationsRead => "All notifications marked as read.",
        Operation::PublishPosting => "Job posting published successfully.",
        Operation::GetPosting => "Job posting retrieved successfully.",
        Operation::SaveJob => "Job saved successfully.",
        Operation::UnsaveJob => "Saved job removed successfully.",
        Operation::ListSavedJobs => "Saved jobs retrieved successfully.",
        Operation::IssueToken => "Token issued successfully.",
        Operation::ConsumeToken => "Token accepted.",
    }
}

/// Body of the notification announcing a status change to the applicant.
pub fn status_change_notification(posting_title: &str, status: ApplicationStatus) -> String {
    format!(
        "Your application for '{posting_title}' is now: {}.",
        status.label()
    )
}

/// Body of the notification announcing a new vacancy to past applicants.
pub fn new_posting_notification(posting_title: &str, company_name: &str) -> String {
    format!("New vacancy: {posting_title} at {company_name}")
}

/// Body of the account verification email.
pub fn verify_email_body(link: &str) -> String {
    format!("Welcome to the job board. Confirm your email address by following this link: {link}")
}

/// Body of the password reset email.
pub fn password_reset_body(link: &str) -> String {
    format!("To choose a new password, follow this link: {link}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_has_a_message() {
        let operations = [
            Operation::SubmitApplication,
            Operation::UpdateApplicationStatus,
            Operation::EditApplication,
            Operation::WithdrawApplication,
            Operation::ListNotifications,
            Operation::MarkNotificationRead,
            Operation::MarkAllNotificationsRead,
            Operation::PublishPosting,
            Operation::GetPosting,
            Operation::SaveJob,
            Operation::UnsaveJob,
            Operation::ListSavedJobs,
            Operation::IssueToken,
            Operation::ConsumeToken,
        ];
        for operation in operations {
            assert!(!success(operation).is_empty());
        }
    }

    #[test]
    fn status_change_message_names_posting_and_status() {
        let message =
            status_change_notification("Backend Engineer", ApplicationStatus::Shortlisted);
        assert!(message.contains("Backend Engineer"));
        assert!(message.contains("Shortlisted"));
    }

    #[test]
    fn posting_message_names_company() {
        let message = new_posting_notification("Backend Engineer", "Acme");
        assert_eq!(message, "New vacancy: Backend Engineer at Acme");
    }
}
