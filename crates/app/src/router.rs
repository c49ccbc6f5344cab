use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use jobboard_core::messages::{self, Operation};
use jobboard_core::types::{
    ApplicationStatus, EducationLevel, ExperienceLevel, JobApplication, JobPosting, JobType,
    Notification, NotificationKind, ResumeUpload, SavedJob, TokenPurpose,
};
use jobboard_storage::{Database, NotificationFilter, Page};

use crate::applications::{ApplicationError, ApplicationService, EditApplication, SubmitApplication};
use crate::dispatcher::TaskDispatcher;
use crate::notifications::{NotificationError, NotificationService};
use crate::postings::{PostingError, PostingService, PublishPosting};
use crate::problem::{self, kind, ProblemResponse};
use crate::telemetry;
use crate::tokens::{TokenError, TokenService};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    applications: ApplicationService,
    notifications: NotificationService,
    postings: PostingService,
    tokens: TokenService,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        dispatcher: TaskDispatcher,
        public_base_url: String,
    ) -> Self {
        let clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> = Arc::new(Utc::now);
        Self {
            metrics,
            storage: storage.clone(),
            applications: ApplicationService::new(storage.clone(), dispatcher.clone(), clock.clone()),
            notifications: NotificationService::new(storage.clone()),
            postings: PostingService::new(storage.clone(), dispatcher.clone(), clock.clone()),
            tokens: TokenService::new(storage, dispatcher, clock, public_base_url),
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/applications", post(submit_application))
        .route("/applications/:id/status", patch(update_application_status))
        .route(
            "/applications/:id",
            patch(edit_application).delete(withdraw_application),
        )
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_notifications_read))
        .route("/notifications/:id/read", post(mark_notification_read))
        .route("/postings", post(publish_posting))
        .route("/postings/:id", get(get_posting))
        .route("/saved-jobs", post(save_job).get(list_saved_jobs))
        .route("/saved-jobs/:id", delete(unsave_job))
        .route("/tokens", post(issue_token))
        .route("/tokens/consume", post(consume_token))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[derive(Debug, Deserialize)]
struct SubmitApplicationRequest {
    job_posting_id: String,
    job_seeker_id: String,
    #[serde(default)]
    cover_letter: String,
    resume_filename: String,
    resume_size_bytes: u64,
}

#[derive(Debug, Serialize)]
struct ApplicationResponse {
    message: &'static str,
    application: JobApplication,
}

async fn submit_application(
    State(state): State<AppState>,
    Json(request): Json<SubmitApplicationRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let application = state
        .applications
        .submit(SubmitApplication {
            job_posting_id: request.job_posting_id,
            job_seeker_id: request.job_seeker_id,
            cover_letter: request.cover_letter,
            resume: ResumeUpload {
                filename: request.resume_filename,
                size_bytes: request.resume_size_bytes,
            },
        })
        .await
        .map_err(application_problem)?;

    Ok((
        StatusCode::CREATED,
        Json(ApplicationResponse {
            message: messages::success(Operation::SubmitApplication),
            application,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    acting_user_id: String,
    status: ApplicationStatus,
}

async fn update_application_status(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let application = state
        .applications
        .update_status(&application_id, &request.acting_user_id, request.status)
        .await
        .map_err(application_problem)?;

    Ok(Json(ApplicationResponse {
        message: messages::success(Operation::UpdateApplicationStatus),
        application,
    }))
}

#[derive(Debug, Deserialize)]
struct EditApplicationRequest {
    acting_user_id: String,
    #[serde(default)]
    cover_letter: Option<String>,
    #[serde(default)]
    resume_filename: Option<String>,
    #[serde(default)]
    resume_size_bytes: Option<u64>,
    /// Any attempt to carry a status through this endpoint is rejected, so
    /// the raw value is never interpreted.
    #[serde(default)]
    status: Option<serde_json::Value>,
}

async fn edit_application(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
    Json(request): Json<EditApplicationRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let resume = request.resume_filename.map(|filename| ResumeUpload {
        filename,
        size_bytes: request.resume_size_bytes.unwrap_or(0),
    });
    let application = state
        .applications
        .edit_content(EditApplication {
            application_id,
            acting_user_id: request.acting_user_id,
            cover_letter: request.cover_letter,
            resume,
            attempts_status_edit: request.status.is_some(),
        })
        .await
        .map_err(application_problem)?;

    Ok(Json(ApplicationResponse {
        message: messages::success(Operation::EditApplication),
        application,
    }))
}

#[derive(Debug, Deserialize)]
struct ActingUserQuery {
    acting_user_id: String,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn withdraw_application(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
    Query(query): Query<ActingUserQuery>,
) -> Result<impl IntoResponse, ProblemResponse> {
    state
        .applications
        .withdraw(&application_id, &query.acting_user_id)
        .await
        .map_err(application_problem)?;

    Ok(Json(MessageResponse {
        message: messages::success(Operation::WithdrawApplication),
    }))
}

#[derive(Debug, Deserialize)]
struct ListNotificationsQuery {
    user_id: String,
    #[serde(default)]
    kind: Option<NotificationKind>,
    #[serde(default)]
    is_read: Option<bool>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
struct NotificationListResponse {
    message: &'static str,
    notifications: Vec<Notification>,
}

async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let filter = NotificationFilter {
        kind: query.kind,
        is_read: query.is_read,
    };
    let page = Page::clamped(query.page, query.page_size);
    let notifications = state
        .notifications
        .list_for_user(&query.user_id, &filter, page)
        .await
        .map_err(notification_problem)?;

    Ok(Json(NotificationListResponse {
        message: messages::success(Operation::ListNotifications),
        notifications,
    }))
}

#[derive(Debug, Serialize)]
struct NotificationResponse {
    message: &'static str,
    notification: Notification,
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
    Json(request): Json<ActingUserBody>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let notification = state
        .notifications
        .mark_read(&notification_id, &request.acting_user_id)
        .await
        .map_err(notification_problem)?;

    Ok(Json(NotificationResponse {
        message: messages::success(Operation::MarkNotificationRead),
        notification,
    }))
}

#[derive(Debug, Deserialize)]
struct ActingUserBody {
    acting_user_id: String,
}

#[derive(Debug, Deserialize)]
struct MarkAllReadRequest {
    user_id: String,
}

#[derive(Debug, Serialize)]
struct MarkAllReadResponse {
    message: &'static str,
    updated: u64,
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Json(request): Json<MarkAllReadRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let updated = state
        .notifications
        .mark_all_read(&request.user_id)
        .await
        .map_err(notification_problem)?;

    Ok(Json(MarkAllReadResponse {
        message: messages::success(Operation::MarkAllNotificationsRead),
        updated,
    }))
}

#[derive(Debug, Deserialize)]
struct PublishPostingRequest {
    company_id: String,
    title: String,
    description: String,
    #[serde(default)]
    requirements: String,
    #[serde(default)]
    responsibilities: String,
    location: String,
    job_type: JobType,
    experience_level: ExperienceLevel,
    education_required: EducationLevel,
    salary_min: i64,
    salary_max: i64,
    deadline: NaiveDate,
}

#[derive(Debug, Serialize)]
struct PostingResponse {
    message: &'static str,
    posting: JobPosting,
    company_name: Option<String>,
}

async fn publish_posting(
    State(state): State<AppState>,
    Json(request): Json<PublishPostingRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let posting = state
        .postings
        .publish(PublishPosting {
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
            deadline: request.deadline,
        })
        .await
        .map_err(posting_problem)?;

    Ok((
        StatusCode::CREATED,
        Json(PostingResponse {
            message: messages::success(Operation::PublishPosting),
            posting,
            company_name: None,
        }),
    ))
}

async fn get_posting(
    State(state): State<AppState>,
    Path(posting_id): Path<String>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let found = state
        .postings
        .get(&posting_id)
        .await
        .map_err(posting_problem)?;

    Ok(Json(PostingResponse {
        message: messages::success(Operation::GetPosting),
        posting: found.posting,
        company_name: Some(found.company_name),
    }))
}

#[derive(Debug, Deserialize)]
struct SaveJobRequest {
    job_seeker_id: String,
    job_posting_id: String,
}

#[derive(Debug, Serialize)]
struct SavedJobResponse {
    message: &'static str,
    saved_job: SavedJob,
}

async fn save_job(
    State(state): State<AppState>,
    Json(request): Json<SaveJobRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let saved_job = state
        .postings
        .save_job(&request.job_seeker_id, &request.job_posting_id)
        .await
        .map_err(posting_problem)?;

    Ok((
        StatusCode::CREATED,
        Json(SavedJobResponse {
            message: messages::success(Operation::SaveJob),
            saved_job,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ActingSeekerQuery {
    job_seeker_id: String,
}

async fn unsave_job(
    State(state): State<AppState>,
    Path(saved_job_id): Path<String>,
    Query(query): Query<ActingSeekerQuery>,
) -> Result<impl IntoResponse, ProblemResponse> {
    state
        .postings
        .unsave_job(&saved_job_id, &query.job_seeker_id)
        .await
        .map_err(posting_problem)?;

    Ok(Json(MessageResponse {
        message: messages::success(Operation::UnsaveJob),
    }))
}

#[derive(Debug, Deserialize)]
struct ListSavedJobsQuery {
    job_seeker_id: String,
}

#[derive(Debug, Serialize)]
struct SavedJobListResponse {
    message: &'static str,
    saved_jobs: Vec<SavedJob>,
}

async fn list_saved_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListSavedJobsQuery>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let saved_jobs = state
        .postings
        .list_saved(&query.job_seeker_id)
        .await
        .map_err(posting_problem)?;

    Ok(Json(SavedJobListResponse {
        message: messages::success(Operation::ListSavedJobs),
        saved_jobs,
    }))
}

#[derive(Debug, Deserialize)]
struct IssueTokenRequest {
    user_id: String,
    purpose: TokenPurpose,
}

#[derive(Debug, Serialize)]
struct IssuedTokenResponse {
    message: &'static str,
    token: String,
    expires_at: DateTime<Utc>,
}

async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<IssueTokenRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let issued = state
        .tokens
        .issue(&request.user_id, request.purpose)
        .await
        .map_err(token_problem)?;

    Ok((
        StatusCode::CREATED,
        Json(IssuedTokenResponse {
            message: messages::success(Operation::IssueToken),
            token: issued.token,
            expires_at: issued.expires_at,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ConsumeTokenRequest {
    token: String,
}

#[derive(Debug, Serialize)]
struct ConsumedTokenResponse {
    message: &'static str,
    user_id: String,
    purpose: TokenPurpose,
}

async fn consume_token(
    State(state): State<AppState>,
    Json(request): Json<ConsumeTokenRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let consumed = state
        .tokens
        .consume(&request.token)
        .await
        .map_err(token_problem)?;

    Ok(Json(ConsumedTokenResponse {
        message: messages::success(Operation::ConsumeToken),
        user_id: consumed.user_id,
        purpose: consumed.purpose,
    }))
}

fn application_problem(err: ApplicationError) -> ProblemResponse {
    match &err {
        ApplicationError::NotFound(_) => ProblemResponse::not_found(err.to_string()),
        ApplicationError::Duplicate => ProblemResponse::new(
            StatusCode::CONFLICT,
            kind::DUPLICATE_APPLICATION,
            err.to_string(),
        ),
        ApplicationError::Rule(violation) => problem::from_rule_violation(violation),
        ApplicationError::Database(_) => ProblemResponse::internal(err.to_string()),
    }
}

fn notification_problem(err: NotificationError) -> ProblemResponse {
    match &err {
        NotificationError::NotFound => ProblemResponse::not_found(err.to_string()),
        NotificationError::Forbidden => {
            ProblemResponse::new(StatusCode::FORBIDDEN, kind::FORBIDDEN, err.to_string())
        }
        NotificationError::NoNotifications => ProblemResponse::new(
            StatusCode::NOT_FOUND,
            kind::NO_NOTIFICATIONS,
            err.to_string(),
        ),
        NotificationError::Database(_) => ProblemResponse::internal(err.to_string()),
    }
}

fn posting_problem(err: PostingError) -> ProblemResponse {
    match &err {
        PostingError::NotFound(_) => ProblemResponse::not_found(err.to_string()),
        PostingError::AlreadySaved => ProblemResponse::new(
            StatusCode::CONFLICT,
            kind::DUPLICATE_SAVED_JOB,
            err.to_string(),
        ),
        PostingError::Forbidden => {
            ProblemResponse::new(StatusCode::FORBIDDEN, kind::FORBIDDEN, err.to_string())
        }
        PostingError::Rule(violation) => problem::from_rule_violation(violation),
        PostingError::Database(_) => ProblemResponse::internal(err.to_string()),
    }
}

fn token_problem(err: TokenError) -> ProblemResponse {
    match &err {
        TokenError::UserNotFound => ProblemResponse::not_found(err.to_string()),
        TokenError::Invalid => ProblemResponse::new(
            StatusCode::BAD_REQUEST,
            kind::INVALID_TOKEN,
            err.to_string(),
        ),
        TokenError::Expired => {
            ProblemResponse::new(StatusCode::GONE, kind::TOKEN_EXPIRED, err.to_string())
        }
        TokenError::Database(_) => ProblemResponse::internal(err.to_string()),
    }
}
