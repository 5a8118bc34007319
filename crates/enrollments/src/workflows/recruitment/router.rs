use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::Category;
use super::errors::{ErrorKind, WorkflowError};
use super::identity::{bearer_credential, IdentityVerifier};
use super::qualification::QualificationRequest;
use super::questions::NewQuestion;
use super::review::ReviewQuery;
use super::service::RecruitmentService;
use super::submission::SubmissionRequest;

/// Candidate and admin endpoints of the recruitment workflow.
pub fn recruitment_router<V>(service: Arc<RecruitmentService<V>>) -> Router
where
    V: IdentityVerifier + 'static,
{
    Router::new()
        .route("/api/v1/recruitment/login", post(login_handler::<V>))
        .route("/api/v1/recruitment/username", post(username_handler::<V>))
        .route("/api/v1/recruitment/domains", put(selection_handler::<V>))
        .route(
            "/api/v1/recruitment/submissions",
            post(submission_handler::<V>),
        )
        .route(
            "/api/v1/recruitment/dashboard/:round",
            get(dashboard_handler::<V>),
        )
        .route("/api/v1/recruitment/questions", get(questions_handler::<V>))
        .route(
            "/api/v1/admin/qualifications",
            post(qualification_handler::<V>),
        )
        .route("/api/v1/admin/review", get(review_handler::<V>))
        .route("/api/v1/admin/questions", post(add_question_handler::<V>))
        .route("/api/v1/admin/purge", post(purge_handler::<V>))
        .route("/api/v1/admin/reconcile", post(reconcile_handler::<V>))
        .with_state(service)
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Store => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub(crate) fn error_response(error: WorkflowError) -> Response {
    let kind = error.kind();
    let payload = json!({
        "kind": kind.label(),
        "error": error.to_string(),
    });
    (status_for(kind), Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, WorkflowError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

fn credential(headers: &HeaderMap) -> Result<String, WorkflowError> {
    Ok(bearer_credential(headers)?)
}

pub(crate) async fn login_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service.login(&token).await,
        Err(error) => Err(error),
    };
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsernameBody {
    username: String,
}

pub(crate) async fn username_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
    Json(body): Json<UsernameBody>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service.claim_username(&token, &body.username).await,
        Err(error) => Err(error),
    };
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelectionBody {
    selection: BTreeMap<Category, Vec<String>>,
}

pub(crate) async fn selection_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
    Json(body): Json<SelectionBody>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service.select_domains(&token, body.selection).await,
        Err(error) => Err(error),
    };
    respond(StatusCode::OK, result)
}

pub(crate) async fn submission_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
    Json(request): Json<SubmissionRequest>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service.submit(&token, request).await,
        Err(error) => Err(error),
    };
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn dashboard_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
    Path(round): Path<u32>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service.dashboard(&token, round).await,
        Err(error) => Err(error),
    };
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionsQuery {
    domain: String,
    round: u32,
}

pub(crate) async fn questions_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
    Query(query): Query<QuestionsQuery>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service.questions(&token, &query.domain, query.round).await,
        Err(error) => Err(error),
    };
    respond(StatusCode::OK, result)
}

pub(crate) async fn qualification_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
    Json(request): Json<QualificationRequest>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service.qualify(&token, request).await,
        Err(error) => Err(error),
    };
    respond(StatusCode::OK, result)
}

pub(crate) async fn review_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
    Query(query): Query<ReviewQuery>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service.review(&token, query).await,
        Err(error) => Err(error),
    };
    respond(StatusCode::OK, result)
}

pub(crate) async fn add_question_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
    Json(request): Json<NewQuestion>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service
            .add_question(&token, request)
            .await
            .map(|total| json!({ "total": total })),
        Err(error) => Err(error),
    };
    respond(StatusCode::CREATED, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct PurgeBody {
    domain: String,
    email: String,
}

pub(crate) async fn purge_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
    Json(body): Json<PurgeBody>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service
            .purge(&token, &body.domain, &body.email)
            .await
            .map(|()| json!({ "purged": true })),
        Err(error) => Err(error),
    };
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReconcileBody {
    email: String,
}

pub(crate) async fn reconcile_handler<V>(
    State(service): State<Arc<RecruitmentService<V>>>,
    headers: HeaderMap,
    Json(body): Json<ReconcileBody>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let result = match credential(&headers) {
        Ok(token) => service.reconcile(&token, &body.email).await,
        Err(error) => Err(error),
    };
    respond(StatusCode::OK, result)
}
