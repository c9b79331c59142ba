//! JSON API for the budget approval workflow.
//!
//! Endpoints:
//! - `POST   /api/requests`                          — submit a budget request
//! - `GET    /api/requests`                          — list requests (filters via query)
//! - `GET    /api/requests/{id}`                     — full request detail
//! - `PUT    /api/requests/{id}`                     — edit an open request (owner);
//!   editing a suspended request supplies the info and resumes the level
//! - `DELETE /api/requests/{id}`                     — withdraw a pending request (owner)
//! - `POST   /api/requests/{id}/action`              — apply an approver action
//! - `POST   /api/requests/{id}/resume`              — resume after an info request
//! - `GET    /api/requests/{id}/assignment/{level}`  — who a level resolves to
//! - `GET    /api/requests/{id}/history`             — per-level approval history
//! - `POST   /api/requests/{id}/amendments`          — record a post-approval amendment
//! - `GET    /api/requests/{id}/amendments`          — list amendments
//! - `GET    /api/departments/{code}/workflow`       — a department's approval ladder
//! - `GET    /api/accounts/lookup?username=...`      — account directory lookup
//!
//! The acting account arrives in the `x-account-id` header. Role checks
//! happen in the workflow engine, never here.

use std::collections::BTreeMap;
use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use budgetflow_core::domain::account::Account;
use budgetflow_core::domain::amendment::BudgetAmendment;
use budgetflow_core::domain::entry::BudgetEntry;
use budgetflow_core::domain::policy::PolicyRow;
use budgetflow_core::domain::progress::ApprovalProgress;
use budgetflow_core::domain::request::{
    BudgetDuration, BudgetRequest, RequestId, RequestStatus,
};
use budgetflow_core::errors::WorkflowError;
use budgetflow_core::workflow::{ApprovalAction, ResolvedAssignment, WorkflowOutcome};
use budgetflow_db::repositories::{
    NewAmendment, NewBudgetEntry, NewBudgetRequest, RequestFilter, RequestSort,
    SqlAccountRepository, SqlAmendmentRepository, SqlPolicyRepository, SqlProgressRepository,
    SqlRequestRepository,
};
use budgetflow_db::{ActivityEntry, ApprovalHistoryEntry, DbPool, RepositoryError, WorkflowEngine};

#[derive(Clone)]
pub struct ApiState {
    db_pool: DbPool,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new()
        .route("/api/requests", post(create_request).get(list_requests))
        .route(
            "/api/requests/{id}",
            get(request_detail).put(update_request).delete(delete_request),
        )
        .route("/api/requests/{id}/action", post(apply_action))
        .route("/api/requests/{id}/resume", post(resume_request))
        .route("/api/requests/{id}/assignment/{level}", get(level_assignment))
        .route("/api/requests/{id}/history", get(request_history))
        .route("/api/requests/{id}/amendments", post(create_amendment).get(list_amendments))
        .route("/api/departments/{code}/workflow", get(department_workflow))
        .route("/api/accounts/lookup", get(lookup_account))
        .with_state(ApiState { db_pool })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EntryBody {
    pub gl_code: String,
    pub description: String,
    #[serde(default)]
    pub remarks: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RequestBody {
    pub department_code: String,
    pub campus_code: String,
    pub academic_year: String,
    pub budget_title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fund_account: String,
    #[serde(default)]
    pub fund_name: String,
    pub duration: String,
    pub entries: Vec<EntryBody>,
}

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub action: String,
    #[serde(default)]
    pub comments: String,
    /// Final-level overrides keyed by entry row number.
    pub approved_amounts: Option<BTreeMap<i64, Decimal>>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeBody {
    pub level: i64,
}

#[derive(Debug, Deserialize)]
pub struct AmendmentBody {
    pub amendment_type: String,
    pub title: String,
    pub reason: String,
    pub amended_total: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    /// When true, restrict to requests owned by the calling account.
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Serialize)]
pub struct RequestDetail {
    pub request: BudgetRequest,
    pub entries: Vec<BudgetEntry>,
    pub progress: Vec<ApprovalProgress>,
    pub approval_history: Vec<ApprovalHistoryEntry>,
    pub activity: Vec<ActivityEntry>,
    pub amendments: Vec<BudgetAmendment>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub kind: &'static str,
}

type ErrorResponse = (StatusCode, Json<ApiError>);

fn workflow_error(error: WorkflowError) -> ErrorResponse {
    use WorkflowError::*;
    let status = match &error {
        RequestNotFound { .. } | AccountNotFound { .. } | PolicyNotFound { .. }
        | NoInfoRequestFound { .. } => StatusCode::NOT_FOUND,
        NotAssignedApprover { .. } => StatusCode::FORBIDDEN,
        NotPending { .. } | WorkflowAlreadyComplete | LevelNotPending { .. }
        | AlreadyInitialized { .. } | NoPolicyDefined { .. } | AmendmentNotAllowed { .. } => {
            StatusCode::CONFLICT
        }
        UnknownAction { .. } | UnknownRole { .. } | UnknownStatus { .. }
        | UnknownDuration { .. } => StatusCode::BAD_REQUEST,
        StorageConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(ApiError { error: error.to_string(), kind: error.kind() }))
}

fn repository_error(error: RepositoryError) -> ErrorResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: error.to_string(), kind: "storage" }),
    )
}

fn require_account(headers: &HeaderMap) -> Result<i64, ErrorResponse> {
    headers
        .get("x-account-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ApiError {
                error: "missing or invalid x-account-id header".to_string(),
                kind: "unauthorized",
            }),
        ))
}

fn parse_body(body: RequestBody, account_id: i64) -> Result<NewBudgetRequest, ErrorResponse> {
    let duration = BudgetDuration::from_str(&body.duration).map_err(workflow_error)?;
    if body.entries.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: "a budget request needs at least one entry".to_string(),
                kind: "empty_request",
            }),
        ));
    }
    Ok(NewBudgetRequest {
        account_id,
        department_code: body.department_code,
        campus_code: body.campus_code,
        academic_year: body.academic_year,
        budget_title: body.budget_title,
        description: body.description,
        fund_account: body.fund_account,
        fund_name: body.fund_name,
        duration,
        entries: body
            .entries
            .into_iter()
            .map(|entry| NewBudgetEntry {
                gl_code: entry.gl_code,
                description: entry.description,
                remarks: entry.remarks,
                amount: entry.amount,
            })
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<RequestBody>,
) -> Result<(StatusCode, Json<BudgetRequest>), ErrorResponse> {
    let account_id = require_account(&headers)?;
    let new = parse_body(body, account_id)?;

    let created = SqlRequestRepository::new(state.db_pool.clone())
        .create(new)
        .await
        .map_err(repository_error)?;

    info!(
        event_name = "ingress.request.created",
        correlation_id = %created.request_id.0,
        request_id = %created.request_id.0,
        account_id,
        "budget request submitted"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<BudgetRequest>>, ErrorResponse> {
    let account_id = if params.mine { Some(require_account(&headers)?) } else { None };

    let status = params
        .status
        .as_deref()
        .map(RequestStatus::from_str)
        .transpose()
        .map_err(workflow_error)?;
    let sort = match params.sort.as_deref() {
        None | Some("latest") => RequestSort::Latest,
        Some("oldest") => RequestSort::Oldest,
        Some("amount_high") => RequestSort::AmountHigh,
        Some("amount_low") => RequestSort::AmountLow,
        Some(other) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiError { error: format!("unknown sort `{other}`"), kind: "unknown_sort" }),
            ))
        }
    };

    let requests = SqlRequestRepository::new(state.db_pool.clone())
        .list(&RequestFilter { account_id, status, search: params.search, sort })
        .await
        .map_err(repository_error)?;
    Ok(Json(requests))
}

async fn request_detail(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<RequestDetail>, ErrorResponse> {
    let request_id = RequestId(id);
    let repo = SqlRequestRepository::new(state.db_pool.clone());

    let request = repo
        .find(&request_id)
        .await
        .map_err(repository_error)?
        .ok_or_else(|| {
            workflow_error(WorkflowError::RequestNotFound { request_id: request_id.0.clone() })
        })?;
    let entries = repo.entries(&request_id).await.map_err(repository_error)?;
    let progress = SqlProgressRepository::new(state.db_pool.clone())
        .rows_for_request(&request_id)
        .await
        .map_err(repository_error)?;

    let engine = WorkflowEngine::new(state.db_pool.clone());
    let approval_history =
        engine.approval_history(&request_id).await.map_err(workflow_error)?;
    let activity = engine.activity_for_request(&request_id).await.map_err(workflow_error)?;
    let amendments = SqlAmendmentRepository::new(state.db_pool.clone())
        .list_for_request(&request_id)
        .await
        .map_err(repository_error)?;

    Ok(Json(RequestDetail { request, entries, progress, approval_history, activity, amendments }))
}

async fn update_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RequestBody>,
) -> Result<Json<BudgetRequest>, ErrorResponse> {
    let account_id = require_account(&headers)?;
    let update = parse_body(body, account_id)?;

    let updated = SqlRequestRepository::new(state.db_pool.clone())
        .update_editable(&RequestId(id), account_id, update)
        .await
        .map_err(workflow_error)?;
    Ok(Json(updated))
}

async fn delete_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ErrorResponse> {
    let account_id = require_account(&headers)?;

    SqlRequestRepository::new(state.db_pool.clone())
        .delete_pending(&RequestId(id), account_id)
        .await
        .map_err(workflow_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn apply_action(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ActionBody>,
) -> Result<Json<WorkflowOutcome>, ErrorResponse> {
    let account_id = require_account(&headers)?;
    let action = ApprovalAction::from_str(&body.action).map_err(workflow_error)?;
    let request_id = RequestId(id);

    let outcome = WorkflowEngine::new(state.db_pool.clone())
        .process_approval(
            &request_id,
            account_id,
            action,
            &body.comments,
            body.approved_amounts.as_ref(),
        )
        .await
        .map_err(workflow_error)?;

    info!(
        event_name = "ingress.action.accepted",
        correlation_id = %request_id.0,
        request_id = %request_id.0,
        account_id,
        action = action.as_str(),
        status = outcome.status.as_str(),
        "approval action accepted"
    );
    Ok(Json(outcome))
}

async fn resume_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<ResumeBody>,
) -> Result<StatusCode, ErrorResponse> {
    let request_id = RequestId(id);
    WorkflowEngine::new(state.db_pool.clone())
        .resume_after_info(&request_id, body.level)
        .await
        .map_err(workflow_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn level_assignment(
    State(state): State<ApiState>,
    Path((id, level)): Path<(String, i64)>,
) -> Result<Json<ResolvedAssignment>, ErrorResponse> {
    let assignment = WorkflowEngine::new(state.db_pool.clone())
        .assignment_for_level(&RequestId(id), level)
        .await
        .map_err(workflow_error)?;
    Ok(Json(assignment))
}

async fn request_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ApprovalHistoryEntry>>, ErrorResponse> {
    let history = WorkflowEngine::new(state.db_pool.clone())
        .approval_history(&RequestId(id))
        .await
        .map_err(workflow_error)?;
    Ok(Json(history))
}

async fn create_amendment(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AmendmentBody>,
) -> Result<(StatusCode, Json<BudgetAmendment>), ErrorResponse> {
    let account_id = require_account(&headers)?;

    let amendment = SqlAmendmentRepository::new(state.db_pool.clone())
        .append(
            &RequestId(id),
            NewAmendment {
                amendment_type: body.amendment_type,
                title: body.title,
                reason: body.reason,
                amended_total: body.amended_total,
                created_by: account_id,
            },
        )
        .await
        .map_err(workflow_error)?;
    Ok((StatusCode::CREATED, Json(amendment)))
}

#[derive(Debug, Serialize)]
pub struct DepartmentWorkflow {
    pub department_code: String,
    pub total_levels: i64,
    pub levels: Vec<PolicyRow>,
}

async fn department_workflow(
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> Result<Json<DepartmentWorkflow>, ErrorResponse> {
    let table = SqlPolicyRepository::new(state.db_pool.clone())
        .table_for_department(&code)
        .await
        .map_err(repository_error)?;
    if table.is_empty() {
        return Err(workflow_error(WorkflowError::NoPolicyDefined { department_code: code }));
    }
    Ok(Json(DepartmentWorkflow {
        department_code: code,
        total_levels: table.total_levels(),
        levels: table.rows().to_vec(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    pub username: String,
}

async fn lookup_account(
    State(state): State<ApiState>,
    Query(params): Query<LookupParams>,
) -> Result<Json<Account>, ErrorResponse> {
    let account = SqlAccountRepository::new(state.db_pool.clone())
        .find_by_username(&params.username)
        .await
        .map_err(repository_error)?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: format!("no account for username `{}`", params.username),
                kind: "account_not_found",
            }),
        ))?;
    Ok(Json(account))
}

async fn list_amendments(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BudgetAmendment>>, ErrorResponse> {
    let amendments = SqlAmendmentRepository::new(state.db_pool.clone())
        .list_for_request(&RequestId(id))
        .await
        .map_err(repository_error)?;
    Ok(Json(amendments))
}
