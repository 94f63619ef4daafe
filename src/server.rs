//! HTTP API over the analysis, bulk, subscription and group operations.
//! Long-running operations stream server-sent events (`data: <json>\n\n`).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::analyzer;
use crate::bulk;
use crate::client::GmailClient;
use crate::config::Config;
use crate::error::{GmailError, Result};
use crate::groups::{GroupMember, GroupUpdate, NewsletterStore};
use crate::models::SenderRef;
use crate::subscribe;
use crate::unsubscribe;

/// Shared state of the API handlers
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn GmailClient>,
    pub http: reqwest::Client,
    pub store: Arc<NewsletterStore>,
    pub config: Arc<Config>,
    /// Account the server acts for
    pub user_email: String,
}

/// Error returned by handlers, rendered as `{success: false, error}`
#[derive(Debug)]
pub struct AppError(GmailError);

impl From<GmailError> for AppError {
    fn from(error: GmailError) -> Self {
        AppError(error)
    }
}

impl AppError {
    fn bad_request(msg: &str) -> Self {
        AppError(GmailError::BadRequest(msg.to_string()))
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            GmailError::BadRequest(_) | GmailError::ConfigError(_) => StatusCode::BAD_REQUEST,
            GmailError::NotFound(_) => StatusCode::NOT_FOUND,
            GmailError::Conflict(_) => StatusCode::CONFLICT,
            GmailError::AuthError(_) => StatusCode::UNAUTHORIZED,
            GmailError::Forbidden(_) => StatusCode::FORBIDDEN,
            GmailError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        let message = match &self.0 {
            GmailError::BadRequest(m) | GmailError::NotFound(m) | GmailError::Conflict(m) => m.clone(),
            other => other.to_string(),
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SenderRequest {
    pub sender_email: String,
    pub sender: String,
    pub total_emails: usize,
    pub user_email: Option<String>,
}

impl SenderRequest {
    fn require_sender(&self) -> ApiResult<&str> {
        let email = self.sender_email.trim();
        if email.is_empty() {
            return Err(AppError::bad_request("Sender email is required"));
        }
        Ok(email)
    }

    fn display_name(&self) -> &str {
        if self.sender.is_empty() {
            &self.sender_email
        } else {
            &self.sender
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkRequest {
    pub subscriptions: Vec<SenderRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SenderQuery {
    pub sender_email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupQuery {
    pub user_email: Option<String>,
    pub group_id: Option<String>,
    pub sender_email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateGroupRequest {
    pub user_email: Option<String>,
    pub group_name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub newsletters: Vec<GroupMember>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateGroupRequest {
    pub user_email: Option<String>,
    pub group_id: String,
    #[serde(flatten)]
    pub update: GroupUpdate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewsletterRequest {
    pub user_email: Option<String>,
    pub group_id: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    success: bool,
    total: usize,
    #[serde(rename = "senderEmail")]
    sender_email: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze-emails", post(analyze_emails))
        .route("/api/email-count", post(email_count))
        .route("/api/mark-spam", post(mark_spam))
        .route("/api/unmark-spam", get(spam_count).post(unmark_spam))
        .route("/api/mark-all-spam", post(mark_all_spam))
        .route("/api/unmark-all-spam", post(unmark_all_spam))
        .route("/api/unsubscribe", post(unsubscribe_sender))
        .route("/api/subscribe", post(subscribe_sender))
        .route(
            "/api/groups",
            get(read_groups)
                .post(create_group)
                .put(update_group)
                .delete(delete_group),
        )
        .route(
            "/api/groups/newsletters",
            post(add_newsletter).delete(remove_newsletter),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Newsletter API listening on http://{}", addr);

    serve_until(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutting down newsletter API");
    })
    .await
}

/// Serve on an already bound listener, draining in-flight requests once `shutdown` resolves
pub async fn serve_until<F>(listener: tokio::net::TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GmailError::Unknown(format!("Server error: {}", e)))
}

fn sse<S, T>(events: S) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize,
{
    Sse::new(events.map(|event| Event::default().json_data(event)))
}

fn account<'a>(state: &'a AppState, requested: Option<&'a str>) -> &'a str {
    requested
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or(&state.user_email)
}

async fn analyze_emails(State(state): State<AppState>) -> impl IntoResponse {
    sse(analyzer::analyze(state.client.clone(), state.config.analysis.clone()))
}

async fn email_count(
    State(state): State<AppState>,
    Json(req): Json<SenderRequest>,
) -> ApiResult<Json<CountResponse>> {
    let sender = req.require_sender()?;
    let total = bulk::email_count(state.client.as_ref(), &state.config.bulk, sender).await?;

    Ok(Json(CountResponse {
        success: true,
        total,
        sender_email: sender.to_string(),
    }))
}

async fn mark_spam(State(state): State<AppState>, Json(req): Json<SenderRequest>) -> ApiResult<impl IntoResponse> {
    let sender = req.require_sender()?;
    let report = bulk::mark_spam(
        state.client.as_ref(),
        &state.config.bulk,
        sender,
        req.display_name(),
        req.total_emails,
    )
    .await?;
    Ok(Json(report))
}

async fn spam_count(State(state): State<AppState>, Query(query): Query<SenderQuery>) -> ApiResult<impl IntoResponse> {
    let sender = query.sender_email.trim();
    if sender.is_empty() {
        return Err(AppError::bad_request("Sender email is required"));
    }

    let count = bulk::spam_count(state.client.as_ref(), sender).await?;
    let message = if count > 0 {
        format!("Found {} spam messages from this sender", count)
    } else {
        "No spam messages from this sender".to_string()
    };

    Ok(Json(json!({
        "success": true,
        "senderEmail": sender,
        "spamCount": count,
        "message": message,
    })))
}

async fn unmark_spam(State(state): State<AppState>, Json(req): Json<SenderRequest>) -> ApiResult<impl IntoResponse> {
    let sender = req.require_sender()?;
    let report = bulk::unmark_spam(state.client.as_ref(), &state.config.bulk, sender, req.display_name()).await?;
    Ok(Json(report))
}

async fn mark_all_spam(State(state): State<AppState>, Json(req): Json<BulkRequest>) -> impl IntoResponse {
    sse(bulk::mark_all_spam(
        state.client.clone(),
        state.config.bulk.clone(),
        req.subscriptions,
    ))
}

async fn unmark_all_spam(State(state): State<AppState>, Json(req): Json<BulkRequest>) -> impl IntoResponse {
    sse(bulk::unmark_all_spam(
        state.client.clone(),
        state.config.bulk.clone(),
        req.subscriptions,
    ))
}

async fn unsubscribe_sender(
    State(state): State<AppState>,
    Json(req): Json<SenderRequest>,
) -> ApiResult<impl IntoResponse> {
    let sender = req.require_sender()?;
    let user_email = account(&state, req.user_email.as_deref());
    let report =
        unsubscribe::unsubscribe(state.client.as_ref(), &state.http, &state.config.http, sender, user_email).await?;
    Ok(Json(report))
}

async fn subscribe_sender(
    State(state): State<AppState>,
    Json(req): Json<SenderRequest>,
) -> ApiResult<impl IntoResponse> {
    let sender = req.require_sender()?;
    let user_email = account(&state, req.user_email.as_deref());
    let report = subscribe::subscribe(
        state.client.as_ref(),
        &state.http,
        &state.store,
        sender,
        &req.sender,
        user_email,
    )
    .await?;
    Ok(Json(report))
}

async fn read_groups(State(state): State<AppState>, Query(query): Query<GroupQuery>) -> ApiResult<impl IntoResponse> {
    let user_email = account(&state, query.user_email.as_deref());

    match query.group_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => {
            let group = state.store.get_group(user_email, id)?;
            Ok(Json(json!({ "success": true, "group": group })))
        }
        None => {
            let groups = state.store.list_groups(user_email)?;
            Ok(Json(json!({ "success": true, "total": groups.len(), "groups": groups })))
        }
    }
}

async fn create_group(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_email = account(&state, req.user_email.as_deref());
    let (group, added) = state.store.create_group(
        user_email,
        &req.group_name,
        req.description.as_deref(),
        req.color.as_deref(),
        &req.newsletters,
    )?;

    Ok(Json(json!({
        "success": true,
        "message": "Group created",
        "group": group,
        "newslettersAdded": added,
    })))
}

async fn update_group(
    State(state): State<AppState>,
    Json(req): Json<UpdateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.group_id.is_empty() {
        return Err(AppError::bad_request("Group id is required"));
    }
    let user_email = account(&state, req.user_email.as_deref());
    let group = state.store.update_group(user_email, &req.group_id, &req.update)?;

    Ok(Json(json!({ "success": true, "message": "Group updated", "group": group })))
}

/// Group id from the query string or, failing that, the JSON body
async fn delete_group(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
    body: Option<Json<GroupQuery>>,
) -> ApiResult<impl IntoResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let group_id = query
        .group_id
        .or(body.group_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("Group id is required"))?;
    let requested = query.user_email.or(body.user_email);
    let user_email = account(&state, requested.as_deref());

    let deleted = state.store.delete_group(user_email, &group_id)?;
    Ok(Json(json!({ "success": true, "message": "Group deleted", "deletedGroup": deleted })))
}

async fn add_newsletter(
    State(state): State<AppState>,
    Json(req): Json<NewsletterRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.group_id.is_empty() || req.sender_email.trim().is_empty() {
        return Err(AppError::bad_request("Group id and sender email are required"));
    }

    let user_email = account(&state, req.user_email.as_deref());
    let id = state.store.add_newsletter(
        user_email,
        &req.group_id,
        req.sender_email.trim(),
        req.sender_name.as_deref(),
    )?;
    Ok((
        StatusCode::OK,
        Json(json!({ "success": true, "message": "Newsletter added to group", "id": id })),
    ))
}

async fn remove_newsletter(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
    body: Option<Json<NewsletterRequest>>,
) -> ApiResult<impl IntoResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let group_id = query.group_id.unwrap_or(body.group_id);
    let sender_email = query.sender_email.unwrap_or(body.sender_email);
    if group_id.is_empty() || sender_email.trim().is_empty() {
        return Err(AppError::bad_request("Group id and sender email are required"));
    }

    let requested = query.user_email.or(body.user_email);
    let user_email = account(&state, requested.as_deref());
    let removed = state.store.remove_newsletter(user_email, &group_id, sender_email.trim())?;
    Ok(Json(json!({
        "success": true,
        "message": "Newsletter removed from group",
        "removed": removed,
    })))
}
