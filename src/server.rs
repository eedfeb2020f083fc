use crate::access::Principal;
use crate::auth::{AuthGate, AuthService, GateDecision};
use crate::backend::Backend;
use crate::config::PortalConfig;
use crate::errors::{AppError, AppResult};
use crate::facades::content::public_bundle;
use crate::facades::{
    filter_by_category, ClientDirectory, ContractView, ContractViewer, DocumentRepository, IntakeService,
    MetricsFacade, RemovalChallenges, RemovalTicket, SiteContentStore, TimelineFacade,
};
use crate::models::{
    AddPhasePayload, BatchOutcome, Client, CreateClientPayload, Document, DocumentAction, DocumentUploadOptions,
    FileUpload, FinancialMetric, FormSubmission, FormType, IntakeReceipt, LinkDocumentPayload, MetricSeries, ProjectPhase,
    RecordMetricPayload, RemoveOutcome, SiteContentEntry,
};
use crate::pages;
use crate::session::{wait_for_sign_out, SessionContext};
use crate::storage::is_public_bucket;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Path, Query, State};
use axum::http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const SESSION_COOKIE: &str = "portal_session";
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const EXPORT_DISPOSITION: &str = "attachment; filename=\"caro_consulting_content.json\"";

#[derive(Clone)]
pub struct AppState {
    backend: Backend,
    auth: AuthService,
    challenges: Arc<RemovalChallenges>,
    config: Arc<PortalConfig>,
}

impl AppState {
    pub fn new(backend: Backend, config: PortalConfig) -> Self {
        let auth = AuthService::new(backend.shared_db(), Duration::hours(i64::from(config.session_ttl_hours)));
        Self {
            backend,
            auth,
            challenges: Arc::new(RemovalChallenges::default()),
            config: Arc::new(config),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }
}

pub fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) | AppError::InvalidImport(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Policy(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Database(_) | AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(ErrorBody { error: to_client_error(&self) })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// `Json` body whose rejections render as the `{"error": ...}` body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
struct ApiJson<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
struct ApiQuery<T>(T);

/// Runs db, argon2 and filesystem work off the async workers.
async fn blocking<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| AppError::Internal(format!("blocking task failed: {}", error)))?
}

/// The caller's session, resolved from the session cookie or a bearer token.
/// Requests without either get an anonymous session.
pub struct Session(pub SessionContext);

impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = match session_token(&parts.headers) {
            Some(token) => {
                let auth = state.auth.clone();
                blocking(move || auth.resolve(&token)).await?
            }
            None => SessionContext::anonymous(),
        };
        Ok(Session(session))
    }
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub fn router(state: AppState) -> Router {
    let api: Router<AppState> = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(session_info))
        .route("/dashboard/overview", get(dashboard_overview))
        .route("/dashboard/documents", get(dashboard_documents))
        .route("/dashboard/timeline", get(dashboard_timeline))
        .route("/dashboard/contract", get(dashboard_contract))
        .route("/admin/clients", get(list_clients).post(create_client))
        .route("/admin/clients/{id}/avatar", post(upload_avatar))
        .route("/admin/clients/{id}/documents", post(upload_document))
        .route("/admin/clients/{id}/links", post(add_link))
        .route("/admin/clients/{id}/metrics", post(record_metric))
        .route("/admin/clients/{id}/phases", get(list_phases).post(add_phase))
        .route("/admin/phases/{id}", delete(request_phase_removal))
        .route("/admin/phases/{id}/confirm-delete", post(confirm_phase_removal))
        .route("/admin/content/export", get(export_content))
        .route("/admin/content/import", post(import_content))
        .route("/admin/content/{key}", get(get_content).put(put_content))
        .route("/admin/forms", get(list_forms))
        .route("/forms", post(submit_form));

    Router::new()
        .route("/", get(home_page))
        .route("/agendar", get(schedule_page))
        .route("/legal/terminos", get(|| async { Html(pages::terms()) }))
        .route("/legal/privacidad", get(|| async { Html(pages::privacy()) }))
        .route("/formularios", get(|| async { Html(pages::intake_forms()) }))
        .route("/login", get(|| async { Html(pages::login()) }))
        .route("/dashboard", get(dashboard_page))
        .route("/admin", get(admin_page))
        .route("/robots.txt", get(robots))
        .route("/sitemap.xml", get(sitemap))
        .route("/storage/public/{bucket}/{*path}", get(public_object))
        .route("/storage/signed/{token}", get(signed_object))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "portal listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown requested");
}

// Pages

async fn home_page(State(state): State<AppState>) -> AppResult<Html<String>> {
    let db = state.backend.shared_db();
    let bundle = blocking(move || Ok(public_bundle(&db))).await?;
    Ok(Html(pages::home(&bundle)))
}

async fn schedule_page(State(state): State<AppState>) -> Html<String> {
    Html(pages::schedule(&state.config.calendar_url))
}

async fn dashboard_page(uri: Uri, Session(session): Session) -> Response {
    gated(uri.path(), &session, pages::dashboard_shell)
}

async fn admin_page(uri: Uri, Session(session): Session) -> Response {
    gated(uri.path(), &session, pages::admin_shell)
}

fn gated(path: &str, session: &SessionContext, render: fn() -> String) -> Response {
    match AuthGate::check(path, session) {
        GateDecision::Allow => Html(render()).into_response(),
        GateDecision::Redirect(target) => Redirect::to(target).into_response(),
    }
}

async fn robots(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        pages::robots(&state.config.site_url),
    )
}

async fn sitemap(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/xml")],
        pages::sitemap(&state.config.site_url, Utc::now().date_naive()),
    )
}

// Auth

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    principal: Option<Principal>,
}

#[derive(Debug, Serialize)]
struct SignOutResponse {
    redirect: &'static str,
}

async fn login(State(state): State<AppState>, ApiJson(payload): ApiJson<LoginPayload>) -> AppResult<Response> {
    let auth = state.auth.clone();
    let session = blocking(move || auth.sign_in(&payload.email, &payload.password)).await?;
    let token = session
        .token()
        .ok_or_else(|| AppError::Internal("signed-in session has no token".to_string()))?;
    let max_age = i64::from(state.config.session_ttl_hours) * 3_600;
    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");

    let mut response = Json(SessionInfo {
        signed_in: true,
        principal: session.current_principal(),
    })
    .into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|error| AppError::Internal(error.to_string()))?,
    );
    Ok(response)
}

async fn logout(State(state): State<AppState>, Session(session): Session) -> AppResult<Response> {
    let signed_out = session.subscribe();
    let auth = state.auth.clone();
    blocking(move || auth.sign_out(&session)).await?;
    let redirect = wait_for_sign_out(signed_out).await;

    let mut response = Json(SignOutResponse { redirect }).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_static("portal_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok(response)
}

async fn session_info(Session(session): Session) -> Json<SessionInfo> {
    Json(SessionInfo {
        signed_in: session.is_signed_in(),
        principal: session.current_principal(),
    })
}

// Dashboard

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantQuery {
    client_id: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardOverview {
    client: Client,
    metrics: MetricSeries,
    timeline: Vec<ProjectPhase>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentEntry {
    #[serde(flatten)]
    document: Document,
    action: DocumentAction,
}

fn selected_tenant(backend: &Backend, session: &SessionContext, query: &TenantQuery) -> AppResult<String> {
    ClientDirectory::new(backend.clone(), session.clone()).selection(query.client_id.as_deref())
}

async fn dashboard_overview(
    State(state): State<AppState>,
    Session(session): Session,
    ApiQuery(query): ApiQuery<TenantQuery>,
) -> AppResult<Json<DashboardOverview>> {
    let backend = state.backend.clone();
    let overview = blocking(move || {
        let client_id = selected_tenant(&backend, &session, &query)?;
        let client = ClientDirectory::new(backend.clone(), session.clone()).get(&client_id)?;
        let metrics = MetricsFacade::new(backend.clone(), session.clone()).series(&client_id)?;
        let timeline = TimelineFacade::new(backend, session).list(&client_id)?;
        Ok(DashboardOverview {
            client,
            metrics,
            timeline,
        })
    })
    .await?;
    Ok(Json(overview))
}

async fn dashboard_documents(
    State(state): State<AppState>,
    Session(session): Session,
    ApiQuery(query): ApiQuery<TenantQuery>,
) -> AppResult<Json<Vec<DocumentEntry>>> {
    let backend = state.backend.clone();
    let entries = blocking(move || {
        let client_id = selected_tenant(&backend, &session, &query)?;
        let documents = DocumentRepository::new(backend, session).list_or_empty(&client_id);
        Ok(filter_by_category(&documents, query.category.as_deref())
            .into_iter()
            .map(|document| DocumentEntry {
                action: document.action(),
                document,
            })
            .collect())
    })
    .await?;
    Ok(Json(entries))
}

async fn dashboard_timeline(
    State(state): State<AppState>,
    Session(session): Session,
    ApiQuery(query): ApiQuery<TenantQuery>,
) -> AppResult<Json<Vec<ProjectPhase>>> {
    let backend = state.backend.clone();
    let phases = blocking(move || {
        let client_id = selected_tenant(&backend, &session, &query)?;
        TimelineFacade::new(backend, session).list(&client_id)
    })
    .await?;
    Ok(Json(phases))
}

async fn dashboard_contract(
    State(state): State<AppState>,
    Session(session): Session,
    ApiQuery(query): ApiQuery<TenantQuery>,
) -> AppResult<Json<ContractView>> {
    let backend = state.backend.clone();
    let view = blocking(move || {
        let client_id = selected_tenant(&backend, &session, &query)?;
        ContractViewer::new(backend, session).view(&client_id)
    })
    .await?;
    Ok(Json(view))
}

// Admin

fn require_operator(state: &AppState, session: &SessionContext) -> AppResult<Principal> {
    let principal = session.principal()?;
    state.backend.policy().authorize_operator(&principal, "admin panel")?;
    Ok(principal)
}

async fn list_clients(State(state): State<AppState>, Session(session): Session) -> AppResult<Json<Vec<Client>>> {
    require_operator(&state, &session)?;
    let backend = state.backend.clone();
    Ok(Json(blocking(move || ClientDirectory::new(backend, session).list()).await?))
}

async fn create_client(
    State(state): State<AppState>,
    Session(session): Session,
    ApiJson(payload): ApiJson<CreateClientPayload>,
) -> AppResult<(StatusCode, Json<Client>)> {
    let backend = state.backend.clone();
    let client = blocking(move || ClientDirectory::new(backend, session).create(payload)).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

async fn upload_avatar(
    State(state): State<AppState>,
    Session(session): Session,
    Path(client_id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<Json<Client>> {
    require_operator(&state, &session)?;
    let mut avatar = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.file_name().is_some() {
            avatar = Some(read_upload(field).await?);
            break;
        }
    }
    let avatar = avatar.ok_or_else(|| AppError::Validation("an image file is required".to_string()))?;
    let backend = state.backend.clone();
    let client = blocking(move || ClientDirectory::new(backend, session).set_avatar(&client_id, avatar)).await?;
    Ok(Json(client))
}

async fn upload_document(
    State(state): State<AppState>,
    Session(session): Session,
    Path(client_id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Document>)> {
    require_operator(&state, &session)?;
    let mut file = None;
    let mut options = DocumentUploadOptions::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.file_name().is_some() {
            file = Some(read_upload(field).await?);
            continue;
        }
        let name = field.name().unwrap_or_default().to_string();
        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "category" => options.category = Some(value),
            "description" => options.description = Some(value),
            _ => {}
        }
    }
    let file = file.ok_or_else(|| AppError::Validation("a file is required".to_string()))?;
    let backend = state.backend.clone();
    let document =
        blocking(move || DocumentRepository::new(backend, session).upload(&client_id, file, options)).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn add_link(
    State(state): State<AppState>,
    Session(session): Session,
    Path(client_id): Path<String>,
    ApiJson(payload): ApiJson<LinkDocumentPayload>,
) -> AppResult<(StatusCode, Json<Document>)> {
    require_operator(&state, &session)?;
    let backend = state.backend.clone();
    let document = blocking(move || DocumentRepository::new(backend, session).link(&client_id, payload)).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn record_metric(
    State(state): State<AppState>,
    Session(session): Session,
    Path(client_id): Path<String>,
    ApiJson(payload): ApiJson<RecordMetricPayload>,
) -> AppResult<(StatusCode, Json<FinancialMetric>)> {
    require_operator(&state, &session)?;
    let backend = state.backend.clone();
    let metric = blocking(move || MetricsFacade::new(backend, session).record(&client_id, payload)).await?;
    Ok((StatusCode::CREATED, Json(metric)))
}

async fn list_phases(
    State(state): State<AppState>,
    Session(session): Session,
    Path(client_id): Path<String>,
) -> AppResult<Json<Vec<ProjectPhase>>> {
    require_operator(&state, &session)?;
    let backend = state.backend.clone();
    Ok(Json(
        blocking(move || TimelineFacade::new(backend, session).list(&client_id)).await?,
    ))
}

async fn add_phase(
    State(state): State<AppState>,
    Session(session): Session,
    Path(client_id): Path<String>,
    ApiJson(payload): ApiJson<AddPhasePayload>,
) -> AppResult<(StatusCode, Json<ProjectPhase>)> {
    require_operator(&state, &session)?;
    let backend = state.backend.clone();
    let phase = blocking(move || TimelineFacade::new(backend, session).add(&client_id, payload)).await?;
    Ok((StatusCode::CREATED, Json(phase)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemovalResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<RemoveOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirm: Option<RemovalTicket>,
}

#[derive(Debug, Deserialize)]
struct ConfirmRemovalPayload {
    token: String,
}

/// First step of a phase removal: returns a ticket that the confirming
/// request must echo back.
async fn request_phase_removal(
    State(state): State<AppState>,
    Session(session): Session,
    Path(phase_id): Path<String>,
) -> AppResult<(StatusCode, Json<RemovalResponse>)> {
    let principal = require_operator(&state, &session)?;
    let backend = state.backend.clone();
    let phase = blocking(move || TimelineFacade::new(backend, session).get(&phase_id)).await?;
    match phase {
        None => Ok((
            StatusCode::OK,
            Json(RemovalResponse {
                outcome: Some(RemoveOutcome::AlreadyAbsent),
                confirm: None,
            }),
        )),
        Some(phase) => {
            let ticket = state.challenges.issue(&phase, principal.user_id())?;
            Ok((
                StatusCode::ACCEPTED,
                Json(RemovalResponse {
                    outcome: None,
                    confirm: Some(ticket),
                }),
            ))
        }
    }
}

async fn confirm_phase_removal(
    State(state): State<AppState>,
    Session(session): Session,
    Path(phase_id): Path<String>,
    ApiJson(payload): ApiJson<ConfirmRemovalPayload>,
) -> AppResult<Json<RemovalResponse>> {
    let principal = require_operator(&state, &session)?;
    let backend = state.backend.clone();
    let challenges = Arc::clone(&state.challenges);
    let outcome = blocking(move || {
        let prompt = challenges.prompt(&payload.token, principal.user_id());
        TimelineFacade::new(backend, session).remove(&phase_id, &prompt)
    })
    .await?;
    Ok(Json(RemovalResponse {
        outcome: Some(outcome),
        confirm: None,
    }))
}

async fn get_content(
    State(state): State<AppState>,
    Session(session): Session,
    Path(key): Path<String>,
) -> AppResult<Json<Value>> {
    require_operator(&state, &session)?;
    let backend = state.backend.clone();
    let content = blocking(move || {
        SiteContentStore::new(backend, session)
            .get(&key)?
            .ok_or_else(|| AppError::NotFound(format!("content key {} not found", key)))
    })
    .await?;
    Ok(Json(content))
}

async fn put_content(
    State(state): State<AppState>,
    Session(session): Session,
    Path(key): Path<String>,
    ApiJson(content): ApiJson<Value>,
) -> AppResult<Json<SiteContentEntry>> {
    let backend = state.backend.clone();
    Ok(Json(
        blocking(move || SiteContentStore::new(backend, session).set(&key, content)).await?,
    ))
}

async fn export_content(State(state): State<AppState>, Session(session): Session) -> AppResult<Response> {
    let backend = state.backend.clone();
    let exported = blocking(move || SiteContentStore::new(backend, session).export_all()).await?;
    Ok(([(header::CONTENT_DISPOSITION, EXPORT_DISPOSITION)], Json(exported)).into_response())
}

async fn import_content(
    State(state): State<AppState>,
    Session(session): Session,
    body: String,
) -> AppResult<Json<BatchOutcome>> {
    let backend = state.backend.clone();
    Ok(Json(
        blocking(move || SiteContentStore::new(backend, session).import_all(&body)).await?,
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionEntry {
    #[serde(flatten)]
    submission: FormSubmission,
    attachment_urls: Vec<String>,
}

async fn list_forms(State(state): State<AppState>, Session(session): Session) -> AppResult<Json<Vec<SubmissionEntry>>> {
    let backend = state.backend.clone();
    let entries = blocking(move || {
        let intake = IntakeService::new(backend, session);
        intake
            .recent(100)?
            .into_iter()
            .map(|submission| -> AppResult<SubmissionEntry> {
                let attachment_urls = submission
                    .file_urls
                    .iter()
                    .map(|path| intake.attachment_url(path))
                    .collect::<AppResult<Vec<_>>>()?;
                Ok(SubmissionEntry {
                    submission,
                    attachment_urls,
                })
            })
            .collect::<AppResult<Vec<_>>>()
    })
    .await?;
    Ok(Json(entries))
}

// Intake

async fn submit_form(
    State(state): State<AppState>,
    Session(session): Session,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<IntakeReceipt>)> {
    let mut form_type = None;
    let mut fields = Map::new();
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.file_name().is_some() {
            let upload = read_upload(field).await?;
            // Browsers send an empty part when no file was picked.
            if !upload.name.is_empty() || !upload.bytes.is_empty() {
                files.push(upload);
            }
            continue;
        }
        let name = field.name().unwrap_or_default().to_string();
        let value = field.text().await.map_err(multipart_error)?;
        if name == "formType" {
            form_type = Some(
                FormType::parse(value.trim())
                    .ok_or_else(|| AppError::Validation(format!("unknown form type: {}", value)))?,
            );
        } else if !name.is_empty() {
            fields.insert(name, Value::String(value));
        }
    }

    let form_type = form_type.ok_or_else(|| AppError::Validation("formType is required".to_string()))?;
    let backend = state.backend.clone();
    let receipt = blocking(move || IntakeService::new(backend, session).submit(form_type, fields, files)).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn read_upload(field: Field<'_>) -> AppResult<FileUpload> {
    let name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(ToString::to_string);
    let bytes = field.bytes().await.map_err(multipart_error)?;
    Ok(FileUpload {
        name,
        content_type,
        bytes: bytes.to_vec(),
    })
}

fn multipart_error(error: MultipartError) -> AppError {
    AppError::Validation(format!("malformed multipart body: {}", error))
}

// Objects

async fn public_object(
    State(state): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
) -> AppResult<Response> {
    if !is_public_bucket(&bucket) {
        return Err(AppError::NotFound(format!("bucket {} is not public", bucket)));
    }
    let backend = state.backend.clone();
    let object_path = path.clone();
    let bytes = blocking(move || backend.storage().get(&bucket, &object_path)).await?;
    Ok(object_response(&path, bytes))
}

async fn signed_object(State(state): State<AppState>, Path(token): Path<String>) -> AppResult<Response> {
    let claim = state.backend.signer().verify(&token)?;
    let backend = state.backend.clone();
    let (bucket, path) = (claim.bucket, claim.path.clone());
    let bytes = blocking(move || backend.storage().get(&bucket, &path)).await?;
    Ok(object_response(&claim.path, bytes))
}

fn object_response(path: &str, bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, content_type_for(path))], bytes).into_response()
}

fn content_type_for(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv",
        "json" => "application/json",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => "application/octet-stream",
    }
}
