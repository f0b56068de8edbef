use crate::category_guard::CategoryGuard;
use crate::config::ApiConfig;
use crate::error::{CatalogError, ValidationError};
use crate::lifecycle::{
    MediaChanges, NewProject, ProjectChanges, ProjectFields, ProjectLifecycle, ProjectView,
};
use crate::metadata_store::{Category, MetadataStore, ProjectQuery, Review, ReviewStats};
use crate::review_intake::{ReviewIntake, ReviewReceipt};
use crate::validation::MediaUpload;
use anyhow::{Context, Result};
use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Header an upstream authenticator sets for signed-in administrators
pub const ADMIN_USER_HEADER: &str = "x-authenticated-user";

const MAX_PAGE_SIZE: i64 = 200;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<ProjectLifecycle>,
    pub categories: Arc<CategoryGuard>,
    pub reviews: Arc<ReviewIntake>,
    pub metadata_store: Arc<dyn MetadataStore>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: "BAD_REQUEST".to_string(),
        }),
    )
}

fn catalog_error(err: CatalogError) -> ApiError {
    let status = match err {
        CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
        CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
        CatalogError::Conflict(_) => StatusCode::CONFLICT,
        CatalogError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CatalogError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(error = %err, "Catalog operation failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.code().to_string(),
        }),
    )
}

/// Identity of the administrator making the request
#[derive(Debug, Clone)]
pub struct AdminUser(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(ADMIN_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match user {
            Some(user) => Ok(AdminUser(user.to_string())),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Sign in as an administrator to continue.".to_string(),
                    code: "UNAUTHORIZED".to_string(),
                }),
            )
                .into_response()),
        }
    }
}

/// Query parameters for project browsing
#[derive(Debug, Deserialize)]
pub struct ProjectListQuery {
    pub category_id: Option<Uuid>,
    pub year: Option<i32>,
    pub search: Option<String>,
    #[serde(default)]
    pub video_only: bool,
    /// Maximum results
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset for pagination
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Project list response
#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectView>,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubmitReviewRequest {
    pub stars: i32,
    pub reason: Option<String>,
    /// Token from an earlier submission, if the visitor kept one
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig, max_request_bytes: usize) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let admin = Router::new()
        .route("/projects", post(create_project))
        .route("/projects/:project_id", put(update_project).delete(delete_project))
        .route("/categories", post(create_category))
        .route("/categories/:category_id", put(rename_category).delete(delete_category))
        .route("/reviews", get(list_reviews))
        .route("/reviews/stats", get(review_stats))
        .route("/reviews/:review_id", axum::routing::delete(delete_review))
        .layer(DefaultBodyLimit::max(max_request_bytes));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/projects", get(list_projects))
        .route("/api/v1/projects/:project_id", get(get_project))
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/reviews", post(submit_review))
        .route("/api/v1/reviews/:token", get(lookup_review))
        .nest("/api/v1/admin", admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "catalog-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.metadata_store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// List projects with filtering
#[instrument(skip(state))]
async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<ProjectListQuery>,
) -> Result<Json<ProjectListResponse>, ApiError> {
    let limit = params.limit.clamp(1, MAX_PAGE_SIZE);
    let query = ProjectQuery {
        category_id: params.category_id,
        year: params.year,
        search: params
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        with_video_only: params.video_only,
        limit: Some(limit + 1), // Fetch one extra to check has_more
        offset: Some(params.offset.max(0)),
    };

    let mut projects = state.lifecycle.list(&query).await.map_err(catalog_error)?;

    let has_more = projects.len() > limit as usize;
    if has_more {
        projects.pop();
    }

    Ok(Json(ProjectListResponse { projects, has_more }))
}

#[instrument(skip(state))]
async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectView>, ApiError> {
    let project = state.lifecycle.get(project_id).await.map_err(catalog_error)?;
    Ok(Json(project))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = state.categories.list().await.map_err(catalog_error)?;
    Ok(Json(categories))
}

#[instrument(skip(state, request), fields(stars = request.stars))]
async fn submit_review(
    State(state): State<AppState>,
    Json(request): Json<SubmitReviewRequest>,
) -> Result<(StatusCode, Json<ReviewReceipt>), ApiError> {
    let receipt = state
        .reviews
        .submit(request.stars, request.reason.as_deref(), request.token.as_deref())
        .await
        .map_err(catalog_error)?;

    let status = if receipt.already_submitted {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(receipt)))
}

async fn lookup_review(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Review>, ApiError> {
    match state.reviews.lookup(&token).await.map_err(catalog_error)? {
        Some(review) => Ok(Json(review)),
        None => Err(catalog_error(CatalogError::not_found("review", "token"))),
    }
}

/// Multipart project form as sent by the admin UI
#[derive(Debug, Default)]
struct ProjectForm {
    id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    year: Option<String>,
    creators: Option<String>,
    link: Option<String>,
    category_id: Option<String>,
    cover: Option<MediaUpload>,
    video: Option<MediaUpload>,
    remove_cover: bool,
    remove_video: bool,
}

impl ProjectForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = ProjectForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| bad_request(format!("Malformed form data: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "cover" | "video" => {
                    let filename = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(format!("Failed to read {name}: {e}")))?;
                    let upload = MediaUpload {
                        bytes: bytes.to_vec(),
                        content_type,
                        filename,
                    };
                    if name == "cover" {
                        form.cover = Some(upload);
                    } else {
                        form.video = Some(upload);
                    }
                }
                _ => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("Failed to read {name}: {e}")))?;
                    match name.as_str() {
                        "id" => form.id = Some(value),
                        "title" => form.title = Some(value),
                        "description" => form.description = Some(value),
                        "year" => form.year = Some(value),
                        "creators" => form.creators = Some(value),
                        "link" => form.link = Some(value),
                        "categoryId" => form.category_id = Some(value),
                        "removeCover" => form.remove_cover = value == "true",
                        "removeVideo" => form.remove_video = value == "true",
                        other => warn!(form_field = %other, "Ignoring unknown form field"),
                    }
                }
            }
        }

        Ok(form)
    }
}

fn parse_year(raw: &str) -> Result<i32, ApiError> {
    raw.trim().parse().map_err(|_| {
        catalog_error(ValidationError::MalformedYear(raw.to_string()).into())
    })
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| bad_request(format!("Invalid {field} \"{raw}\"")))
}

fn required(field: &str, value: Option<String>) -> Result<String, ApiError> {
    value.ok_or_else(|| bad_request(format!("Missing field {field}")))
}

#[instrument(skip(state, multipart), fields(admin = %admin.0))]
async fn create_project(
    State(state): State<AppState>,
    admin: AdminUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ProjectView>), ApiError> {
    let form = ProjectForm::read(multipart).await?;

    let id = form
        .id
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse_uuid("id", v))
        .transpose()?;
    let year = parse_year(&required("year", form.year)?)?;
    let category_id = parse_uuid("categoryId", &required("categoryId", form.category_id)?)?;

    let new = NewProject {
        id,
        fields: ProjectFields {
            title: required("title", form.title)?,
            description: form.description.unwrap_or_default(),
            year,
            creators: required("creators", form.creators)?,
            external_link: form.link,
            category_id,
        },
        cover: form.cover.unwrap_or_default(),
        video: form.video,
    };

    let project = state.lifecycle.create(new).await.map_err(catalog_error)?;
    info!(project_id = %project.id, "Project created via API");

    Ok((StatusCode::CREATED, Json(project)))
}

#[instrument(skip(state, multipart), fields(admin = %admin.0))]
async fn update_project(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(project_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ProjectView>, ApiError> {
    let form = ProjectForm::read(multipart).await?;

    let changes = ProjectChanges {
        title: form.title,
        description: form.description,
        year: form.year.as_deref().map(parse_year).transpose()?,
        creators: form.creators,
        external_link: form.link.map(Some),
        category_id: form
            .category_id
            .as_deref()
            .map(|v| parse_uuid("categoryId", v))
            .transpose()?,
    };
    let media = MediaChanges {
        cover: form.cover,
        video: form.video,
        remove_cover: form.remove_cover,
        remove_video: form.remove_video,
    };

    let project = state
        .lifecycle
        .update(project_id, changes, media)
        .await
        .map_err(catalog_error)?;

    Ok(Json(project))
}

#[instrument(skip(state), fields(admin = %admin.0))]
async fn delete_project(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.lifecycle.delete(project_id).await.map_err(catalog_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, request), fields(admin = %admin.0))]
async fn create_category(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(request): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state
        .categories
        .create(&request.name)
        .await
        .map_err(catalog_error)?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[instrument(skip(state, request), fields(admin = %admin.0))]
async fn rename_category(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(category_id): Path<Uuid>,
    Json(request): Json<CategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let category = state
        .categories
        .rename(category_id, &request.name)
        .await
        .map_err(catalog_error)?;
    Ok(Json(category))
}

#[instrument(skip(state), fields(admin = %admin.0))]
async fn delete_category(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(category_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .categories
        .delete(category_id)
        .await
        .map_err(catalog_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_reviews(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Review>>, ApiError> {
    let reviews = state.reviews.list().await.map_err(catalog_error)?;
    Ok(Json(reviews))
}

async fn review_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ReviewStats>, ApiError> {
    let stats = state.reviews.stats().await.map_err(catalog_error)?;
    Ok(Json(stats))
}

#[instrument(skip(state), fields(admin = %admin.0))]
async fn delete_review(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(review_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.reviews.delete(review_id).await.map_err(catalog_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start the catalog API server
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    max_request_bytes: usize,
) -> Result<()> {
    let router = create_router(state, config, max_request_bytes);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting catalog API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
