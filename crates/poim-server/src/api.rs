use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header, HeaderMap, Method, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use poim_shared::{GeoFilter, Permission, PointId, UserId};
use poim_store::{Database, RoleChanges};

use crate::accounts::{AccountService, LoginRequest, RegisterRequest};
use crate::auth::{verify_admin_token, Auth};
use crate::config::ServerConfig;
use crate::error::{FieldErrors, ServerError};
use crate::payload::PointDraft;
use crate::points::{Body, PointService, UpdateMode};
use crate::view::{AuthView, PointView, ProfileView, RolesView};

/// Shared handler state.
///
/// The database sits behind an async mutex because `rusqlite::Connection`
/// is not `Sync`. Handlers lock, do their synchronous store work, and drop
/// the guard without awaiting in between.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(86400));

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/points", get(list_points).post(create_point))
        .route(
            "/points/:id",
            get(retrieve_point)
                .put(replace_point)
                .patch(patch_point)
                .delete(delete_point),
        )
        .route("/points/:id/deleted", delete(undelete_point))
        .route("/admin/status", get(admin_status))
        .route("/admin/users/:id/roles", put(admin_set_roles))
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    registration_open: bool,
}

#[derive(Serialize)]
struct AdminStatusResponse {
    name: String,
    users: i64,
    live_points: i64,
    deleted_points: i64,
    uptime_secs: u64,
}

#[derive(Deserialize)]
struct ListParams {
    geo: Option<String>,
}

#[derive(Deserialize)]
struct AdminRolesRequest {
    is_staff: Option<bool>,
    is_superuser: Option<bool>,
    permissions: Option<Vec<String>>,
}

// ─── Extractor glue ───

fn bad_json(rejection: JsonRejection) -> ServerError {
    ServerError::BadRequest(rejection.body_text())
}

/// Any id that cannot name a point names no point.
fn point_id(path: Result<Path<i64>, PathRejection>) -> Result<PointId, ServerError> {
    path.map(|Path(id)| PointId(id))
        .map_err(|_| ServerError::NotFound)
}

fn point_body(body: Result<Json<Value>, JsonRejection>) -> Body {
    let Json(value) = body.map_err(bad_json)?;
    PointDraft::from_json(&value)
}

// ─── Service endpoints ───

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        registration_open: state.config.registration_open,
    })
}

// ─── Accounts ───

async fn register(
    State(state): State<AppState>,
    // A bad token is still a 401 here, even though the caller may be anonymous.
    _auth: Auth,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthView>), ServerError> {
    let Json(req) = body.map_err(bad_json)?;
    let view = AccountService::new(&state.db)
        .register(state.config.registration_open, req)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn login(
    State(state): State<AppState>,
    _auth: Auth,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthView>, ServerError> {
    let Json(req) = body.map_err(bad_json)?;
    let view = AccountService::new(&state.db).login(req).await?;
    Ok(Json(view))
}

async fn logout(State(state): State<AppState>, auth: Auth) -> Result<StatusCode, ServerError> {
    AccountService::new(&state.db).logout(&auth).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(auth: Auth) -> Result<Json<ProfileView>, ServerError> {
    let user = auth.require_user()?;
    Ok(Json(ProfileView::from(user)))
}

// ─── Points ───

async fn list_points(
    State(state): State<AppState>,
    auth: Auth,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<PointView>>, ServerError> {
    let Query(params) = params.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let geo = params
        .geo
        .as_deref()
        .map(str::parse::<GeoFilter>)
        .transpose()?;

    let db = state.db.lock().await;
    let points = PointService::new(&db).list(&auth.principal, geo.as_ref())?;
    Ok(Json(PointView::all(&points, &auth.principal)))
}

async fn create_point(
    State(state): State<AppState>,
    auth: Auth,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<PointView>), ServerError> {
    let draft = point_body(body);
    let db = state.db.lock().await;
    let point = PointService::new(&db).create(&auth.principal, draft)?;
    Ok((StatusCode::CREATED, Json(PointView::new(&point, &auth.principal))))
}

async fn retrieve_point(
    State(state): State<AppState>,
    auth: Auth,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<PointView>, ServerError> {
    let id = point_id(id)?;
    let db = state.db.lock().await;
    let point = PointService::new(&db).retrieve(&auth.principal, id)?;
    Ok(Json(PointView::new(&point, &auth.principal)))
}

async fn replace_point(
    State(state): State<AppState>,
    auth: Auth,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PointView>, ServerError> {
    update_point(state, auth, id, body, UpdateMode::Replace).await
}

async fn patch_point(
    State(state): State<AppState>,
    auth: Auth,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PointView>, ServerError> {
    update_point(state, auth, id, body, UpdateMode::Partial).await
}

async fn update_point(
    state: AppState,
    auth: Auth,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
    mode: UpdateMode,
) -> Result<Json<PointView>, ServerError> {
    let id = point_id(id)?;
    let draft = point_body(body);
    let db = state.db.lock().await;
    let point = PointService::new(&db).update(&auth.principal, id, draft, mode)?;
    Ok(Json(PointView::new(&point, &auth.principal)))
}

async fn delete_point(
    State(state): State<AppState>,
    auth: Auth,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ServerError> {
    let id = point_id(id)?;
    let db = state.db.lock().await;
    PointService::new(&db).delete(&auth.principal, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn undelete_point(
    State(state): State<AppState>,
    auth: Auth,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ServerError> {
    let id = point_id(id)?;
    let db = state.db.lock().await;
    PointService::new(&db).undelete(&auth.principal, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Admin ───

async fn admin_status(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<AdminStatusResponse>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let stats = state.db.lock().await.stats()?;
    Ok(Json(AdminStatusResponse {
        name: state.config.instance_name.clone(),
        users: stats.users,
        live_points: stats.live_points,
        deleted_points: stats.deleted_points,
        uptime_secs: state.started_at.elapsed().as_secs(),
    }))
}

async fn admin_set_roles(
    headers: HeaderMap,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<AdminRolesRequest>, JsonRejection>,
) -> Result<Json<RolesView>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let Path(id) = id.map_err(|_| ServerError::NotFound)?;
    let Json(req) = body.map_err(bad_json)?;

    let permissions = match req.permissions {
        Some(codenames) => Some(parse_permissions(&codenames)?),
        None => None,
    };
    let changes = RoleChanges {
        is_staff: req.is_staff,
        is_superuser: req.is_superuser,
        permissions,
    };

    let user = state.db.lock().await.set_user_roles(UserId(id), &changes)?;

    info!(
        user_id = %user.id,
        is_staff = user.is_staff,
        is_superuser = user.is_superuser,
        "Admin changed user roles"
    );
    Ok(Json(RolesView::from(&user)))
}

fn parse_permissions(codenames: &[String]) -> Result<BTreeSet<Permission>, ServerError> {
    let mut errors = FieldErrors::new();
    let mut permissions = BTreeSet::new();
    for codename in codenames {
        match codename.parse::<Permission>() {
            Ok(perm) => {
                permissions.insert(perm);
            }
            Err(_) => errors.add("permissions", format!("Unknown permission \"{codename}\".")),
        }
    }
    errors.into_result(permissions).map_err(ServerError::from)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
