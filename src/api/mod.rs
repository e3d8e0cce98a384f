//! HTTP API for lists, tasks and accounts.
//!
//! Every procedure takes and returns camelCase JSON. Failures are returned as
//! [`ApiError`] bodies with a matching status code.

mod auth;
mod lists;
mod session;
mod tasks;
mod validate;

pub use session::{CurrentUser, MaybeUser};

use crate::auth::TokenSigner;
use crate::config::{AuthConfig, Config, LimitsConfig};
use crate::db::Database;
use crate::error::{ApiError, ApiResult};
use crate::types::{TaskTree, write_forest_json};
use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Path, Request, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderValue, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// `None` when the service runs without a configured store.
    db: Option<Arc<Database>>,
    signer: TokenSigner,
    auth: Arc<AuthConfig>,
    limits: Arc<LimitsConfig>,
}

impl AppState {
    pub fn new(db: Option<Arc<Database>>, config: &Config, signer: TokenSigner) -> Self {
        Self {
            db,
            signer,
            auth: Arc::new(config.auth.clone()),
            limits: Arc::new(config.limits.clone()),
        }
    }

    /// The store, if one is configured. Read procedures degrade to empty
    /// results when this is `None`.
    pub fn db(&self) -> Option<&Database> {
        self.db.as_deref()
    }

    /// The store for write procedures, which fail without one.
    pub fn store(&self) -> ApiResult<&Database> {
        self.db().ok_or_else(ApiError::store_unavailable)
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }
}

/// JSON body extractor that reports malformed input as an [`ApiError`].
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::invalid_value("body", "Malformed request body")
                .with_details(rejection.body_text())),
        }
    }
}

/// Path parameter extractor that reports malformed ids as an [`ApiError`].
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ApiPath(value)),
            Err(rejection) => Err(ApiError::invalid_value("path", "Malformed path parameter")
                .with_details(rejection.body_text())),
        }
    }
}

/// Pre-encoded JSON body for task trees of any depth.
pub struct TreeJson(Vec<u8>);

impl TreeJson {
    pub fn forest(forest: &[TaskTree]) -> ApiResult<Self> {
        let mut buf = Vec::new();
        write_forest_json(forest, &mut buf).map_err(ApiError::internal)?;
        Ok(Self(buf))
    }

    pub fn tree(tree: &TaskTree) -> ApiResult<Self> {
        let mut buf = Vec::new();
        tree.write_json(&mut buf).map_err(ApiError::internal)?;
        Ok(Self(buf))
    }

    pub fn null() -> Self {
        Self(b"null".to_vec())
    }
}

impl IntoResponse for TreeJson {
    fn into_response(self) -> Response {
        (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            self.0,
        )
            .into_response()
    }
}

/// Body of procedures that only report success.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store: bool,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store: state.db().is_some(),
    })
}

/// Build the router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Auth
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        // Lists
        .route("/api/lists", get(lists::get_all).post(lists::create))
        .route("/api/lists/{list_id}", delete(lists::delete))
        .route("/api/lists/{list_id}/tasks", get(tasks::get_list_tasks))
        // Tasks
        .route("/api/tasks", post(tasks::create))
        .route(
            "/api/tasks/{task_id}",
            get(tasks::get_task)
                .patch(tasks::update)
                .delete(tasks::delete),
        )
        .route("/api/tasks/{task_id}/subtasks", get(tasks::get_subtasks))
        .route("/api/tasks/{task_id}/toggle", post(tasks::toggle_completion))
        .route("/api/tasks/{task_id}/move", post(tasks::move_to_list))
        // Misc
        .route("/api/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle for a running server.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Signal graceful shutdown and wait for in-flight requests to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Server task failed: {}", e);
        }
    }
}

/// Bind `addr` and serve the API in a background task.
pub async fn start_server(state: AppState, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("API server listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("API server shutting down");
            })
            .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(ServerHandle {
        addr: bound_addr,
        shutdown_tx,
        task,
    })
}
