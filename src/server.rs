//! # Admin HTTP Module
//!
//! Espone la pipeline al pannello admin tramite `axum`.
//!
//! ## Endpoint:
//! - `POST /admin/images/optimize`: batch su tutte le categorie configurate
//! - `GET /admin/images/stats`: numero file e dimensione per categoria
//! - `POST /admin/uploads/:category`: upload multipart, salvataggio senza sovrascritture
//!   e ottimizzazione; una richiesta malformata non lascia file su disco
//!
//! L'autorizzazione è responsabilità di un middleware esterno.
//!
//! ## Cancellazione:
//! Il batch gira in un task separato legato a un `CancellationToken`. Se il client
//! si disconnette l'handler viene droppato, il token si cancella e nessun nuovo
//! file viene avviato; i file già in encode terminano normalmente.

use crate::config::Config;
use crate::optimizer::batch::BatchRunner;
use crate::transformer::Transformer;
use crate::upload::{UploadImageInfo, UploadInterceptor, UploadStore};
use anyhow::Result;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::fmt::Display;
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Span};

/// Upload request body limit
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    transformer: Transformer,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let transformer = Transformer::new(config.workers);
        Self {
            config: Arc::new(config),
            transformer,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    filename: String,
    size: u64,
    url: String,
    image_info: Option<UploadImageInfo>,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/admin/images/optimize", post(optimize_images))
        .route("/admin/images/stats", get(image_stats))
        .route("/admin/uploads/:category", post(upload_files))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
                .into_inner(),
        )
        .with_state(state)
}

/// Serve the admin endpoints until Ctrl+C / SIGTERM
pub async fn run(config: Config) -> Result<()> {
    let address = config.bind_address.clone();
    let app = create_routes(AppState::new(config));

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", address, e))?;
    info!("🚀 Admin media endpoints listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn optimize_images(State(state): State<AppState>) -> Response {
    let cancel = CancellationToken::new();
    // Dropped together with this handler when the client goes away
    let _guard = cancel.clone().drop_guard();

    let runner = BatchRunner::new(state.config.clone(), state.transformer.clone()).with_cancellation(cancel);
    let handle = tokio::spawn(async move { runner.run().await });

    match handle.await {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(e)) => internal_server_error(&e),
        Err(e) => internal_server_error(&e),
    }
}

async fn image_stats(State(state): State<AppState>) -> Response {
    let runner = BatchRunner::new(state.config.clone(), state.transformer.clone());
    match runner.collect_stats().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => internal_server_error(&e),
    }
}

async fn upload_files(
    Path(category): Path<String>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    let Some(category) = state.config.category(&category) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("Unknown upload category: {category}") })),
        )
            .into_response();
    };

    let directory = state.config.category_path(category);
    if let Err(e) = tokio::fs::create_dir_all(&directory).await {
        return internal_server_error(&e);
    }

    let mut store = UploadStore::new(directory, &state.config.upload);
    let mut saved = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                store.discard(&saved).await;
                return bad_request(&e);
            }
        };

        let Some(filename) = field.file_name().and_then(sanitize_file_name) else {
            continue;
        };
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                store.discard(&saved).await;
                return bad_request(&e);
            }
        };

        match store.save(&filename, &bytes).await {
            Ok(file) => saved.push(file),
            Err(e) => {
                store.discard(&saved).await;
                return internal_server_error(&e);
            }
        }
    }

    UploadInterceptor::new(state.transformer.clone())
        .with_options(state.config.upload.clone())
        .intercept(&mut saved)
        .await;

    let files: Vec<UploadedFile> = saved
        .into_iter()
        .map(|file| UploadedFile {
            url: state.config.public_url(&category.name, &file.filename),
            filename: file.filename,
            size: file.size,
            image_info: file.image_info,
        })
        .collect();

    (StatusCode::CREATED, Json(json!({ "success": true, "files": files }))).into_response()
}

/// Final path component of a client-supplied name, `None` if nothing usable remains
fn sanitize_file_name(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    let base = FsPath::new(name).file_name()?.to_string_lossy().into_owned();
    if base.is_empty() || base.starts_with('.') {
        None
    } else {
        Some(base)
    }
}

fn internal_server_error<E: Display>(e: &E) -> Response {
    error!("{e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": e.to_string() })),
    )
        .into_response()
}

fn bad_request<E: Display>(e: &E) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": e.to_string() })),
    )
        .into_response()
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Signal received, starting graceful shutdown");
}
