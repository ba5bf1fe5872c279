use std::net::SocketAddr;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;
use vitrine_core::{Catalog, CatalogError};
use vitrine_observability::{emit_event, CatalogEvent, ProcessKind};
use vitrine_types::Envelope;

use crate::upload::RequestInput;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    Update,
    Reorder,
    Delete,
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ]);

    Router::new()
        .route("/cms", any(cms_entry))
        .route("/cms.php", any(cms_entry))
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("catalog endpoint listening on http://{}/cms", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

async fn cms_entry(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    if method == Method::GET {
        return match run_catalog(&state, |catalog| Ok(catalog.list())).await {
            Ok(projects) => envelope(StatusCode::OK, Envelope::data(to_value(&projects))),
            Err(err) => error_response(&err),
        };
    }
    if ![Method::POST, Method::PUT, Method::DELETE].contains(&method) {
        return envelope(
            StatusCode::METHOD_NOT_ALLOWED,
            Envelope::failure("Method not allowed."),
        );
    }

    let input = match RequestInput::from_request(request, &state).await {
        Ok(input) => input,
        Err(err) => return error_response(&err),
    };
    let Some(operation) = select_operation(&method, &input) else {
        return envelope(
            StatusCode::METHOD_NOT_ALLOWED,
            Envelope::failure("Method not allowed."),
        );
    };

    let _guard = state.write_lock.lock().await;
    let result = match operation {
        Operation::Create => {
            let fields = input.new_project();
            run_catalog(&state, move |catalog| catalog.create(fields, &input.uploads))
                .await
                .map(|project| {
                    Envelope::ok("Project created successfully.", Some(to_value(&project)))
                })
        }
        Operation::Update => match input.patch() {
            Ok(patch) => run_catalog(&state, move |catalog| catalog.update(patch, &input.uploads))
                .await
                .map(|project| {
                    Envelope::ok("Project updated successfully.", Some(to_value(&project)))
                }),
            Err(err) => Err(err),
        },
        Operation::Reorder => match input.new_order() {
            Ok(order) => run_catalog(&state, move |catalog| catalog.reorder(&order))
                .await
                .map(|_| Envelope::ok("Projects reordered successfully.", None)),
            Err(err) => Err(err),
        },
        Operation::Delete => match input.delete_id() {
            Ok(id) => run_catalog(&state, move |catalog| catalog.delete(id))
                .await
                .map(|_| Envelope::ok("Project and associated assets deleted successfully.", None)),
            Err(err) => Err(err),
        },
    };

    match result {
        Ok(body) => envelope(StatusCode::OK, body),
        Err(err) => error_response(&err),
    }
}

fn select_operation(method: &Method, input: &RequestInput) -> Option<Operation> {
    let effective = if *method == Method::POST && input.overrides_to_put() {
        Method::PUT
    } else {
        method.clone()
    };
    match effective {
        Method::POST => Some(Operation::Create),
        Method::PUT if input.requests_reorder() => Some(Operation::Reorder),
        Method::PUT => Some(Operation::Update),
        Method::DELETE => Some(Operation::Delete),
        _ => None,
    }
}

/// Runs a catalog call on the blocking pool; the core does synchronous file IO.
async fn run_catalog<T, F>(state: &AppState, op: F) -> Result<T, CatalogError>
where
    F: FnOnce(&Catalog) -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    let catalog = state.catalog.clone();
    tokio::task::spawn_blocking(move || op(&catalog))
        .await
        .map_err(|err| {
            tracing::error!("catalog task failed: {}", err);
            CatalogError::Store("Internal server error.".to_string())
        })?
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn envelope(status: StatusCode, body: Envelope) -> Response {
    (status, Json(body)).into_response()
}

fn error_response(err: &CatalogError) -> Response {
    let status = match err {
        CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
        CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::Asset(_) | CatalogError::Store(_) | CatalogError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let message = err.to_string();
    let level = if status.is_server_error() {
        Level::ERROR
    } else {
        Level::WARN
    };
    emit_event(
        level,
        ProcessKind::Engine,
        CatalogEvent {
            event: "request.failed",
            component: "http",
            status: Some(status.as_str()),
            error_code: Some(err.code()),
            detail: Some(message.as_str()),
            ..Default::default()
        },
    );
    envelope(status, Envelope::failure(message))
}
