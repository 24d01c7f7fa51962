//! HTTP surface for the web client.
//!
//! `POST /run` grades a submission sent as JSON or as a urlencoded form; the
//! `/api` routes expose the read-only catalog. Dropping a request (client disconnect) drops the grading future,
//! which kills the sandbox and removes the workspace.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, FromRequest, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::CatalogError;
use crate::grading::GradingService;
use crate::sandbox::SandboxRunner;
use crate::submission::GradeRequest;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the router around a shared grading service.
pub fn router<R: SandboxRunner + 'static>(service: Arc<GradingService<R>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run::<R>))
        .route("/api/cases/{id}", get(case_set::<R>))
        .route("/api/questions/{id}", get(question::<R>))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve until the listener fails.
pub async fn serve<R: SandboxRunner + 'static>(
    service: Arc<GradingService<R>>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}"))?;

    info!(%addr, "Starting HTTP server");

    axum::serve(listener, router(service))
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// A `/run` body: JSON by default, a form when the content type says so.
///
/// Every rejection becomes a `400 {"error": ...}`.
struct GradeBody(GradeRequest);

impl<S> FromRequest<S> for GradeBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let parsed = if is_form(&req) {
            Form::<GradeRequest>::from_request(req, state)
                .await
                .map(|Form(body)| body)
                .map_err(|e| e.body_text())
        } else {
            Json::<GradeRequest>::from_request(req, state)
                .await
                .map(|Json(body)| body)
                .map_err(|e| e.body_text())
        };

        parsed.map(Self).map_err(|message| {
            warn!(error = %message, "Malformed grading request");
            error_response(StatusCode::BAD_REQUEST, &message)
        })
    }
}

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

async fn run<R: SandboxRunner + 'static>(
    State(service): State<Arc<GradingService<R>>>,
    GradeBody(req): GradeBody,
) -> Response {
    match service.grade_request(req).await {
        Ok(envelope) => Json(envelope).into_response(),
        Err(e) => {
            warn!(error = %e, "Rejected grading request");
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}

async fn case_set<R: SandboxRunner + 'static>(
    State(service): State<Arc<GradingService<R>>>,
    Path(id): Path<String>,
) -> Response {
    match service.catalog().case_set(&id).await {
        Ok(text) => ([(header::CONTENT_TYPE, "application/json")], text).into_response(),
        Err(e) => catalog_error(&e),
    }
}

async fn question<R: SandboxRunner + 'static>(
    State(service): State<Arc<GradingService<R>>>,
    Path(id): Path<String>,
) -> Response {
    match service.catalog().question_text(&id).await {
        Ok(text) => ([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], text).into_response(),
        Err(e) => catalog_error(&e),
    }
}

fn catalog_error(err: &CatalogError) -> Response {
    match err {
        CatalogError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "not found"),
        CatalogError::Read { .. } => {
            warn!(error = ?err, "Catalog read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "catalog unavailable")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::catalog::FlatFileCatalog;
    use crate::config::Config;
    use crate::error::SandboxError;
    use crate::sandbox::{ExecutionResult, ExitStatus, SandboxConfig};

    #[derive(Clone)]
    struct PassingRunner;

    #[async_trait]
    impl SandboxRunner for PassingRunner {
        async fn run(&self, config: &SandboxConfig) -> Result<ExecutionResult, SandboxError> {
            Ok(ExecutionResult {
                status: ExitStatus::Exited(0),
                stdout: format!("{}\nPASS\n", config.selection_filter),
                stderr: String::new(),
            })
        }
    }

    fn app(dir: &std::path::Path) -> Router {
        let cases = dir.join("cases");
        let questions = dir.join("questions");
        let workspaces = dir.join("ws");
        for d in [&cases, &questions, &workspaces] {
            std::fs::create_dir_all(d).unwrap();
        }
        std::fs::write(cases.join("SaveAndMiss.json"), "[]").unwrap();
        std::fs::write(questions.join("SaveAndMiss.md"), "# SaveAndMiss\n").unwrap();

        let mut config = Config::default();
        config.workspace.root = Some(workspaces);
        let catalog = Arc::new(FlatFileCatalog::new(cases, questions));
        router(Arc::new(GradingService::from_config(
            &config,
            catalog,
            PassingRunner,
        )))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_run(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/run")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn run_returns_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(post_run(
                r#"{"problem":"SaveAndMiss","filename":"saveandmiss.go","code":"package piscine"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["exitCode"], 0);
        assert_eq!(body["stdout"], "^TestSaveAndMiss$\nPASS\n");
        assert_eq!(body["summary"]["passed"], 1);
    }

    #[tokio::test]
    async fn run_with_missing_field_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(post_run(r#"{"targetId":"SaveAndMiss","entryFilename":"a.go"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "missing required field: sourceCode");
    }

    #[tokio::test]
    async fn run_accepts_urlencoded_form() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/run")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "problem=SaveAndMiss&filename=saveandmiss.go&code=package+piscine",
            ))
            .unwrap();

        let response = app(dir.path()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["stdout"], "^TestSaveAndMiss$\nPASS\n");
    }

    #[tokio::test]
    async fn form_with_missing_field_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/run")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("problem=SaveAndMiss&filename=saveandmiss.go"))
            .unwrap();

        let response = app(dir.path()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "missing required field: sourceCode"
        );
    }

    #[tokio::test]
    async fn wrongly_typed_field_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(post_run(
                r#"{"targetId":1,"entryFilename":"a.go","sourceCode":"package piscine"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("targetId"));
    }

    #[tokio::test]
    async fn unparseable_json_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path()).oneshot(post_run("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn missing_content_type_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/run")
            .body(Body::from(r#"{"targetId":"SaveAndMiss"}"#))
            .unwrap();

        let response = app(dir.path()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("Content-Type"));
    }

    #[tokio::test]
    async fn catalog_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/questions/SaveAndMiss")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/markdown; charset=utf-8"
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/cases/Unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not found");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }
}
