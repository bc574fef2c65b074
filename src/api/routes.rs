//! API route definitions and handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::state::AppState;
use crate::engine::{cron, EngineError};
use crate::model::{Execution, Job, NewJob};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs).post(create_job))
        .route(
            "/jobs/{id}",
            get(get_job).put(update_job).delete(delete_job),
        )
        .route("/jobs/{id}/enabled", put(set_job_enabled))
        .route("/jobs/{id}/run", post(run_job))
        .route(
            "/jobs/{id}/executions",
            get(job_executions).delete(delete_job_executions),
        )
}

/// Error envelope for all handlers. Process-level job failures never show
/// up here; they come back as ordinary executions with `success = false`.
enum ApiError {
    NotFound(String),
    Invalid(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::Invalid(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg).into_response(),
            ApiError::Internal(err) => {
                tracing::error!("request failed: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::JobNotFound(id) => {
                ApiError::NotFound(format!("no job found with id {id}"))
            }
            EngineError::InvalidCronExpression { .. } => ApiError::Invalid(err.to_string()),
            EngineError::ProcessSpawnFailure(_) | EngineError::Store(_) => {
                ApiError::Internal(err.into())
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

fn job_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("no job found with id {id}"))
}

fn validate_payload(job: &NewJob) -> Result<(), ApiError> {
    if job.name.trim().is_empty() {
        return Err(ApiError::Invalid("name is required".to_string()));
    }
    if let Some(expression) = job
        .cron_expression
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        cron::validate(expression)?;
    }
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(state.jobs.find_all().await?))
}

async fn create_job(
    State(state): State<AppState>,
    Json(job): Json<NewJob>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    validate_payload(&job)?;
    let created = state.jobs.insert(job).await?;
    tracing::info!(job_id = created.id, name = %created.name, "job created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Job>, ApiError> {
    state
        .jobs
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| job_not_found(id))
}

async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(job): Json<NewJob>,
) -> Result<Json<Job>, ApiError> {
    validate_payload(&job)?;
    state
        .jobs
        .update(id, job)
        .await?
        .map(Json)
        .ok_or_else(|| job_not_found(id))
}

async fn set_job_enabled(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(enabled): Json<bool>,
) -> Result<Json<Job>, ApiError> {
    state
        .jobs
        .set_enabled(id, enabled)
        .await?
        .map(Json)
        .ok_or_else(|| job_not_found(id))
}

async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.jobs.delete(id).await? {
        tracing::info!(job_id = id, "job deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(job_not_found(id))
    }
}

async fn run_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Execution>, ApiError> {
    let execution = state.engine.execute_job_now(id).await?;
    Ok(Json(execution))
}

async fn job_executions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Execution>>, ApiError> {
    // A job that never ran yields an empty list, not a 404.
    Ok(Json(state.executions.find_by_job(id).await?))
}

async fn delete_job_executions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let removed = state.executions.delete_by_job(id).await?;
    if removed == 0 {
        return Err(ApiError::NotFound(format!(
            "no executions found for job {id}"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::store::sqlite::{open_pool, SqliteStore};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn test_app() -> (tempfile::TempDir, axum::Router) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.db");
        let pool = open_pool(path.to_str().unwrap()).unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let jobs: Arc<dyn crate::store::JobStore> = store.clone();
        let executions: Arc<dyn crate::store::ExecutionStore> = store;
        let engine = Arc::new(Engine::new(jobs.clone(), executions.clone(), 5));
        let state = AppState {
            jobs,
            executions,
            engine,
        };
        (dir, crate::api::router(state))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, app) = test_app();
        let response = app.oneshot(get_request("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_job_crud_happy_path() {
        let (_dir, app) = test_app();

        let payload = json!({
            "name": "hello",
            "description": "say hello",
            "command": "echo hello",
            "cron_expression": "*/5 * * * * *"
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/jobs", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["enabled"], true);

        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/v1/jobs/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/api/v1/jobs/{id}/enabled"),
                json!(false),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["enabled"], false);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/v1/jobs/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_request(&format!("/api/v1/jobs/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let (_dir, app) = test_app();
        let response = app.oneshot(get_request("/api/v1/jobs/42")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_cron_expression_is_422() {
        let (_dir, app) = test_app();
        let payload = json!({
            "name": "broken",
            "cron_expression": "* * * * *"
        });
        let response = app
            .oneshot(json_request("POST", "/api/v1/jobs", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_blank_name_is_422() {
        let (_dir, app) = test_app();
        let response = app
            .oneshot(json_request("POST", "/api/v1/jobs", json!({ "name": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_run_now_returns_execution() {
        let (_dir, app) = test_app();

        let payload = json!({ "name": "hello", "command": "echo hello" });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/jobs", payload))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/jobs/{id}/run"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let execution = body_json(response).await;
        assert_eq!(execution["success"], true);
        assert_eq!(execution["exit_code"], 0);
        assert_eq!(execution["output"], "hello");

        let response = app
            .oneshot(get_request(&format!("/api/v1/jobs/{id}/executions")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_executions_of_unexecuted_job_is_empty_list() {
        let (_dir, app) = test_app();
        let response = app
            .clone()
            .oneshot(get_request("/api/v1/jobs/42/executions"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));

        // Purging an empty history is a 404, unlike listing it.
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/jobs/42/executions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
