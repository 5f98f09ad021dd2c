use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use reframe_pipeline::{PipelineError, ServiceContext};
use reframe_protocol::{
    serialize_json, ClassifyRequest, ControlRequest, ErrorBody, HealthResponse, MeasureRequest,
    ReframeRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::cors::CorsLayer;

/// HTTP surface over a shared [`ServiceContext`].
///
/// Dropping a handler future (client disconnect) drops the in-flight upstream calls with it.
pub fn router(ctx: ServiceContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/classify", post(classify))
        .route("/api/reframe", post(reframe))
        .route("/api/measure", post(measure))
        .route("/api/control", post(control))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

async fn health() -> Response {
    json_response(StatusCode::OK, &HealthResponse::ok())
}

async fn classify(State(ctx): State<ServiceContext>, body: Bytes) -> Response {
    match parse_body::<ClassifyRequest>(&body) {
        Ok(request) => respond(ctx.classify(request).await),
        Err(response) => response,
    }
}

async fn reframe(State(ctx): State<ServiceContext>, body: Bytes) -> Response {
    match parse_body::<ReframeRequest>(&body) {
        Ok(request) => respond(ctx.reframe(request).await),
        Err(response) => response,
    }
}

async fn measure(State(ctx): State<ServiceContext>, body: Bytes) -> Response {
    match parse_body::<MeasureRequest>(&body) {
        Ok(request) => respond(ctx.measure(request).await),
        Err(response) => response,
    }
}

async fn control(State(ctx): State<ServiceContext>, body: Bytes) -> Response {
    match parse_body::<ControlRequest>(&body) {
        Ok(request) => respond(ctx.control(request).await),
        Err(response) => response,
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|err| {
        log::debug!("rejecting request body: {err}");
        json_response(
            StatusCode::BAD_REQUEST,
            &ErrorBody::new("invalid_request", format!("Invalid JSON body: {err}")),
        )
    })
}

fn respond<T: Serialize>(result: Result<T, PipelineError>) -> Response {
    match result {
        Ok(value) => json_response(StatusCode::OK, &value),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &PipelineError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        log::warn!("request failed ({}): {err}", status.as_u16());
    } else {
        log::debug!("request rejected ({}): {err}", status.as_u16());
    }
    json_response(status, &ErrorBody::new(err.code(), err.to_string()))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serialize_json(value) {
        Ok(body) => (status, [(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(err) => {
            log::error!("failed to serialize response: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
