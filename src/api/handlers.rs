//! Request handlers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::time::Instant;

use crate::api::models::{DomainResponse, ErrorResponse, UrlsResponse};
use crate::api::{AppState, DEFAULT_LIMIT, REQUEST_DEADLINE};
use crate::error::UrlakeError;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.service.loader().version(),
    }))
}

pub async fn get_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Response {
    let service = state.service.clone();
    let result =
        tokio::task::spawn_blocking(move || service.datasets_of(&domain)).await;

    match result {
        Ok(Ok(info)) => Json(DomainResponse::from(info)).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(join_err) => internal_error(join_err.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    offset: u64,
    limit: Option<u32>,
}

pub async fn get_urls(
    State(state): State<AppState>,
    Path((domain, dataset_id)): Path<(String, u32)>,
    Query(params): Query<PageParams>,
) -> Response {
    let requested_limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let max_limit = state.service.max_limit();
    let clamped = requested_limit > max_limit;

    let service = state.service.clone();
    let deadline = Instant::now() + REQUEST_DEADLINE;
    let result = tokio::task::spawn_blocking(move || {
        service.urls_of(
            &domain,
            dataset_id,
            params.offset,
            requested_limit,
            Some(deadline),
        )
    })
    .await;

    match result {
        Ok(Ok(page)) => {
            let mut headers = HeaderMap::new();
            if clamped {
                let warning = format!("199 - \"limit clamped to {}\"", max_limit);
                if let Ok(value) = HeaderValue::from_str(&warning) {
                    headers.insert("warning", value);
                }
            }
            (headers, Json(UrlsResponse::from(page))).into_response()
        }
        Ok(Err(err)) => error_response(err),
        Err(join_err) => internal_error(join_err.to_string()),
    }
}

/// Map library errors to wire status codes: bad input is the caller's
/// fault, everything else is a retriable server failure.
fn error_response(err: UrlakeError) -> Response {
    let status = match &err {
        UrlakeError::Validation(_) => StatusCode::BAD_REQUEST,
        UrlakeError::VersionMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        log::error!("request failed: {}", err);
    } else {
        log::warn!("request rejected: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            detail: err.to_string(),
        }),
    )
        .into_response()
}

fn internal_error(detail: String) -> Response {
    log::error!("handler panicked: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            detail: "internal server error".to_string(),
        }),
    )
        .into_response()
}
