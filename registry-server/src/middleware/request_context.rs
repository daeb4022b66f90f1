use std::str::FromStr;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::http::error::{ApiError, AppResult};
use shared::config::server::Config;

/// Per-request data made available to spans and handlers.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub request_id: String,
}

#[derive(Clone, Debug)]
pub struct RequestIdState {
    header: HeaderName,
}

impl RequestIdState {
    pub fn from_config(config: &Config) -> Self {
        let header = HeaderName::from_str(&config.server.request_id_header)
            .unwrap_or_else(|_| HeaderName::from_static("x-request-id"));
        Self { header }
    }

    #[must_use]
    pub const fn header(&self) -> &HeaderName {
        &self.header
    }
}

/// Reuses a caller supplied request id or generates one, and echoes it on
/// the response.
pub async fn assign_request_id(
    State(state): State<RequestIdState>,
    mut request: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let request_id = extract_request_id(request.headers(), &state.header)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let header_value = HeaderValue::from_str(&request_id)
        .map_err(|_| ApiError::internal_server_error("failed to encode request id"))?;

    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });
    request
        .headers_mut()
        .insert(state.header.clone(), header_value.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(state.header, header_value);

    Ok(response)
}

fn extract_request_id(headers: &HeaderMap, header: &HeaderName) -> Option<String> {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
