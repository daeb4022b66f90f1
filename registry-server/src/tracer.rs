use axum::{body::Body, http::Request, http::Response};
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{DefaultOnBodyChunk, DefaultOnEos, MakeSpan, OnResponse, TraceLayer};
use tracing::{Span, error, info, warn};

use crate::middleware::request_context::RequestContext;

type TraceLayerType = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    HttpMakeSpan,
    fn(&Request<Body>, &Span) -> (),
    HttpOnResponse,
    DefaultOnBodyChunk,
    DefaultOnEos,
    fn(ServerErrorsFailureClass, Duration, &Span) -> (),
>;

/// Opens one span per request, tagged with the request id assigned by
/// [`crate::middleware::request_context::assign_request_id`].
#[derive(Clone, Debug, Default)]
pub struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .map_or_else(|| "n/a".to_string(), |ctx| ctx.request_id.clone());

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
            status_code = tracing::field::Empty
        )
    }
}

/// Records the status on the request span and logs client errors at `warn`.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpOnResponse;

impl<B> OnResponse<B> for HttpOnResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status();
        span.record("status_code", status.as_u16());

        span.in_scope(|| {
            if status.is_client_error() {
                warn!(status = status.as_u16(), latency = ?latency, "request rejected");
            } else {
                info!(status = status.as_u16(), latency = ?latency, "finished processing request");
            }
        });
    }
}

pub(crate) fn on_request_handler(req: &Request<Body>, span: &Span) {
    span.in_scope(|| {
        info!(
            method = %req.method(),
            uri = %req.uri(),
            version = ?req.version(),
            "started processing request"
        );
    });
}

pub(crate) fn on_failure_handler(error: ServerErrorsFailureClass, latency: Duration, span: &Span) {
    span.in_scope(|| {
        error!(
            error = %error,
            latency = ?latency,
            "error processing request"
        );
    });
}

/// Create a trace layer for HTTP request logging
pub fn create_trace_layer() -> TraceLayerType {
    TraceLayer::new_for_http()
        .make_span_with(HttpMakeSpan)
        .on_request(on_request_handler as fn(&Request<Body>, &Span))
        .on_response(HttpOnResponse)
        .on_failure(on_failure_handler as fn(ServerErrorsFailureClass, Duration, &Span))
}
