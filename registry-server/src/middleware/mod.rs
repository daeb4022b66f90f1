pub mod http_metrics;
pub mod request_context;
