#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

pub mod app_state;
pub mod commands;
pub mod handlers;
pub mod http;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod services;
pub mod tracer;
