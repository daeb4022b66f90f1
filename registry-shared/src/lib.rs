#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

//! Models and configuration shared by the user registry crates.

pub mod config;
pub mod models;
