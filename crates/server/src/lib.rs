//! HTTP server for the app longevity prediction engine

pub mod api;
pub mod config;
