//! CLI command implementations

pub mod history;
pub mod models;
pub mod predict;
