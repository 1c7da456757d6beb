//! Animated choropleth and bubble maps of per-state outbreak statistics.

pub mod config;
pub mod data;
pub mod projection;
pub mod render;
pub mod scale;
pub mod server;
pub mod types;
