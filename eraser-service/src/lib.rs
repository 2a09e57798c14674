//! BG Eraser: credit-metered background-removal service.

pub mod config;
pub mod handlers;
pub mod intake;
pub mod middleware;
pub mod models;
pub mod processing;
pub mod services;
pub mod startup;
pub mod sweeper;
