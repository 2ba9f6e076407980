//! personal-hub: personal website backend and lightweight CRM.
//!
//! Content is synced from GitHub, YouTube and Substack into one item table with AI blurbs,
//! subscribers are collected and mailed through Mailgun, and pageviews are rolled up into a
//! small analytics summary for the admin console.

pub mod ai;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod services;
pub mod web;

pub use app::{App, SyncTarget};
pub use config::Config;
pub use error::{AppError, Result};
pub use web::{build_router, AppState};
