//! Forgeflow Server Library
//!
//! Moves forging and CNC operation records from a staging store into the
//! operational database.
//!
//! # Overview
//!
//! - **Pipeline** (`etl`): validation, anomaly mapping, loading and batch
//!   orchestration with one transaction per batch
//! - **API Endpoints** (`features`): batch triggers, run status and order
//!   bookkeeping
//! - **Database Management** (`db`): PostgreSQL pools with SQLx
//! - **Configuration** (`config`): environment-based settings
//! - **Middleware**: CORS, request logging and the API key guard
//!
//! # Example
//!
//! ```no_run
//! use forgeflow_server::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let state = api::build_state(&config).await?;
//!     let app = api::create_router(state, &config.cors);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod etl;
pub mod features;
pub mod middleware;

// Re-export commonly used types
pub use error::{ApiResult, AppError};
