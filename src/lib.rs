//! User authentication service: password and GitHub OAuth login issuing
//! stateless JWT bearer tokens, with an append-only login audit log.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod login_logs;
pub mod memory;
pub mod state;
pub mod users;

pub use app::build_app;
pub use error::{AppError, AppResult};
pub use state::AppState;
