pub mod repo;
pub mod repo_types;

pub use repo::{LoginLogStore, PgLoginLogStore, HISTORY_LIMIT};
pub use repo_types::{LoginLogEntry, LoginStatus, NewLoginLog};
