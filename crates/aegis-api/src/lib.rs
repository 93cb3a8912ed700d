pub mod alerts;
pub mod auth;
pub mod contacts;
pub mod error;
pub mod middleware;
pub mod timers;

pub use auth::{AppState, AppStateInner};
pub use error::{ApiError, ApiResult};
