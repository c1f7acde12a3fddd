use crate::state::AppState;
use axum::Router;

pub mod claims;
mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod services;

pub use dto::{LoginRequest, LoginResponse};
pub use extractors::{AdminOnly, AdminOrSelf, AnyRole, AuthError, AuthUser, Authorized};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
