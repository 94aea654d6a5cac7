pub mod handlers;
pub mod middleware;
pub mod models;
pub mod service;

pub use middleware::jwt_auth;
pub use models::AuthUser;
pub use service::{AuthService, TokenConfig};
