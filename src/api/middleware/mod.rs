pub mod auth;
pub mod method;

pub use auth::{require_auth, CurrentUser};
pub use method::{fallback, method_filter, AllowedMethods, CorsConfig};
