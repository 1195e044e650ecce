pub mod auth;
pub mod response;

pub use auth::{jwt_auth_middleware, superadmin_only, AuthUser};
pub use response::{ApiResponse, ApiResult};
