pub mod auth;
pub mod response;

pub use auth::{identity_middleware, IdentitySource};
pub use response::{ApiResponse, ApiResult, Deleted};
