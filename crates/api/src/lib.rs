//! Herqles REST接口
//!
//! 每个端点对应一个核心操作；令牌通过 `X-Auth-Token` 请求头传递，
//! 校验方式由 `api.token_validation` 决定(总线RPC或进程内)。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod views;

pub use auth::{AuthToken, BusTokenValidator, LocalTokenValidator, TokenValidator};
pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};
