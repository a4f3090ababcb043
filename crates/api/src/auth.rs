//! 请求令牌提取与校验

use axum::{extract::FromRequestParts, http::request::Parts};
use async_trait::async_trait;
use herqles_auth::AuthorizationService;
use herqles_core::{
    models::{Principal, ValidateReply, ValidateRequest},
    traits::Route,
    HerqlesError, HerqlesResult,
};
use herqles_infrastructure::RpcClient;
use serde_json::Value;

use crate::error::ApiError;

pub const AUTH_HEADER: &str = "X-Auth-Token";

/// `X-Auth-Token` 请求头
#[derive(Debug, Clone)]
pub struct AuthToken(pub String);

impl<S> FromRequestParts<S> for AuthToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTH_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| AuthToken(token.to_string()))
            .ok_or(ApiError(HerqlesError::MissingToken))
    }
}

/// 令牌校验方式
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str, permission: Option<&str>) -> HerqlesResult<Principal>;
}

/// 进程内直接校验
pub struct LocalTokenValidator {
    authorization: AuthorizationService,
}

impl LocalTokenValidator {
    pub fn new(authorization: AuthorizationService) -> Self {
        Self { authorization }
    }
}

#[async_trait]
impl TokenValidator for LocalTokenValidator {
    async fn validate(&self, token: &str, permission: Option<&str>) -> HerqlesResult<Principal> {
        self.authorization.validate(token, permission).await
    }
}

/// 通过 `security.validate` RPC 校验
pub struct BusTokenValidator {
    rpc: RpcClient,
}

impl BusTokenValidator {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl TokenValidator for BusTokenValidator {
    async fn validate(&self, token: &str, permission: Option<&str>) -> HerqlesResult<Principal> {
        let request = serde_json::to_value(ValidateRequest {
            token: token.to_string(),
            permission: permission.map(str::to_string),
        })?;

        let reply = self
            .rpc
            .call(&Route::new("security", "validate"), &request)
            .await?;

        let code = reply
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .ok_or_else(|| HerqlesError::internal("校验回复缺少code"))?;

        if code != 200 {
            let message = reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("令牌校验失败")
                .to_string();
            return Err(HerqlesError::Rejected { code, message });
        }

        let reply: ValidateReply = serde_json::from_value(reply)?;
        Ok(reply.user)
    }
}
