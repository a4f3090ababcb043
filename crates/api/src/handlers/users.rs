//! 用户管理接口
//!
//! 权限检查在 [`UserService`](herqles_auth::UserService) 中完成，这里只解析调用者身份。

use axum::{
    extract::{Path, State},
    Json,
};
use herqles_auth::{UserChange, UserDetails};
use herqles_core::models::IssuedToken;
use serde::{Deserialize, Serialize};

use crate::{auth::AuthToken, error::ApiResult, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PermissionRequest {
    pub username: String,
    pub permission: String,
}

pub async fn add_user(
    State(state): State<AppState>,
    token: AuthToken,
    Json(request): Json<CredentialsRequest>,
) -> ApiResult<Json<UserChange>> {
    let caller = state.authorize(&token, None).await?;
    let change = state
        .users
        .add_user(&caller, &request.username, &request.password)
        .await?;
    Ok(Json(change))
}

pub async fn get_user(
    State(state): State<AppState>,
    token: AuthToken,
    Path(username): Path<String>,
) -> ApiResult<Json<UserDetails>> {
    let caller = state.authorize(&token, None).await?;
    Ok(Json(state.users.get_user(&caller, &username).await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    token: AuthToken,
    Path(username): Path<String>,
) -> ApiResult<Json<UserChange>> {
    let caller = state.authorize(&token, None).await?;
    Ok(Json(state.users.delete_user(&caller, &username).await?))
}

/// 用户名密码换取令牌，不需要 `X-Auth-Token`
pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> ApiResult<Json<IssuedToken>> {
    let issued = state
        .users
        .issue_token(&request.username, &request.password)
        .await?;
    Ok(Json(issued))
}

/// 返回轮换后的新令牌
pub async fn change_password(
    State(state): State<AppState>,
    token: AuthToken,
    Json(request): Json<CredentialsRequest>,
) -> ApiResult<Json<IssuedToken>> {
    let caller = state.authorize(&token, None).await?;
    let issued = state
        .users
        .change_password(&caller, &request.username, &request.password)
        .await?;
    Ok(Json(issued))
}

pub async fn add_permission(
    State(state): State<AppState>,
    token: AuthToken,
    Json(request): Json<PermissionRequest>,
) -> ApiResult<Json<PermissionRequest>> {
    let caller = state.authorize(&token, None).await?;
    state
        .users
        .add_permission(&caller, &request.username, &request.permission)
        .await?;
    Ok(Json(request))
}

pub async fn remove_permission(
    State(state): State<AppState>,
    token: AuthToken,
    Json(request): Json<PermissionRequest>,
) -> ApiResult<Json<PermissionRequest>> {
    let caller = state.authorize(&token, None).await?;
    state
        .users
        .remove_permission(&caller, &request.username, &request.permission)
        .await?;
    Ok(Json(request))
}
