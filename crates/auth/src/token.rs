//! 令牌生成与有效期窗口

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use herqles_core::{
    models::{IssuedToken, Principal, UserAssignment},
    traits::AssignmentRepository,
    HerqlesResult,
};
use sha2::{Digest, Sha256};
use tracing::debug;

/// 生成随机令牌：32字节随机数的SHA-256摘要，URL安全base64编码
pub fn generate_token() -> String {
    let seed: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(Sha256::digest(seed))
}

/// 令牌有效期窗口
///
/// 令牌在 `updated_at + window` 时刻(含)之前有效，超过该时刻才失效。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenWindow {
    window: Duration,
}

impl TokenWindow {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn is_valid(&self, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - updated_at <= self.window
    }

    pub fn expires_at(&self, updated_at: DateTime<Utc>) -> DateTime<Utc> {
        updated_at + self.window
    }
}

/// 基于授权存储的令牌签发与校验
#[derive(Clone)]
pub struct TokenManager {
    assignments: Arc<dyn AssignmentRepository>,
    window: TokenWindow,
}

impl TokenManager {
    pub fn new(assignments: Arc<dyn AssignmentRepository>, window: Duration) -> Self {
        Self {
            assignments,
            window: TokenWindow::new(window),
        }
    }

    pub fn window(&self) -> TokenWindow {
        self.window
    }

    /// 返回仍有效的现有令牌；不存在、已过期或 `force` 时轮换新令牌
    pub async fn issue(&self, assignment: &UserAssignment, force: bool) -> HerqlesResult<IssuedToken> {
        let now = Utc::now();

        if !force {
            if let Some(existing) = self.assignments.find_token(assignment.id).await? {
                if self.window.is_valid(existing.updated_at, now) {
                    return Ok(IssuedToken {
                        expire_at: self.window.expires_at(existing.updated_at).timestamp_millis(),
                        token: existing.token,
                    });
                }
            }
        }

        let token = self
            .assignments
            .store_token(assignment.id, &generate_token(), now)
            .await?;
        debug!("签发新令牌: {}", assignment.username);

        Ok(IssuedToken {
            expire_at: self.window.expires_at(token.updated_at).timestamp_millis(),
            token: token.token,
        })
    }

    /// 解析令牌持有者，未知或已过期返回 `None`
    pub async fn validate(&self, token: &str) -> HerqlesResult<Option<Principal>> {
        if token.is_empty() {
            return Ok(None);
        }

        let Some((assignment, stored)) = self.assignments.find_by_token(token).await? else {
            return Ok(None);
        };

        if !self.window.is_valid(stored.updated_at, Utc::now()) {
            debug!("令牌已过期: {}", assignment.username);
            return Ok(None);
        }

        Ok(Some(Principal {
            id: assignment.id,
            name: assignment.username,
        }))
    }
}
