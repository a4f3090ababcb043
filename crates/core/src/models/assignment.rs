use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户授权记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAssignment {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub user_assignment_id: i64,
    /// Start of the validity window
    pub updated_at: DateTime<Utc>,
}

/// Authenticated principal resolved from a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub name: String,
}

/// A token handed to a user together with its expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    /// Epoch milliseconds
    pub expire_at: i64,
}
