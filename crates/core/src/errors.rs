use serde::Serialize;
use thiserror::Error;

/// Herqles错误类型定义
#[derive(Debug, Error)]
pub enum HerqlesError {
    #[error("请求参数错误: {0}")]
    Validation(String),

    /// 总线入站消息无法解析；与存储层的反序列化失败区分
    #[error("无效的消息: {0}")]
    MalformedMessage(String),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: i64 },

    #[error("作业未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("用户不存在: {username}")]
    UserNotFound { username: String },

    #[error("状态冲突: {0}")]
    StateConflict(String),

    #[error("无效的API令牌")]
    InvalidToken,

    #[error("缺少API令牌")]
    MissingToken,

    #[error("用户名或密码错误")]
    InvalidCredentials,

    #[error("权限不足: {permission}")]
    PermissionDenied { permission: String },

    #[error("消息总线错误: {0}")]
    Transport(String),

    #[error("等待回复超时: {0}")]
    ReplyTimeout(String),

    /// 远端以 `{code, error}` 拒绝的请求
    #[error("{message}")]
    Rejected { code: u16, message: String },

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("目录服务错误: {0}")]
    Directory(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误大类，对外暴露给调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    StateConflict,
    AuthError,
    TransportFailure,
    BackingStoreFailure,
}

impl HerqlesError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state_conflict<S: Into<String>>(msg: S) -> Self {
        Self::StateConflict(msg.into())
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    pub fn directory<S: Into<String>>(msg: S) -> Self {
        Self::Directory(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    pub fn permission_denied<S: Into<String>>(permission: S) -> Self {
        Self::PermissionDenied {
            permission: permission.into(),
        }
    }

    /// 总线回复与REST响应共用的状态码
    pub fn code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::MalformedMessage(_) | Self::MissingToken => 400,
            Self::InvalidCredentials => 401,
            Self::InvalidToken | Self::PermissionDenied { .. } => 403,
            Self::TaskNotFound { .. }
            | Self::WorkerNotFound { .. }
            | Self::JobNotFound { .. }
            | Self::UserNotFound { .. } => 404,
            Self::StateConflict(_) => 409,
            Self::Transport(_) | Self::ReplyTimeout(_) => 503,
            Self::Rejected { code, .. } => *code,
            Self::Database(_)
            | Self::Directory(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Internal(_) => 500,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::MalformedMessage(_) | Self::Configuration(_) => {
                ErrorKind::ValidationError
            }
            Self::TaskNotFound { .. }
            | Self::WorkerNotFound { .. }
            | Self::JobNotFound { .. }
            | Self::UserNotFound { .. } => ErrorKind::NotFound,
            Self::StateConflict(_) => ErrorKind::StateConflict,
            Self::InvalidToken
            | Self::MissingToken
            | Self::InvalidCredentials
            | Self::PermissionDenied { .. } => ErrorKind::AuthError,
            Self::Transport(_) | Self::ReplyTimeout(_) => ErrorKind::TransportFailure,
            Self::Rejected { code, .. } => match code {
                400 => ErrorKind::ValidationError,
                401 | 403 => ErrorKind::AuthError,
                404 => ErrorKind::NotFound,
                409 => ErrorKind::StateConflict,
                503 => ErrorKind::TransportFailure,
                _ => ErrorKind::BackingStoreFailure,
            },
            Self::Database(_) | Self::Directory(_) | Self::Serialization(_) | Self::Internal(_) => {
                ErrorKind::BackingStoreFailure
            }
        }
    }

    /// 是否为服务端内部故障，用于决定日志级别
    pub fn is_server_error(&self) -> bool {
        self.code() >= 500
    }
}

impl From<serde_json::Error> for HerqlesError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type HerqlesResult<T> = std::result::Result<T, HerqlesError>;
