pub mod api_observability;
pub mod app_config;
pub mod auth;
pub mod database;
pub mod message_queue;

pub use api_observability::{ApiConfig, ObservabilityConfig, TokenValidationMode};
pub use app_config::AppConfig;
pub use auth::{AssignmentConfig, IdentityConfig, LdapConfig};
pub use database::DatabaseConfig;
pub use message_queue::{MessageQueueConfig, MessageQueueType};
