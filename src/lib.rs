//! Herqles manager进程装配：配置、存储、消息总线、认证后端、队列订阅和REST接口

pub mod app;
pub mod shutdown;

pub use app::Application;
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager};
