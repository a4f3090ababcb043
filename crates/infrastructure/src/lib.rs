pub mod context;
pub mod database;
pub mod directory;
pub mod message_bus;
pub mod rpc;

pub use context::sqlite_context;
pub use database::DatabaseManager;
pub use directory::{InMemoryDirectory, LdapDirectory};
pub use message_bus::{InMemoryMessageBus, MessageBusFactory, RabbitMQMessageBus};
pub use rpc::RpcClient;
